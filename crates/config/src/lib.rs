//! Configuration management for Kisan
//!
//! Every tunable of the advisory pipelines lives in one explicit [`Config`]
//! value that is loaded from `~/.kisan/config.json` and handed to the
//! provider and the advisor catalogue at construction time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir, sessions_dir};

/// Errors raised while loading or saving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Budget used by any refinement loop without an explicit entry
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Text-generation endpoint credentials
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

/// Model and timing parameters shared by every advisor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryDefaults {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_branch_timeout_secs")]
    pub branch_timeout_secs: u64,
    #[serde(default = "default_session_max_messages")]
    pub session_max_messages: usize,
    /// Stored messages shown to the delegation classifier per turn
    #[serde(default = "default_history_messages")]
    pub history_messages: usize,
}

impl Default for AdvisoryDefaults {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_tool_iterations: default_max_tool_iterations(),
            request_timeout_secs: default_request_timeout_secs(),
            branch_timeout_secs: default_branch_timeout_secs(),
            session_max_messages: default_session_max_messages(),
            history_messages: default_history_messages(),
        }
    }
}

fn default_model() -> String {
    "google/gemini-2.0-flash-lite-001".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tool_iterations() -> u32 {
    8
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_branch_timeout_secs() -> u64 {
    180
}

fn default_session_max_messages() -> usize {
    50
}

fn default_history_messages() -> usize {
    20
}

/// Per-loop settings, keyed by advisor name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

/// Which search capability backs the `search` tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    #[default]
    Mock,
    Brave,
}

/// Search capability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub backend: SearchBackend,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: SearchBackend::default(),
            api_key: String::new(),
            max_results: default_max_results(),
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub advisory: AdvisoryDefaults,
    #[serde(default)]
    pub loops: BTreeMap<String, LoopConfig>,
    #[serde(default)]
    pub search: SearchConfig,
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from a specific location, falling back to defaults when absent
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        debug!("Loading config from {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to a specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("Saving config to {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Overlay process environment onto the loaded file.
    ///
    /// Only the binary calls this; library code never reads the environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Overlay values from an arbitrary lookup (testable form of
    /// [`Config::apply_env_overrides`])
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("KISAN_API_KEY") {
            self.provider.api_key = key;
        }
        if let Some(base) = non_empty("KISAN_API_BASE") {
            self.provider.api_base = Some(base);
        }
        if let Some(model) = non_empty("KISAN_MODEL") {
            self.advisory.model = model;
        }
        if let Some(key) = non_empty("BRAVE_API_KEY") {
            self.search.api_key = key;
        }
    }

    /// Provider API key, if one is configured
    pub fn api_key(&self) -> Option<String> {
        let key = self.provider.api_key.trim();
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }

    /// Provider API base, if overridden
    pub fn api_base(&self) -> Option<String> {
        self.provider
            .api_base
            .as_ref()
            .filter(|b| !b.is_empty())
            .cloned()
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn default_model(&self) -> String {
        self.advisory.model.clone()
    }

    /// Iteration budget for the named refinement loop
    pub fn max_iterations_for(&self, loop_name: &str) -> u32 {
        match self.loops.get(loop_name) {
            Some(cfg) if cfg.max_iterations > 0 => cfg.max_iterations,
            Some(_) => {
                warn!(
                    "Loop '{}' configured with zero iterations, using {}",
                    loop_name, DEFAULT_MAX_ITERATIONS
                );
                DEFAULT_MAX_ITERATIONS
            }
            None => DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Brave search key, if configured
    pub fn brave_api_key(&self) -> Option<String> {
        let key = &self.search.api_key;
        if key.is_empty() {
            None
        } else {
            Some(key.clone())
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.advisory.request_timeout_secs)
    }

    /// Per-branch fan-out deadline; zero falls back to the default
    pub fn branch_timeout(&self) -> Duration {
        match self.advisory.branch_timeout_secs {
            0 => {
                warn!(
                    "branch_timeout_secs is zero, using {}s",
                    default_branch_timeout_secs()
                );
                Duration::from_secs(default_branch_timeout_secs())
            }
            secs => Duration::from_secs(secs),
        }
    }

    pub fn session_max_messages(&self) -> usize {
        self.advisory.session_max_messages
    }

    /// Classifier history window, never wider than what sessions keep
    pub fn history_messages(&self) -> usize {
        self.advisory
            .history_messages
            .min(self.advisory.session_max_messages)
    }
}

/// Write a default config (if none exists) and create the data directories
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("Config already exists at {:?}", config_path);
    } else {
        let config = Config::default();
        config.save().await?;
        info!("Created config at {:?}", config_path);
    }

    let sessions = sessions_dir();
    tokio::fs::create_dir_all(&sessions).await?;
    info!("Sessions directory ready at {:?}", sessions);

    Config::load().await
}
