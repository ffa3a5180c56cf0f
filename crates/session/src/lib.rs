//! Conversation state for delegated advisory turns
//!
//! A [`Session`] keeps the message history of one farmer conversation and
//! the facts collected so far (crop, location, ...). Facts accumulate across
//! turns and seed the task context of every delegated advisor.

use chrono::{DateTime, Local};
use kisan_config::paths::safe_filename;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default maximum number of messages in a session
pub const DEFAULT_MAX_MESSAGES: usize = 50;

/// One farmer conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    pub messages: Vec<Message>,
    /// Facts gathered from the farmer, keyed by state field name
    #[serde(default)]
    pub facts: BTreeMap<String, String>,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

fn default_max_messages() -> usize {
    DEFAULT_MAX_MESSAGES
}

/// A message in the session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// user or assistant
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Local>,
    /// Advisor route that produced an assistant reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        Self::with_max_messages(key, DEFAULT_MAX_MESSAGES)
    }

    pub fn with_max_messages(key: impl Into<String>, max_messages: usize) -> Self {
        let now = Local::now();
        Self {
            key: key.into(),
            messages: Vec::new(),
            facts: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            max_messages,
        }
    }

    pub fn add_message(&mut self, role: impl Into<String>, content: impl Into<String>) {
        self.push(role.into(), content.into(), None);
    }

    /// Record an assistant reply produced by `route`
    pub fn add_reply(&mut self, content: impl Into<String>, route: Option<&str>) {
        self.push(
            "assistant".to_string(),
            content.into(),
            route.map(str::to_string),
        );
    }

    fn push(&mut self, role: String, content: String, route: Option<String>) {
        self.messages.push(Message {
            role,
            content,
            timestamp: Local::now(),
            route,
        });
        self.updated_at = Local::now();
        self.enforce_max_messages();
    }

    fn enforce_max_messages(&mut self) {
        if self.messages.len() > self.max_messages {
            let to_remove = self.messages.len() - self.max_messages;
            self.messages.drain(0..to_remove);
            debug!(
                "Session {} truncated to {} messages",
                self.key,
                self.messages.len()
            );
        }
    }

    /// Store a fact; later values for the same key replace earlier ones.
    /// Blank values are ignored.
    pub fn record_fact(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let value = value.into();
        if value.trim().is_empty() {
            return false;
        }
        self.facts.insert(key.into(), value.trim().to_string());
        self.updated_at = Local::now();
        true
    }

    pub fn facts(&self) -> &BTreeMap<String, String> {
        &self.facts
    }

    /// Last `max_messages` messages in provider form
    pub fn get_history(&self, max_messages: usize) -> Vec<kisan_provider::Message> {
        self.messages
            .iter()
            .skip(self.messages.len().saturating_sub(max_messages))
            .map(|m| match m.role.as_str() {
                "assistant" => kisan_provider::Message::assistant(m.content.clone()),
                _ => kisan_provider::Message::user(m.content.clone()),
            })
            .collect()
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn set_max_messages(&mut self, max_messages: usize) {
        self.max_messages = max_messages;
        self.enforce_max_messages();
    }
}

/// Caches sessions in memory and persists them as JSON files
pub struct SessionManager {
    sessions_dir: PathBuf,
    cache: HashMap<String, Session>,
    max_messages: usize,
}

impl SessionManager {
    pub fn new(sessions_dir: impl AsRef<Path>) -> Self {
        Self::with_max_messages(sessions_dir, DEFAULT_MAX_MESSAGES)
    }

    pub fn with_max_messages(sessions_dir: impl AsRef<Path>, max_messages: usize) -> Self {
        let sessions_dir = sessions_dir.as_ref().to_path_buf();
        if let Err(e) = std::fs::create_dir_all(&sessions_dir) {
            warn!("Failed to create sessions dir {:?}: {}", sessions_dir, e);
        }

        Self {
            sessions_dir,
            cache: HashMap::new(),
            max_messages,
        }
    }

    /// Get a cached session, loading it from disk or creating it on first use
    pub async fn get_or_create(&mut self, key: &str) -> &mut Session {
        if !self.cache.contains_key(key) {
            let session = self
                .load(key)
                .await
                .unwrap_or_else(|| Session::with_max_messages(key, self.max_messages));
            self.cache.insert(key.to_string(), session);
        }
        let max_messages = self.max_messages;
        self.cache
            .entry(key.to_string())
            .or_insert_with(|| Session::with_max_messages(key, max_messages))
    }

    pub async fn save(&self, session: &Session) -> std::io::Result<()> {
        let path = self.session_path(&session.key);
        let content = serde_json::to_string_pretty(session)?;
        tokio::fs::write(path, content).await?;
        debug!("Saved session: {}", session.key);
        Ok(())
    }

    async fn load(&self, key: &str) -> Option<Session> {
        let path = self.session_path(key);
        if !path.exists() {
            return None;
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read session {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str::<Session>(&content) {
            Ok(mut session) => {
                if session.max_messages != self.max_messages {
                    session.set_max_messages(self.max_messages);
                }
                debug!("Loaded session: {}", key);
                Some(session)
            }
            Err(e) => {
                warn!("Failed to parse session {}: {}", key, e);
                None
            }
        }
    }

    fn session_path(&self, key: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{}.json", safe_filename(key)))
    }

    pub async fn delete(&mut self, key: &str) -> std::io::Result<bool> {
        self.cache.remove(key);
        let path = self.session_path(key);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// File stems of persisted sessions (keys with separators sanitized)
    pub async fn list(&self) -> Vec<String> {
        let mut keys = Vec::new();

        if let Ok(mut entries) = tokio::fs::read_dir(&self.sessions_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if let Some(name) = entry.file_name().to_str() {
                    if let Some(stripped) = name.strip_suffix(".json") {
                        keys.push(stripped.to_string());
                    }
                }
            }
        }

        keys.sort();
        keys
    }
}
