//! Shared helpers for kisan CLI tests
#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Isolated home directory for one CLI invocation
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub data_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let data_dir = temp_dir.path().join(".kisan");
        Ok(Self { temp_dir, data_dir })
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    /// The binary with HOME pointed at the temp dir and no credentials leaking in
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_kisan"));
        cmd.env("HOME", self.temp_dir.path())
            .env_remove("KISAN_API_KEY")
            .env_remove("KISAN_API_BASE")
            .env_remove("KISAN_MODEL")
            .env_remove("BRAVE_API_KEY")
            .env_remove("RUST_LOG");
        cmd
    }

    pub fn write_config(&self, json: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::write(self.config_file(), json)?;
        Ok(())
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
