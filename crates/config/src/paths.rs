//! Filesystem locations

use std::path::PathBuf;

/// Data directory (~/.kisan, or ./.kisan when no home is known)
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".kisan"))
        .unwrap_or_else(|| PathBuf::from(".kisan"))
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Conversation sessions used by delegated turns
pub fn sessions_dir() -> PathBuf {
    data_dir().join("sessions")
}

/// Replace characters that are not allowed in file names
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect()
}
