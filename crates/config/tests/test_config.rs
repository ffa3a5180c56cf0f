//! Tests for Config serialization, loading and accessors

use kisan_config::{Config, ConfigError, LoopConfig, SearchBackend};
use std::time::Duration;
use tempfile::TempDir;

fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_config_defaults() {
    let config = Config::default();

    assert!(config.provider.api_key.is_empty());
    assert!(config.provider.api_base.is_none());
    assert_eq!(config.advisory.model, "google/gemini-2.0-flash-lite-001");
    assert_eq!(config.advisory.max_tokens, 4096);
    assert_eq!(config.advisory.temperature, 0.7);
    assert_eq!(config.advisory.max_tool_iterations, 8);
    assert_eq!(config.request_timeout(), Duration::from_secs(60));
    assert_eq!(config.branch_timeout(), Duration::from_secs(180));
    assert_eq!(config.session_max_messages(), 50);
    assert_eq!(config.history_messages(), 20);
    assert!(config.loops.is_empty());
    assert_eq!(config.search.backend, SearchBackend::Mock);
    assert_eq!(config.search.max_results, 5);
    assert!(!config.has_api_key());
}

#[test]
fn test_partial_json_fills_defaults() {
    let json = r#"{
        "provider": { "api_key": "sk-or-abc" },
        "loops": { "gov_schemes": { "max_iterations": 2 } },
        "search": { "backend": "brave", "api_key": "brave-key" }
    }"#;

    let config: Config = serde_json::from_str(json).expect("Failed to parse");

    assert_eq!(config.api_key(), Some("sk-or-abc".to_string()));
    assert_eq!(config.max_iterations_for("gov_schemes"), 2);
    assert_eq!(config.max_iterations_for("crop_management"), 3);
    assert_eq!(config.search.backend, SearchBackend::Brave);
    assert_eq!(config.brave_api_key(), Some("brave-key".to_string()));
    assert_eq!(config.advisory.max_tool_iterations, 8);
}

#[test]
fn test_history_window_capped_by_session_size() {
    let config: Config = serde_json::from_str(
        r#"{"advisory": {"session_max_messages": 8, "history_messages": 30}}"#,
    )
    .unwrap();
    assert_eq!(config.history_messages(), 8);

    let config: Config =
        serde_json::from_str(r#"{"advisory": {"history_messages": 6}}"#).unwrap();
    assert_eq!(config.history_messages(), 6);
}

#[test]
fn test_zero_branch_timeout_falls_back() {
    let config: Config =
        serde_json::from_str(r#"{"advisory": {"branch_timeout_secs": 0}}"#).unwrap();
    assert_eq!(config.advisory.branch_timeout_secs, 0);
    assert_eq!(config.branch_timeout(), Duration::from_secs(180));

    let config: Config =
        serde_json::from_str(r#"{"advisory": {"branch_timeout_secs": 45}}"#).unwrap();
    assert_eq!(config.branch_timeout(), Duration::from_secs(45));
}

#[test]
fn test_empty_json_object_is_default() {
    let config: Config = serde_json::from_str("{}").expect("Failed to parse");
    assert_eq!(config.default_model(), Config::default().default_model());
    assert!(config.loops.is_empty());
}

#[test]
fn test_unknown_search_backend_is_rejected() {
    let result = serde_json::from_str::<Config>(r#"{"search": {"backend": "bing"}}"#);
    assert!(result.is_err());
}

#[test]
fn test_whitespace_api_key_is_not_configured() {
    let mut config = Config::default();
    config.provider.api_key = "   ".to_string();
    assert!(config.api_key().is_none());
    assert!(!config.has_api_key());
}

#[test]
fn test_empty_api_base_is_ignored() {
    let mut config = Config::default();
    config.provider.api_base = Some(String::new());
    assert!(config.api_base().is_none());
}

#[tokio::test]
async fn test_load_from_missing_file_returns_defaults() {
    let temp = temp_dir();
    let config = Config::load_from(&temp.path().join("missing.json"))
        .await
        .expect("Load should succeed");
    assert_eq!(config.default_model(), "google/gemini-2.0-flash-lite-001");
}

#[tokio::test]
async fn test_save_then_load_preserves_loops() {
    let temp = temp_dir();
    let path = temp.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.provider.api_key = "sk-or-saved".to_string();
    config
        .loops
        .insert("mandi_prices".to_string(), LoopConfig { max_iterations: 5 });
    config.save_to(&path).await.expect("Save failed");

    assert!(path.exists());
    let loaded = Config::load_from(&path).await.expect("Load failed");
    assert_eq!(loaded.api_key(), Some("sk-or-saved".to_string()));
    assert_eq!(loaded.max_iterations_for("mandi_prices"), 5);
}

#[tokio::test]
async fn test_load_from_invalid_json_is_json_error() {
    let temp = temp_dir();
    let path = temp.path().join("config.json");
    std::fs::write(&path, "{not json").expect("Write failed");

    match Config::load_from(&path).await {
        Err(ConfigError::Json(_)) => {}
        other => panic!("Expected Json error, got {:?}", other),
    }
}
