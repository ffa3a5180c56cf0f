//! Task context and per-execution shared state

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("state field '{0}' has not been written yet")]
    Unset(String),

    #[error("state field '{0}' is not an append list")]
    NotAList(String),
}

/// Input facts for one advisory request.
///
/// Built once, then only read. Roles never mutate it; anything they produce
/// goes into [`SharedState`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    facts: BTreeMap<String, String>,
}

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style fact insertion; blank values are skipped
    pub fn with_fact(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.facts.insert(key.into(), value.trim().to_string());
        }
        self
    }

    pub fn from_facts<I, K, V>(facts: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        facts
            .into_iter()
            .fold(Self::new(), |ctx, (k, v)| ctx.with_fact(k, v))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.facts.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.facts.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// `KEY: value` lines, in key order
    pub fn describe(&self) -> String {
        self.facts
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Mutable key/value store scoped to one loop execution.
///
/// Fields are either overwritten with [`set`](Self::set) or accumulated with
/// [`append`](Self::append); appended lists only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedState {
    fields: BTreeMap<String, Value>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Read a field that an earlier step must have written
    pub fn require(&self, key: &str) -> Result<&Value, StateError> {
        self.fields
            .get(key)
            .ok_or_else(|| StateError::Unset(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Append `entry` to the list stored under `key`, creating it if needed.
    /// Returns the new length.
    pub fn append(&mut self, key: &str, entry: impl Into<Value>) -> Result<usize, StateError> {
        let entry = entry.into();
        let slot = self
            .fields
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));

        match slot {
            Value::Array(items) => {
                items.push(entry);
                let len = items.len();
                info!("[Added to {}] entry #{}", key, len);
                Ok(len)
            }
            _ => Err(StateError::NotAList(key.to_string())),
        }
    }

    /// Number of entries in an append list (0 when unset)
    pub fn list_len(&self, key: &str) -> usize {
        match self.fields.get(key) {
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        }
    }

    /// Field rendered as text: strings verbatim, lists joined by blank lines
    pub fn text(&self, key: &str) -> Option<String> {
        self.fields.get(key).map(value_to_text)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .collect::<Vec<_>>()
            .join("\n\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_skips_blank_and_trims() {
        let ctx = TaskContext::new()
            .with_fact("CROP_DETAILS", " wheat ")
            .with_fact("LOCATION", "  ");
        assert_eq!(ctx.get("CROP_DETAILS"), Some("wheat"));
        assert!(ctx.get("LOCATION").is_none());
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_context_describe_is_key_ordered() {
        let ctx = TaskContext::from_facts([("YIELD", "4 t/ha"), ("CROP_DETAILS", "wheat")]);
        assert_eq!(ctx.describe(), "CROP_DETAILS: wheat\nYIELD: 4 t/ha");
    }

    #[test]
    fn test_require_unset_field() {
        let state = SharedState::new();
        assert_eq!(
            state.require("CROP_REPORT"),
            Err(StateError::Unset("CROP_REPORT".to_string()))
        );
    }

    #[test]
    fn test_set_overwrites() {
        let mut state = SharedState::new();
        state.set("CROP_REPORT", "draft 1");
        state.set("CROP_REPORT", "draft 2");
        assert_eq!(state.text("CROP_REPORT").as_deref(), Some("draft 2"));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_append_accumulates_in_order() {
        let mut state = SharedState::new();
        let mut previous = 0;
        for i in 0..5 {
            let len = state.append("SCHEME_FEEDBACK", format!("note {}", i)).unwrap();
            assert!(len > previous);
            previous = len;
        }

        let items = state.get("SCHEME_FEEDBACK").unwrap().as_array().unwrap();
        let texts: Vec<&str> = items.iter().map(|v| v.as_str().unwrap()).collect();
        assert_eq!(texts, vec!["note 0", "note 1", "note 2", "note 3", "note 4"]);
        assert_eq!(state.list_len("SCHEME_FEEDBACK"), 5);
    }

    #[test]
    fn test_append_to_scalar_is_rejected_without_clobbering() {
        let mut state = SharedState::new();
        state.set("CROP_REPORT", "text");
        assert_eq!(
            state.append("CROP_REPORT", "more"),
            Err(StateError::NotAList("CROP_REPORT".to_string()))
        );
        assert_eq!(state.get("CROP_REPORT"), Some(&json!("text")));
    }

    #[test]
    fn test_text_joins_lists() {
        let mut state = SharedState::new();
        state.append("NOTES", "a").unwrap();
        state.append("NOTES", "b").unwrap();
        state.set("COUNT", 3);
        assert_eq!(state.text("NOTES").as_deref(), Some("a\n\nb"));
        assert_eq!(state.text("COUNT").as_deref(), Some("3"));
        assert!(state.text("MISSING").is_none());
        assert_eq!(state.list_len("MISSING"), 0);
    }
}
