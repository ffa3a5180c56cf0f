//! Search capability and the `search` tool

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use kisan_config::{Config, SearchBackend};

use super::{ToolContext, ToolError, ToolTrait};

const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("search api returned {0}")]
    Api(String),

    #[error("search api key not configured")]
    NotConfigured,
}

/// Looks things up for a role. Fallible and possibly slow.
#[async_trait]
pub trait SearchCapability: Send + Sync {
    async fn search(&self, query: &str) -> Result<String, SearchError>;
}

/// Fixed keyword table, matched by substring
pub struct MockSearch;

const MOCK_TABLE: &[(&str, &str)] = &[
    (
        "weather",
        "The weather in your area is expected to be sunny with a high of 32°C.",
    ),
    (
        "crop yield for wheat",
        "The average yield for wheat in your region is 4 tons per hectare.",
    ),
    (
        "current price of wheat",
        "The current market price for wheat is $200 per ton.",
    ),
    (
        "government schemes for wheat farmers",
        "The 'Pradhan Mantri Fasal Bima Yojana' offers crop insurance and subsidies up to 50% of the premium for wheat farmers.",
    ),
    (
        "new farming techniques",
        "New techniques include precision agriculture, drone-based crop monitoring, and AI-powered pest detection.",
    ),
    (
        "mandi price for wheat",
        "The current mandi price for wheat is $210 per ton.",
    ),
];

impl MockSearch {
    pub fn lookup(query: &str) -> String {
        let needle = query.to_lowercase();
        MOCK_TABLE
            .iter()
            .find(|(key, _)| needle.contains(key))
            .map(|(_, answer)| answer.to_string())
            .unwrap_or_else(|| {
                format!("No specific result found for '{}'. This is a mock search.", query)
            })
    }
}

#[async_trait]
impl SearchCapability for MockSearch {
    async fn search(&self, query: &str) -> Result<String, SearchError> {
        debug!("Mock search: {}", query);
        Ok(Self::lookup(query))
    }
}

/// Brave web search API
pub struct BraveSearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    max_results: u32,
}

impl BraveSearch {
    pub fn new(api_key: impl Into<String>, max_results: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: BRAVE_ENDPOINT.to_string(),
            max_results: max_results.clamp(1, 10),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, SearchError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }
}

#[async_trait]
impl SearchCapability for BraveSearch {
    async fn search(&self, query: &str) -> Result<String, SearchError> {
        if self.api_key.is_empty() {
            return Err(SearchError::NotConfigured);
        }
        debug!("Web search: {}", query);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("count", &self.max_results.to_string())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Api(status.to_string()));
        }

        let data: serde_json::Value = response.json().await?;
        let results = match data["web"]["results"].as_array() {
            Some(results) if !results.is_empty() => results,
            _ => return Ok(format!("No results for: {}", query)),
        };

        let mut lines = vec![format!("Results for: {}", query)];
        for (i, item) in results.iter().take(self.max_results as usize).enumerate() {
            let title = item["title"].as_str().unwrap_or("");
            let url = item["url"].as_str().unwrap_or("");
            let desc = item["description"].as_str().unwrap_or("");
            lines.push(format!("{}. {}", i + 1, title));
            lines.push(format!("   {}", url));
            if !desc.is_empty() {
                lines.push(format!("   {}", desc));
            }
        }
        Ok(lines.join("\n"))
    }
}

/// Build the configured search backend.
///
/// The Brave backend without a key falls back to the mock table.
pub fn capability_from_config(config: &Config) -> Result<Arc<dyn SearchCapability>, SearchError> {
    match (config.search.backend, config.brave_api_key()) {
        (SearchBackend::Brave, Some(key)) => Ok(Arc::new(
            BraveSearch::new(key, config.search.max_results).with_timeout(config.request_timeout())?,
        )),
        (SearchBackend::Brave, None) => {
            tracing::warn!("Brave search selected without an api key, using mock search");
            Ok(Arc::new(MockSearch))
        }
        (SearchBackend::Mock, _) => Ok(Arc::new(MockSearch)),
    }
}

/// The `search` tool, backed by any search capability
#[derive(Clone)]
pub struct SearchTool {
    capability: Arc<dyn SearchCapability>,
}

impl SearchTool {
    pub fn new(capability: Arc<dyn SearchCapability>) -> Self {
        Self { capability }
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

#[async_trait]
impl ToolTrait for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search for current agricultural information. Returns a short text answer."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        _ctx: &mut ToolContext<'_>,
    ) -> Result<String, ToolError> {
        let args: SearchArgs = serde_json::from_value(args)?;
        Ok(self.capability.search(&args.query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_table() {
        assert_eq!(
            MockSearch::lookup("mandi price for wheat in Karnal"),
            "The current mandi price for wheat is $210 per ton."
        );
        assert!(MockSearch::lookup("Weather in Pune").contains("32°C"));
        assert!(MockSearch::lookup("crop yield for wheat").contains("4 tons per hectare"));
    }

    #[test]
    fn test_mock_table_first_match_wins() {
        // "weather" is checked before the wheat entries
        assert!(MockSearch::lookup("weather and current price of wheat").contains("sunny"));
    }

    #[test]
    fn test_mock_fallback() {
        assert_eq!(
            MockSearch::lookup("rice subsidies"),
            "No specific result found for 'rice subsidies'. This is a mock search."
        );
    }

    #[tokio::test]
    async fn test_brave_without_key_is_error() {
        let err = BraveSearch::new("", 5).search("wheat").await.unwrap_err();
        assert!(matches!(err, SearchError::NotConfigured));
    }

    #[test]
    fn test_capability_from_default_config() {
        assert!(capability_from_config(&Config::default()).is_ok());
    }

    #[tokio::test]
    async fn test_search_tool_bad_arguments() {
        let tool = SearchTool::new(Arc::new(MockSearch));
        let mut state = crate::state::SharedState::new();
        let mut ctx = ToolContext::new(&mut state);
        let err = tool.execute(json!({"q": "x"}), &mut ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
