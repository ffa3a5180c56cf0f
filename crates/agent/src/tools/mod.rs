//! Tools offered to advisory roles

pub mod search;
pub mod state;

pub use search::{
    capability_from_config, BraveSearch, MockSearch, SearchCapability, SearchError, SearchTool,
};
pub use state::{AppendToStateTool, ExitLoopTool};

use async_trait::async_trait;
use kisan_provider::Tool;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::state::{SharedState, StateError};

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool '{0}' not found")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),

    #[error("search failed: {0}")]
    Search(#[from] SearchError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl ToolError {
    /// Capability failures end the loop; everything else goes back to the model
    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolError::Search(_))
    }
}

/// What a tool may touch while it runs
pub struct ToolContext<'a> {
    pub state: &'a mut SharedState,
    escalate: bool,
}

impl<'a> ToolContext<'a> {
    pub fn new(state: &'a mut SharedState) -> Self {
        Self {
            state,
            escalate: false,
        }
    }

    /// Ask the enclosing loop to stop after this turn
    pub fn escalate(&mut self) {
        self.escalate = true;
    }

    pub fn escalated(&self) -> bool {
        self.escalate
    }
}

type BoxedTool = Box<dyn ToolTrait + Send + Sync>;

#[async_trait]
pub trait ToolTrait: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;
    async fn execute(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<String, ToolError>;
}

pub fn to_provider_tool(tool: &dyn ToolTrait) -> Tool {
    Tool::new(tool.name(), tool.description(), tool.parameters())
}

pub struct ToolRegistry {
    tools: HashMap<String, BoxedTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register<T: ToolTrait + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        self.tools.insert(name, Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&(dyn ToolTrait + Send + Sync)> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Declarations in name order
    pub fn definitions(&self) -> Vec<Tool> {
        let mut defs: Vec<Tool> = self
            .tools
            .values()
            .map(|t| to_provider_tool(t.as_ref()))
            .collect();
        defs.sort_by(|a, b| a.name().cmp(b.name()));
        defs
    }

    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(args, ctx).await
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
