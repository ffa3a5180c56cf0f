//! Model-backed advisory roles
//!
//! An [`LlmRole`] is plain configuration: a name, an instruction template,
//! the tools it may call and the state field it writes. [`LlmAgent`] pairs
//! that configuration with a provider and runs the chat/tool-call exchange.
//! The same agent type serves as generator, refiner or critic.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use kisan_config::Config;
use kisan_provider::{log_response, ChatParams, Provider, ToolChoice};

use crate::context::PromptBuilder;
use crate::state::{SharedState, TaskContext};
use crate::tools::{
    AppendToStateTool, ExitLoopTool, SearchCapability, SearchTool, ToolContext, ToolRegistry,
};
use crate::verdict::Verdict;
use crate::{AgentError, Result};

/// Writes (or rewrites) a candidate into shared state
#[async_trait]
pub trait Author: Send + Sync {
    fn name(&self) -> &str;

    /// Field this author overwrites
    fn output_key(&self) -> &str;

    async fn write(&self, ctx: &TaskContext, state: &mut SharedState) -> Result<()>;
}

/// Judges the current candidate
#[async_trait]
pub trait Critic: Send + Sync {
    fn name(&self) -> &str;

    async fn judge(&self, ctx: &TaskContext, state: &mut SharedState) -> Result<Verdict>;
}

/// Tools a role can be given
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleTool {
    Search,
    AppendToState,
    ExitLoop,
}

/// Declarative description of one role
#[derive(Debug, Clone)]
pub struct LlmRole {
    pub name: String,
    pub description: String,
    pub instruction: String,
    pub tools: Vec<RoleTool>,
    pub output_key: Option<String>,
    pub model: Option<String>,
}

impl LlmRole {
    pub fn new(name: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instruction: instruction.into(),
            tools: Vec::new(),
            output_key: None,
            model: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn writes(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn with_tool(mut self, tool: RoleTool) -> Self {
        if !self.tools.contains(&tool) {
            self.tools.push(tool);
        }
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Generation settings shared by every role of a catalogue
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_tool_iterations: u32,
}

impl ModelSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.default_model(),
            max_tokens: config.advisory.max_tokens,
            temperature: config.advisory.temperature,
            max_tool_iterations: config.advisory.max_tool_iterations.max(1),
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of one role turn
#[derive(Debug, Clone, Default)]
pub struct Turn {
    pub text: Option<String>,
    pub exit_requested: bool,
}

pub struct LlmAgent {
    role: LlmRole,
    provider: Arc<dyn Provider>,
    tools: ToolRegistry,
    settings: ModelSettings,
}

impl LlmAgent {
    pub fn new(
        role: LlmRole,
        provider: Arc<dyn Provider>,
        search: Arc<dyn SearchCapability>,
        settings: ModelSettings,
    ) -> Self {
        let mut tools = ToolRegistry::new();
        for tool in &role.tools {
            match tool {
                RoleTool::Search => tools.register(SearchTool::new(search.clone())),
                RoleTool::AppendToState => tools.register(AppendToStateTool),
                RoleTool::ExitLoop => tools.register(ExitLoopTool),
            }
        }

        Self {
            role,
            provider,
            tools,
            settings,
        }
    }

    pub fn role(&self) -> &LlmRole {
        &self.role
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run the chat/tool-call exchange until the model answers in text or
    /// asks to leave the loop.
    pub async fn run(&self, ctx: &TaskContext, state: &mut SharedState) -> Result<Turn> {
        let builder = PromptBuilder::new(&self.role.name, &self.role.instruction);
        let mut messages = builder.build_messages(ctx, state)?;
        let model = self
            .role
            .model
            .clone()
            .unwrap_or_else(|| self.settings.model.clone());
        let definitions = self.tools.definitions();
        let mut tool_ctx = ToolContext::new(state);

        for iteration in 1..=self.settings.max_tool_iterations {
            debug!("[{}] iteration {}", self.role.name, iteration);

            let params = ChatParams {
                model: model.clone(),
                messages: messages.clone(),
                tools: definitions.clone(),
                max_tokens: self.settings.max_tokens,
                temperature: self.settings.temperature,
                tool_choice: ToolChoice::Auto,
            };

            let response = self.provider.chat(params).await?;
            log_response(&self.role.name, &response);

            if !response.has_tool_calls() {
                return Ok(Turn {
                    text: response.text_content().map(str::to_string),
                    exit_requested: false,
                });
            }

            PromptBuilder::add_assistant_message(
                &mut messages,
                response.content.as_deref(),
                &response.tool_calls,
            );

            for call in &response.tool_calls {
                debug!("[{}] executing tool: {}", self.role.name, call.name);

                let result = match self
                    .tools
                    .execute(&call.name, call.arguments.clone(), &mut tool_ctx)
                    .await
                {
                    Ok(result) => result,
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => {
                        warn!("[{}] tool {} failed: {}", self.role.name, call.name, e);
                        format!("Error: {}", e)
                    }
                };

                PromptBuilder::add_tool_result(&mut messages, call, &result);
            }

            if tool_ctx.escalated() {
                return Ok(Turn {
                    text: response.text_content().map(str::to_string),
                    exit_requested: true,
                });
            }
        }

        Err(AgentError::MaxToolIterations {
            role: self.role.name.clone(),
            limit: self.settings.max_tool_iterations,
        })
    }
}

#[async_trait]
impl Author for LlmAgent {
    fn name(&self) -> &str {
        &self.role.name
    }

    fn output_key(&self) -> &str {
        self.role.output_key.as_deref().unwrap_or(&self.role.name)
    }

    async fn write(&self, ctx: &TaskContext, state: &mut SharedState) -> Result<()> {
        let turn = self.run(ctx, state).await?;
        let text = turn
            .text
            .ok_or_else(|| AgentError::EmptyResponse(self.role.name.clone()))?;
        debug!("[{}] wrote {} chars to {}", self.role.name, text.len(), self.output_key());
        state.set(self.output_key(), text);
        Ok(())
    }
}

#[async_trait]
impl Critic for LlmAgent {
    fn name(&self) -> &str {
        &self.role.name
    }

    async fn judge(&self, ctx: &TaskContext, state: &mut SharedState) -> Result<Verdict> {
        let turn = self.run(ctx, state).await?;
        Ok(Verdict::interpret(turn.text.as_deref(), turn.exit_requested))
    }
}
