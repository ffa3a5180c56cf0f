//! Advisory core: roles, critique loops and orchestration

use thiserror::Error;

pub mod advisors;
pub mod context;
pub mod critique;
pub mod orchestrator;
pub mod pipeline;
pub mod role;
pub mod router;
pub mod state;
pub mod tools;
pub mod verdict;

pub use advisors::{AdvisorKind, AdvisorSpec, Catalogue, ADVISORS};
pub use context::PromptBuilder;
pub use critique::{CritiqueLoop, LoopOutcome, LoopRecord, LoopState};
pub use orchestrator::{merge, BranchOutcome, BranchResult, FanOut, Report, ReportEntry};
pub use pipeline::{Advice, Advisor, RefinementPipeline, SingleAdvisor};
pub use role::{Author, Critic, LlmAgent, LlmRole, ModelSettings, RoleTool};
pub use router::{Intent, IntentClassifier, LlmClassifier, Router, RouterReply, RoutingTable};
pub use state::{SharedState, StateError, TaskContext};
pub use tools::{ToolError, ToolRegistry, ToolTrait};
pub use verdict::Verdict;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("provider error: {0}")]
    Provider(#[from] kisan_provider::ProviderError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("{0} returned an empty response")]
    EmptyResponse(String),

    #[error("{role} exceeded {limit} tool iterations")]
    MaxToolIterations { role: String, limit: u32 },

    #[error("unknown route: {0}")]
    UnknownRoute(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("a CONTINUE verdict needs feedback")]
    InvalidVerdict,
}

pub type Result<T> = std::result::Result<T, AgentError>;
