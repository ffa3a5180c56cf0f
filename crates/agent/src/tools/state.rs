//! State tools: append_to_state and exit_loop

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{ToolContext, ToolError, ToolTrait};

/// Appends a response to a list field of the shared state
pub struct AppendToStateTool;

#[derive(Deserialize)]
struct AppendArgs {
    field: String,
    response: String,
}

#[async_trait]
impl ToolTrait for AppendToStateTool {
    fn name(&self) -> &str {
        "append_to_state"
    }

    fn description(&self) -> &str {
        "Append a response to a named field of the shared state. Earlier entries are kept."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "field": { "type": "string", "description": "State field name, e.g. SCHEME_DATA" },
                "response": { "type": "string", "description": "Text to append" }
            },
            "required": ["field", "response"]
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<String, ToolError> {
        let args: AppendArgs = serde_json::from_value(args)?;
        ctx.state.append(args.field.trim(), args.response)?;
        Ok(json!({"status": "success"}).to_string())
    }
}

/// Signals that the critic is satisfied
pub struct ExitLoopTool;

#[async_trait]
impl ToolTrait for ExitLoopTool {
    fn name(&self) -> &str {
        "exit_loop"
    }

    fn description(&self) -> &str {
        "Call this only when the report meets the goal and no further changes are needed."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        _args: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<String, ToolError> {
        ctx.escalate();
        Ok(json!({"status": "exiting"}).to_string())
    }
}
