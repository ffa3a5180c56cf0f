//! Prompt assembly for advisory roles
//!
//! Instructions are templates with `{FIELD}` (required) and `{FIELD?}`
//! (optional) placeholders; the `{{ FIELD? }}` spelling is accepted too.
//! Placeholders resolve against the shared state first, then the task
//! context, so a role always sees the latest candidate and feedback.

use chrono::Local;
use regex::Regex;
use std::sync::OnceLock;

use kisan_provider::{Message, ToolCall};

use crate::state::{SharedState, StateError, TaskContext};

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{?\s*([A-Za-z_][A-Za-z0-9_]*)\s*(\?)?\s*\}\}?").expect("valid regex")
    })
}

/// Substitute placeholders in `template`.
///
/// A required placeholder whose field is neither in state nor in the context
/// is an error; an optional one renders as an empty string.
pub fn render(template: &str, ctx: &TaskContext, state: &SharedState) -> Result<String, StateError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder_re().captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let optional = caps.get(2).is_some();
        let key = name.as_str();

        let value = state
            .text(key)
            .or_else(|| ctx.get(key).map(str::to_string));

        out.push_str(&template[last..whole.start()]);
        match value {
            Some(v) => out.push_str(&v),
            None if optional => {}
            None => return Err(StateError::Unset(key.to_string())),
        }
        last = whole.end();
    }

    out.push_str(&template[last..]);
    Ok(out)
}

/// Builds the message list for one role invocation
pub struct PromptBuilder<'a> {
    role: &'a str,
    instruction: &'a str,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(role: &'a str, instruction: &'a str) -> Self {
        Self { role, instruction }
    }

    pub fn system_prompt(&self, ctx: &TaskContext, state: &SharedState) -> Result<String, StateError> {
        let body = render(self.instruction, ctx, state)?;
        let today = Local::now().format("%Y-%m-%d");
        Ok(format!(
            "# {}\n\n{}\n\n## Current Date\n{}",
            self.role,
            body.trim(),
            today
        ))
    }

    /// Farmer facts as the opening user turn
    pub fn user_prompt(ctx: &TaskContext) -> String {
        if ctx.is_empty() {
            "No farmer details were provided.".to_string()
        } else {
            format!("Farmer details:\n{}", ctx.describe())
        }
    }

    pub fn build_messages(
        &self,
        ctx: &TaskContext,
        state: &SharedState,
    ) -> Result<Vec<Message>, StateError> {
        Ok(vec![
            Message::system(self.system_prompt(ctx, state)?),
            Message::user(Self::user_prompt(ctx)),
        ])
    }

    pub fn add_tool_result(messages: &mut Vec<Message>, call: &ToolCall, result: &str) {
        messages.push(Message::tool(&call.id, &call.name, result));
    }

    pub fn add_assistant_message(
        messages: &mut Vec<Message>,
        content: Option<&str>,
        calls: &[ToolCall],
    ) {
        messages.push(Message::assistant_tool_calls(
            content.map(str::to_string),
            calls,
        ));
    }
}
