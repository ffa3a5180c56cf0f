//! Critic decisions

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::warn;

use crate::{AgentError, Result};

/// Feedback used when a critic produces neither a decision nor any text
pub const FALLBACK_FEEDBACK: &str =
    "The critic returned no usable verdict. Revise the report so it clearly meets the stated goal.";

fn exit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"[*_`"'(\[]*\bEXIT\b[*_`"')\].!:;,]*"#).expect("valid regex")
    })
}

/// Critic text with the sentinel and its punctuation removed
fn strip_sentinel(text: &str) -> String {
    let stripped = exit_re().replace_all(text, " ");
    stripped
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// What a critic decided about the current candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Verdict {
    Pass {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    Continue {
        feedback: String,
    },
}

impl Verdict {
    pub fn pass() -> Self {
        Verdict::Pass { summary: None }
    }

    pub fn pass_with(summary: impl Into<String>) -> Self {
        let summary = summary.into();
        let summary = summary.trim();
        Verdict::Pass {
            summary: (!summary.is_empty()).then(|| summary.to_string()),
        }
    }

    /// CONTINUE must say what to change
    pub fn continue_with(feedback: impl Into<String>) -> Result<Self> {
        let feedback = feedback.into();
        if feedback.trim().is_empty() {
            return Err(AgentError::InvalidVerdict);
        }
        Ok(Verdict::Continue {
            feedback: feedback.trim().to_string(),
        })
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass { .. })
    }

    pub fn feedback(&self) -> Option<&str> {
        match self {
            Verdict::Continue { feedback } => Some(feedback),
            Verdict::Pass { .. } => None,
        }
    }

    /// Turn a critic's raw turn into a decision.
    ///
    /// Order: `exit_loop` tool call, then the `EXIT` sentinel as a whole word,
    /// then any text as feedback. Nothing at all is treated as CONTINUE.
    pub fn interpret(text: Option<&str>, exit_requested: bool) -> Self {
        let text = text.map(str::trim).filter(|t| !t.is_empty());

        if exit_requested {
            return match text {
                Some(t) => Verdict::pass_with(t),
                None => Verdict::pass(),
            };
        }

        match text {
            Some(t) if exit_re().is_match(t) => Verdict::pass_with(strip_sentinel(t)),
            Some(t) => Verdict::Continue {
                feedback: t.to_string(),
            },
            None => {
                warn!("Critic produced no verdict; continuing with fallback feedback");
                Verdict::Continue {
                    feedback: FALLBACK_FEEDBACK.to_string(),
                }
            }
        }
    }
}
