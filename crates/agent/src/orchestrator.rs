//! Parallel fan-out across advisors
//!
//! Every branch runs as its own task against the same read-only task
//! context and a private [`SharedState`]. A branch can complete, fail, time
//! out or be cancelled; none of those fail the fan-out itself. Results are
//! merged positionally, in the order the branches were declared.
//!
//! Dropping the join future cancels every branch still in flight.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pipeline::{Advice, Advisor};
use crate::state::{SharedState, TaskContext};

/// How one branch ended
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchOutcome {
    Completed(Advice),
    Failed {
        error: String,
        /// Candidate the branch had written before failing
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partial: Option<String>,
    },
    TimedOut {
        /// Candidate the branch had written before the deadline
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partial: Option<String>,
    },
    Cancelled,
}

impl BranchOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, BranchOutcome::Completed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            BranchOutcome::Completed(_) => "completed",
            BranchOutcome::Failed { .. } => "failed",
            BranchOutcome::TimedOut { .. } => "timed out",
            BranchOutcome::Cancelled => "cancelled",
        }
    }
}

/// One branch's result, still tagged with where it belongs
#[derive(Debug, Clone)]
pub struct BranchResult {
    pub report_key: String,
    pub advisor: String,
    pub outcome: BranchOutcome,
}

struct Branch {
    report_key: String,
    advisor: Arc<dyn Advisor>,
}

pub struct FanOut {
    branches: Vec<Branch>,
    timeout: Duration,
}

impl FanOut {
    pub fn new(timeout: Duration) -> Self {
        Self {
            branches: Vec::new(),
            timeout,
        }
    }

    pub fn branch(mut self, report_key: impl Into<String>, advisor: Arc<dyn Advisor>) -> Self {
        self.branches.push(Branch {
            report_key: report_key.into(),
            advisor,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn report_keys(&self) -> Vec<&str> {
        self.branches.iter().map(|b| b.report_key.as_str()).collect()
    }

    /// Run every branch concurrently and collect results in declaration order
    pub async fn run(&self, ctx: Arc<TaskContext>, cancel: CancellationToken) -> Vec<BranchResult> {
        info!("Fanning out to {} advisors", self.branches.len());

        // Branches observe a child token so that dropping this future stops
        // them without cancelling the caller's token.
        let branch_cancel = cancel.child_token();
        let _guard = branch_cancel.clone().drop_guard();

        let handles: Vec<_> = self
            .branches
            .iter()
            .map(|branch| {
                let advisor = branch.advisor.clone();
                let ctx = ctx.clone();
                let cancel = branch_cancel.clone();
                let timeout = self.timeout;
                tokio::spawn(async move { run_branch(advisor, ctx, cancel, timeout).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (branch, handle) in self.branches.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => BranchOutcome::Failed {
                    error: format!("branch task aborted: {}", e),
                    partial: None,
                },
            };

            match &outcome {
                BranchOutcome::Completed(_) => info!("[{}] completed", branch.report_key),
                other => warn!("[{}] {}", branch.report_key, other.label()),
            }

            results.push(BranchResult {
                report_key: branch.report_key.clone(),
                advisor: branch.advisor.name().to_string(),
                outcome,
            });
        }
        results
    }

    /// [`run`](Self::run) followed by [`merge`]
    pub async fn advise(&self, ctx: Arc<TaskContext>, cancel: CancellationToken) -> Report {
        merge(self.run(ctx, cancel).await)
    }
}

async fn run_branch(
    advisor: Arc<dyn Advisor>,
    ctx: Arc<TaskContext>,
    cancel: CancellationToken,
    timeout: Duration,
) -> BranchOutcome {
    let mut state = SharedState::new();

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        res = tokio::time::timeout(timeout, advisor.advise(&ctx, &mut state)) => Some(res),
    };

    match result {
        None => BranchOutcome::Cancelled,
        Some(Err(_elapsed)) => BranchOutcome::TimedOut {
            partial: state.text(advisor.candidate_key()),
        },
        Some(Ok(Ok(advice))) => BranchOutcome::Completed(advice),
        Some(Ok(Err(e))) => BranchOutcome::Failed {
            error: e.to_string(),
            partial: state.text(advisor.candidate_key()),
        },
    }
}

/// One report section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub report_key: String,
    pub advisor: String,
    #[serde(flatten)]
    pub outcome: BranchOutcome,
}

/// Merged fan-out result, in declaration order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub entries: Vec<ReportEntry>,
}

/// Place branch results under their report keys, keeping their order
pub fn merge(results: Vec<BranchResult>) -> Report {
    Report {
        entries: results
            .into_iter()
            .map(|r| ReportEntry {
                report_key: r.report_key,
                advisor: r.advisor,
                outcome: r.outcome,
            })
            .collect(),
    }
}

impl Report {
    pub fn get(&self, report_key: &str) -> Option<&BranchOutcome> {
        self.entries
            .iter()
            .find(|e| e.report_key == report_key)
            .map(|e| &e.outcome)
    }

    pub fn completed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_completed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.entries.len() - self.completed_count()
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!("## {}\n\n", entry.report_key));
            match &entry.outcome {
                BranchOutcome::Completed(advice) => {
                    match advice.approved {
                        Some(true) => out.push_str("_Approved by critic._\n\n"),
                        Some(false) => out.push_str("_Iteration budget exhausted; not approved._\n\n"),
                        None => {}
                    }
                    out.push_str(advice.text.trim());
                    out.push_str("\n\n");
                }
                BranchOutcome::Failed { error, partial } => {
                    out.push_str(&format!("**Failed:** {}\n\n", error));
                    if let Some(partial) = partial {
                        out.push_str("Partial result:\n\n");
                        out.push_str(partial.trim());
                        out.push_str("\n\n");
                    }
                }
                BranchOutcome::TimedOut { partial } => {
                    out.push_str("**Timed out.**\n\n");
                    if let Some(partial) = partial {
                        out.push_str("Partial result:\n\n");
                        out.push_str(partial.trim());
                        out.push_str("\n\n");
                    }
                }
                BranchOutcome::Cancelled => out.push_str("**Cancelled.**\n\n"),
            }
        }
        out.trim_end().to_string()
    }
}
