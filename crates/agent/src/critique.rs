//! Bounded critique/refine loop
//!
//! After a generator has written a candidate, the loop alternates critic and
//! refiner calls. `max_iterations` counts critic calls: a loop of N rounds
//! makes at most N critic calls and N-1 refiner calls. The critic's PASS ends
//! the loop immediately; N CONTINUEs end it exhausted with the last
//! refinement as the result.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::role::{Author, Critic};
use crate::state::{SharedState, TaskContext};
use crate::verdict::Verdict;
use crate::{AgentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    AwaitingCritique,
    AwaitingRefinement,
    DonePassed,
    DoneExhausted,
}

impl LoopState {
    pub fn is_done(self) -> bool {
        matches!(self, LoopState::DonePassed | LoopState::DoneExhausted)
    }
}

/// Progress of one loop execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopRecord {
    pub id: Uuid,
    pub loop_name: String,
    /// 0-indexed round
    pub iteration: u32,
    pub max_iterations: u32,
    pub state: LoopState,
    pub critic_calls: u32,
    pub refiner_calls: u32,
    pub last_verdict: Option<Verdict>,
    pub started_at: DateTime<Local>,
}

impl LoopRecord {
    fn new(loop_name: &str, max_iterations: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            loop_name: loop_name.to_string(),
            iteration: 0,
            max_iterations,
            state: LoopState::AwaitingCritique,
            critic_calls: 0,
            refiner_calls: 0,
            last_verdict: None,
            started_at: Local::now(),
        }
    }
}

/// Final candidate plus how the loop ended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopOutcome {
    pub candidate: String,
    pub approved: bool,
    pub record: LoopRecord,
}

pub struct CritiqueLoop {
    name: String,
    critic: Arc<dyn Critic>,
    refiner: Arc<dyn Author>,
    candidate_key: String,
    feedback_key: String,
    max_iterations: u32,
}

impl CritiqueLoop {
    /// The candidate field is whatever the refiner writes. Feedback goes to
    /// `<NAME>_FEEDBACK` unless overridden.
    pub fn new(
        name: impl Into<String>,
        critic: Arc<dyn Critic>,
        refiner: Arc<dyn Author>,
        max_iterations: u32,
    ) -> Result<Self> {
        let name = name.into();
        if max_iterations == 0 {
            return Err(AgentError::InvalidConfig(format!(
                "loop '{}' needs at least one iteration",
                name
            )));
        }

        Ok(Self {
            candidate_key: refiner.output_key().to_string(),
            feedback_key: format!("{}_FEEDBACK", name.to_uppercase()),
            name,
            critic,
            refiner,
            max_iterations,
        })
    }

    pub fn with_feedback_key(mut self, key: impl Into<String>) -> Self {
        self.feedback_key = key.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn candidate_key(&self) -> &str {
        &self.candidate_key
    }

    pub fn feedback_key(&self) -> &str {
        &self.feedback_key
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Drive the loop to a terminal state.
    ///
    /// Role errors propagate as-is; whatever the roles already wrote stays in
    /// `state`.
    pub async fn run(&self, ctx: &TaskContext, state: &mut SharedState) -> Result<LoopOutcome> {
        state.require(&self.candidate_key)?;

        let mut record = LoopRecord::new(&self.name, self.max_iterations);
        info!(
            "Loop {} started ({}, max {} rounds)",
            self.name, record.id, self.max_iterations
        );

        while !record.state.is_done() {
            match record.state {
                LoopState::AwaitingCritique => {
                    let verdict = self.critic.judge(ctx, state).await?;
                    record.critic_calls += 1;
                    debug!(
                        "Loop {} round {}: {} says {}",
                        self.name,
                        record.iteration,
                        self.critic.name(),
                        if verdict.is_pass() { "PASS" } else { "CONTINUE" }
                    );

                    record.state = match &verdict {
                        Verdict::Pass { .. } => LoopState::DonePassed,
                        Verdict::Continue { feedback } => {
                            state.append(&self.feedback_key, feedback.as_str())?;
                            if record.iteration + 1 < self.max_iterations {
                                LoopState::AwaitingRefinement
                            } else {
                                LoopState::DoneExhausted
                            }
                        }
                    };
                    record.last_verdict = Some(verdict);
                }
                LoopState::AwaitingRefinement => {
                    self.refiner.write(ctx, state).await?;
                    record.refiner_calls += 1;
                    record.iteration += 1;
                    record.state = LoopState::AwaitingCritique;
                }
                LoopState::DonePassed | LoopState::DoneExhausted => {}
            }
        }

        let candidate = state.text(&self.candidate_key).unwrap_or_default();
        let approved = record.state == LoopState::DonePassed;
        info!(
            "Loop {} finished: {:?} after {} critic / {} refiner calls",
            self.name, record.state, record.critic_calls, record.refiner_calls
        );

        Ok(LoopOutcome {
            candidate,
            approved,
            record,
        })
    }
}
