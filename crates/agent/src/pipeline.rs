//! Advisors: something the orchestrator can run for one task context

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::critique::{CritiqueLoop, LoopRecord};
use crate::role::Author;
use crate::state::{SharedState, TaskContext};
use crate::{AgentError, Result};

/// What an advisor hands back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advice {
    pub text: String,
    /// `None` for advisors without a critic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<LoopRecord>,
}

#[async_trait]
pub trait Advisor: Send + Sync {
    fn name(&self) -> &str;

    /// Field holding the advisor's current answer, for partial results
    fn candidate_key(&self) -> &str;

    async fn advise(&self, ctx: &TaskContext, state: &mut SharedState) -> Result<Advice>;
}

/// Generator pass followed by a critique/refine loop
pub struct RefinementPipeline {
    name: String,
    generator: Arc<dyn Author>,
    refinement: CritiqueLoop,
}

impl RefinementPipeline {
    pub fn new(
        name: impl Into<String>,
        generator: Arc<dyn Author>,
        refinement: CritiqueLoop,
    ) -> Result<Self> {
        let name = name.into();
        if generator.output_key() != refinement.candidate_key() {
            return Err(AgentError::InvalidConfig(format!(
                "pipeline '{}': generator writes {} but the loop refines {}",
                name,
                generator.output_key(),
                refinement.candidate_key()
            )));
        }

        Ok(Self {
            name,
            generator,
            refinement,
        })
    }

    pub fn refinement(&self) -> &CritiqueLoop {
        &self.refinement
    }
}

#[async_trait]
impl Advisor for RefinementPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn candidate_key(&self) -> &str {
        self.refinement.candidate_key()
    }

    async fn advise(&self, ctx: &TaskContext, state: &mut SharedState) -> Result<Advice> {
        debug!("Pipeline {}: generating with {}", self.name, self.generator.name());
        self.generator.write(ctx, state).await?;

        let outcome = self.refinement.run(ctx, state).await?;
        Ok(Advice {
            text: outcome.candidate,
            approved: Some(outcome.approved),
            record: Some(outcome.record),
        })
    }
}

/// One role, no critic
pub struct SingleAdvisor {
    author: Arc<dyn Author>,
}

impl SingleAdvisor {
    pub fn new(author: Arc<dyn Author>) -> Self {
        Self { author }
    }
}

#[async_trait]
impl Advisor for SingleAdvisor {
    fn name(&self) -> &str {
        self.author.name()
    }

    fn candidate_key(&self) -> &str {
        self.author.output_key()
    }

    async fn advise(&self, ctx: &TaskContext, state: &mut SharedState) -> Result<Advice> {
        self.author.write(ctx, state).await?;
        let text = state
            .text(self.author.output_key())
            .ok_or_else(|| AgentError::EmptyResponse(self.author.name().to_string()))?;

        Ok(Advice {
            text,
            approved: None,
            record: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Critic;
    use crate::verdict::Verdict;

    struct Fixed(&'static str, &'static str);

    #[async_trait]
    impl Author for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn output_key(&self) -> &str {
            self.0
        }

        async fn write(&self, _ctx: &TaskContext, state: &mut SharedState) -> Result<()> {
            state.set(self.0, self.1);
            Ok(())
        }
    }

    struct Pass;

    #[async_trait]
    impl Critic for Pass {
        fn name(&self) -> &str {
            "pass"
        }

        async fn judge(&self, _ctx: &TaskContext, _state: &mut SharedState) -> Result<Verdict> {
            Ok(Verdict::pass())
        }
    }

    #[test]
    fn test_mismatched_keys_rejected() {
        let refinement =
            CritiqueLoop::new("crop", Arc::new(Pass), Arc::new(Fixed("CROP_REPORT", "v1")), 3)
                .unwrap();
        let result =
            RefinementPipeline::new("crop", Arc::new(Fixed("OTHER", "v0")), refinement);
        assert!(matches!(result, Err(AgentError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_pipeline_generates_then_loops() {
        let refinement =
            CritiqueLoop::new("crop", Arc::new(Pass), Arc::new(Fixed("CROP_REPORT", "v1")), 3)
                .unwrap();
        let pipeline =
            RefinementPipeline::new("crop", Arc::new(Fixed("CROP_REPORT", "v0")), refinement)
                .unwrap();

        let mut state = SharedState::new();
        let advice = pipeline.advise(&TaskContext::new(), &mut state).await.unwrap();
        assert_eq!(advice.text, "v0");
        assert_eq!(advice.approved, Some(true));
        assert_eq!(advice.record.unwrap().critic_calls, 1);
    }

    #[tokio::test]
    async fn test_single_advisor() {
        let advisor = SingleAdvisor::new(Arc::new(Fixed("WEATHER_REPORT", "Sunny, 32°C")));
        assert_eq!(advisor.candidate_key(), "WEATHER_REPORT");

        let mut state = SharedState::new();
        let advice = advisor.advise(&TaskContext::new(), &mut state).await.unwrap();
        assert_eq!(advice.text, "Sunny, 32°C");
        assert!(advice.approved.is_none());
        assert!(advice.record.is_none());
    }
}
