//! Scripted roles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kisan_agent::{
    Advice, Advisor, AgentError, Author, Critic, Result, SharedState, TaskContext, Verdict,
};

/// Returns queued verdicts, then keeps repeating `fallback`
pub struct ScriptedCritic {
    verdicts: Mutex<VecDeque<Verdict>>,
    fallback: Verdict,
    pub calls: AtomicU32,
}

impl ScriptedCritic {
    pub fn new(verdicts: Vec<Verdict>, fallback: Verdict) -> Arc<Self> {
        Arc::new(Self {
            verdicts: Mutex::new(verdicts.into()),
            fallback,
            calls: AtomicU32::new(0),
        })
    }

    pub fn always(verdict: Verdict) -> Arc<Self> {
        Self::new(Vec::new(), verdict)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Critic for ScriptedCritic {
    fn name(&self) -> &str {
        "scripted_critic"
    }

    async fn judge(&self, _ctx: &TaskContext, _state: &mut SharedState) -> Result<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.verdicts.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Critic that always fails with a provider error
pub struct BrokenCritic;

#[async_trait]
impl Critic for BrokenCritic {
    fn name(&self) -> &str {
        "broken_critic"
    }

    async fn judge(&self, _ctx: &TaskContext, _state: &mut SharedState) -> Result<Verdict> {
        Err(AgentError::Provider(kisan_provider::ProviderError::RateLimited))
    }
}

/// Writes `<prefix> v<n>` to its field on every call
pub struct CountingAuthor {
    key: &'static str,
    prefix: &'static str,
    pub calls: AtomicU32,
}

impl CountingAuthor {
    pub fn new(key: &'static str, prefix: &'static str) -> Arc<Self> {
        Arc::new(Self {
            key,
            prefix,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Author for CountingAuthor {
    fn name(&self) -> &str {
        self.prefix
    }

    fn output_key(&self) -> &str {
        self.key
    }

    async fn write(&self, _ctx: &TaskContext, state: &mut SharedState) -> Result<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        state.set(self.key, format!("{} v{}", self.prefix, n));
        Ok(())
    }
}

/// Advisor with a fixed behaviour, for fan-out tests
pub enum StubAdvisor {
    Answer(&'static str, &'static str),
    FailAfterWriting(&'static str, &'static str),
    Sleep(&'static str, Duration),
    /// Writes a draft, then stalls
    SlowDraft(&'static str, &'static str, Duration),
}

#[async_trait]
impl Advisor for StubAdvisor {
    fn name(&self) -> &str {
        match self {
            StubAdvisor::Answer(name, _)
            | StubAdvisor::FailAfterWriting(name, _)
            | StubAdvisor::Sleep(name, _)
            | StubAdvisor::SlowDraft(name, _, _) => name,
        }
    }

    fn candidate_key(&self) -> &str {
        "DRAFT"
    }

    async fn advise(&self, ctx: &TaskContext, state: &mut SharedState) -> Result<Advice> {
        match self {
            StubAdvisor::Answer(_, text) => Ok(Advice {
                text: format!("{} ({})", text, ctx.get("CROP_DETAILS").unwrap_or("-")),
                approved: None,
                record: None,
            }),
            StubAdvisor::FailAfterWriting(_, partial) => {
                state.set("DRAFT", *partial);
                Err(AgentError::Provider(kisan_provider::ProviderError::Api(
                    "500: upstream unavailable".to_string(),
                )))
            }
            StubAdvisor::Sleep(_, duration) => {
                tokio::time::sleep(*duration).await;
                Ok(Advice {
                    text: "late".to_string(),
                    approved: None,
                    record: None,
                })
            }
            StubAdvisor::SlowDraft(_, draft, duration) => {
                state.set("DRAFT", *draft);
                tokio::time::sleep(*duration).await;
                Ok(Advice {
                    text: format!("{} (final)", draft),
                    approved: None,
                    record: None,
                })
            }
        }
    }
}

pub fn wheat() -> TaskContext {
    TaskContext::new()
        .with_fact("CROP_DETAILS", "wheat")
        .with_fact("LOCATION", "Karnal")
}
