//! Sequential delegation
//!
//! A user turn is classified into either a direct reply or a delegation to
//! one named route. Dispatch itself is deterministic: the route name picks
//! the advisor from an explicit table. Facts collected along the way are
//! kept in the session and seed every delegated task context.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use kisan_provider::{log_response, ChatParams, Message, Provider, Tool, ToolChoice};
use kisan_session::SessionManager;

use crate::pipeline::{Advice, Advisor};
use crate::role::ModelSettings;
use crate::state::{SharedState, TaskContext};
use crate::{AgentError, Result};

/// Route name to advisor, in insertion order
#[derive(Default, Clone)]
pub struct RoutingTable {
    routes: Vec<(String, Arc<dyn Advisor>)>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route; re-inserting a name replaces the advisor in place
    pub fn insert(&mut self, route: impl Into<String>, advisor: Arc<dyn Advisor>) {
        let route = route.into();
        match self.routes.iter_mut().find(|(name, _)| *name == route) {
            Some(slot) => slot.1 = advisor,
            None => self.routes.push((route, advisor)),
        }
    }

    pub fn get(&self, route: &str) -> Option<&Arc<dyn Advisor>> {
        self.routes
            .iter()
            .find(|(name, _)| name == route)
            .map(|(_, advisor)| advisor)
    }

    pub fn routes(&self) -> Vec<&str> {
        self.routes.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Run the advisor registered under `route` with a fresh shared state
    pub async fn dispatch(&self, route: &str, ctx: &TaskContext) -> Result<Advice> {
        let advisor = self
            .get(route)
            .ok_or_else(|| AgentError::UnknownRoute(route.to_string()))?;
        info!("Dispatching to {}", route);

        let mut state = SharedState::new();
        advisor.advise(ctx, &mut state).await
    }
}

/// Classifier decision for one user turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Delegate {
        route: String,
        facts: BTreeMap<String, String>,
    },
    Reply(String),
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(
        &self,
        history: &[Message],
        facts: &BTreeMap<String, String>,
        input: &str,
    ) -> Result<Intent>;
}

const GREETER_INSTRUCTION: &str = "You are the front desk of a farming advisory service. \
If the farmer has not told you their crop yet, ask for the crop and location. \
Once you know enough, call the delegate tool with the best route and every fact you learned \
(CROP_DETAILS, LOCATION and anything else useful). Otherwise reply briefly.";

/// Asks the model to pick a route through a `delegate` tool
pub struct LlmClassifier {
    provider: Arc<dyn Provider>,
    settings: ModelSettings,
    routes: Vec<(String, String)>,
}

#[derive(Deserialize)]
struct DelegateArgs {
    route: String,
    #[serde(default)]
    facts: BTreeMap<String, String>,
}

impl LlmClassifier {
    /// `routes` pairs each route name with a one-line description
    pub fn new(
        provider: Arc<dyn Provider>,
        settings: ModelSettings,
        routes: Vec<(String, String)>,
    ) -> Self {
        Self {
            provider,
            settings,
            routes,
        }
    }

    fn delegate_tool(&self) -> Tool {
        let names: Vec<&str> = self.routes.iter().map(|(n, _)| n.as_str()).collect();
        Tool::new(
            "delegate",
            "Hand the farmer's request to one advisor",
            json!({
                "type": "object",
                "properties": {
                    "route": { "type": "string", "enum": names, "description": "Advisor to run" },
                    "facts": {
                        "type": "object",
                        "additionalProperties": { "type": "string" },
                        "description": "Facts gathered from the farmer, e.g. CROP_DETAILS, LOCATION"
                    }
                },
                "required": ["route"]
            }),
        )
    }

    fn system_prompt(&self, facts: &BTreeMap<String, String>) -> String {
        let mut prompt = format!("{}\n\n## Routes\n", GREETER_INSTRUCTION);
        for (name, description) in &self.routes {
            prompt.push_str(&format!("- {}: {}\n", name, description));
        }
        if !facts.is_empty() {
            prompt.push_str("\n## Known facts\n");
            for (k, v) in facts {
                prompt.push_str(&format!("{}: {}\n", k, v));
            }
        }
        prompt
    }
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    async fn classify(
        &self,
        history: &[Message],
        facts: &BTreeMap<String, String>,
        input: &str,
    ) -> Result<Intent> {
        let mut messages = vec![Message::system(self.system_prompt(facts))];
        messages.extend_from_slice(history);
        messages.push(Message::user(input));

        let params = ChatParams {
            model: self.settings.model.clone(),
            messages,
            tools: vec![self.delegate_tool()],
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            tool_choice: ToolChoice::Auto,
        };

        let response = self.provider.chat(params).await?;
        log_response("classifier", &response);

        if let Some(call) = response.tool_calls.iter().find(|c| c.name == "delegate") {
            let args: DelegateArgs = serde_json::from_value(call.arguments.clone())
                .map_err(crate::tools::ToolError::from)?;
            if !self.routes.iter().any(|(name, _)| *name == args.route) {
                return Err(AgentError::UnknownRoute(args.route));
            }
            debug!("Classifier delegated to {}", args.route);
            return Ok(Intent::Delegate {
                route: args.route,
                facts: args.facts,
            });
        }

        response
            .text_content()
            .map(|t| Intent::Reply(t.to_string()))
            .ok_or_else(|| AgentError::EmptyResponse("classifier".to_string()))
    }
}

/// Answer to one user turn
#[derive(Debug, Clone)]
pub struct RouterReply {
    pub route: Option<String>,
    pub text: String,
    pub approved: Option<bool>,
}

pub const DEFAULT_HISTORY_MESSAGES: usize = 20;

pub struct Router {
    table: RoutingTable,
    classifier: Arc<dyn IntentClassifier>,
    sessions: SessionManager,
    max_history_messages: usize,
}

impl Router {
    pub fn new(
        table: RoutingTable,
        classifier: Arc<dyn IntentClassifier>,
        sessions: SessionManager,
    ) -> Self {
        Self {
            table,
            classifier,
            sessions,
            max_history_messages: DEFAULT_HISTORY_MESSAGES,
        }
    }

    /// How many stored messages the classifier sees each turn
    pub fn with_history_window(mut self, max: usize) -> Self {
        self.max_history_messages = max;
        self
    }

    /// Handle one user turn in the given session
    pub async fn handle(&mut self, session_key: &str, input: &str) -> Result<RouterReply> {
        let (history, mut facts) = {
            let session = self.sessions.get_or_create(session_key).await;
            (
                session.get_history(self.max_history_messages),
                session.facts().clone(),
            )
        };

        // A failed classification is still recorded as a turn
        let outcome = match self.classifier.classify(&history, &facts, input).await {
            Err(e) => Err(e),
            Ok(Intent::Reply(text)) => Ok(RouterReply {
                route: None,
                text,
                approved: None,
            }),
            Ok(Intent::Delegate {
                route,
                facts: new_facts,
            }) => {
                for (k, v) in new_facts {
                    if !v.trim().is_empty() {
                        facts.insert(k, v.trim().to_string());
                    }
                }
                let ctx = TaskContext::from_facts(facts.clone());
                self.table.dispatch(&route, &ctx).await.map(|advice| RouterReply {
                    route: Some(route),
                    text: advice.text,
                    approved: advice.approved,
                })
            }
        };

        let session = self.sessions.get_or_create(session_key).await;
        for (k, v) in &facts {
            session.record_fact(k.as_str(), v.as_str());
        }
        session.add_message("user", input);
        match &outcome {
            Ok(reply) => session.add_reply(reply.text.as_str(), reply.route.as_deref()),
            Err(e) => session.add_reply(format!("Error: {}", e), None),
        }

        let snapshot = session.clone();
        if let Err(e) = self.sessions.save(&snapshot).await {
            warn!("Failed to save session {}: {}", session_key, e);
        }

        outcome
    }
}
