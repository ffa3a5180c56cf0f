//! Sequential delegation with a stub classifier

mod common;

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use common::StubAdvisor;
use kisan_agent::{AgentError, Intent, IntentClassifier, Result, Router, RoutingTable};
use kisan_provider::{Message, ProviderError};
use kisan_session::SessionManager;

/// Replays intents and records the facts it was shown
struct StubClassifier {
    intents: Mutex<VecDeque<Result<Intent>>>,
    seen_facts: Mutex<Vec<BTreeMap<String, String>>>,
    seen_history: Mutex<Vec<usize>>,
}

impl StubClassifier {
    fn new(intents: Vec<Intent>) -> Arc<Self> {
        Self::scripted(intents.into_iter().map(Ok).collect())
    }

    fn scripted(intents: Vec<Result<Intent>>) -> Arc<Self> {
        Arc::new(Self {
            intents: Mutex::new(intents.into()),
            seen_facts: Mutex::new(Vec::new()),
            seen_history: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl IntentClassifier for StubClassifier {
    async fn classify(
        &self,
        history: &[Message],
        facts: &BTreeMap<String, String>,
        _input: &str,
    ) -> Result<Intent> {
        self.seen_facts.lock().unwrap().push(facts.clone());
        self.seen_history.lock().unwrap().push(history.len());
        self.intents
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Intent::Reply("Anything else?".to_string())))
    }
}

fn delegate(route: &str, facts: &[(&str, &str)]) -> Intent {
    Intent::Delegate {
        route: route.to_string(),
        facts: facts
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

fn table() -> RoutingTable {
    let mut table = RoutingTable::new();
    table.insert("weather", Arc::new(StubAdvisor::Answer("weather", "sunny")));
    table.insert(
        "mandi_prices",
        Arc::new(StubAdvisor::Answer("mandi_prices", "$210 per ton")),
    );
    table
}

#[tokio::test]
async fn test_reply_then_delegate_accumulates_facts() {
    let dir = TempDir::new().unwrap();
    let classifier = StubClassifier::new(vec![
        Intent::Reply("Which crop do you grow?".to_string()),
        delegate("weather", &[("CROP_DETAILS", "wheat")]),
        delegate("mandi_prices", &[("LOCATION", "Karnal")]),
    ]);
    let mut router = Router::new(table(), classifier.clone(), SessionManager::new(dir.path()));

    let first = router.handle("cli:farmer", "hello").await.unwrap();
    assert!(first.route.is_none());
    assert_eq!(first.text, "Which crop do you grow?");

    let second = router.handle("cli:farmer", "wheat").await.unwrap();
    assert_eq!(second.route.as_deref(), Some("weather"));
    assert_eq!(second.text, "sunny (wheat)");

    let third = router.handle("cli:farmer", "I am in Karnal, prices?").await.unwrap();
    assert_eq!(third.route.as_deref(), Some("mandi_prices"));
    assert_eq!(third.text, "$210 per ton (wheat)");

    let seen = classifier.seen_facts.lock().unwrap();
    assert!(seen[0].is_empty());
    assert_eq!(seen[2].get("CROP_DETAILS").map(String::as_str), Some("wheat"));
    assert_eq!(*classifier.seen_history.lock().unwrap(), vec![0, 2, 4]);
}

#[tokio::test]
async fn test_session_survives_router_restart() {
    let dir = TempDir::new().unwrap();

    {
        let classifier = StubClassifier::new(vec![delegate(
            "weather",
            &[("CROP_DETAILS", "rice"), ("LOCATION", "Cuttack")],
        )]);
        let mut router = Router::new(table(), classifier, SessionManager::new(dir.path()));
        router.handle("cli:farmer", "rice in Cuttack").await.unwrap();
    }

    let classifier = StubClassifier::new(vec![delegate("mandi_prices", &[])]);
    let mut router = Router::new(table(), classifier.clone(), SessionManager::new(dir.path()));
    let reply = router.handle("cli:farmer", "prices?").await.unwrap();

    assert_eq!(reply.text, "$210 per ton (rice)");
    let seen = classifier.seen_facts.lock().unwrap();
    assert_eq!(seen[0].get("LOCATION").map(String::as_str), Some("Cuttack"));
}

#[tokio::test]
async fn test_unknown_route_is_error_and_recorded() {
    let dir = TempDir::new().unwrap();
    let classifier = StubClassifier::new(vec![delegate("astrology", &[])]);
    let mut router = Router::new(table(), classifier, SessionManager::new(dir.path()));

    let err = router.handle("cli:farmer", "horoscope").await.unwrap_err();
    assert!(matches!(err, AgentError::UnknownRoute(r) if r == "astrology"));

    let mut sessions = SessionManager::new(dir.path());
    let session = sessions.get_or_create("cli:farmer").await;
    assert_eq!(session.messages.len(), 2);
    assert!(session.messages[1].content.starts_with("Error: unknown route"));
}

#[tokio::test]
async fn test_failed_advisor_surfaces_error() {
    let dir = TempDir::new().unwrap();
    let mut table = table();
    table.insert(
        "gov_schemes",
        Arc::new(StubAdvisor::FailAfterWriting("gov_schemes", "draft")),
    );
    let classifier = StubClassifier::new(vec![delegate("gov_schemes", &[("CROP_DETAILS", "wheat")])]);
    let mut router = Router::new(table, classifier, SessionManager::new(dir.path()));

    let err = router.handle("s", "schemes").await.unwrap_err();
    assert!(matches!(err, AgentError::Provider(_)));
}

#[tokio::test]
async fn test_failed_classification_still_records_turn() {
    let dir = TempDir::new().unwrap();
    let classifier = StubClassifier::scripted(vec![
        Err(AgentError::Provider(ProviderError::RateLimited)),
        Ok(Intent::Reply("Which crop?".to_string())),
    ]);
    let mut router = Router::new(table(), classifier.clone(), SessionManager::new(dir.path()));

    let err = router.handle("cli:farmer", "namaste").await.unwrap_err();
    assert!(matches!(err, AgentError::Provider(ProviderError::RateLimited)));

    router.handle("cli:farmer", "namaste again").await.unwrap();
    assert_eq!(*classifier.seen_history.lock().unwrap(), vec![0, 2]);

    let mut sessions = SessionManager::new(dir.path());
    let session = sessions.get_or_create("cli:farmer").await;
    assert_eq!(session.messages[0].content, "namaste");
    assert!(session.messages[1].content.starts_with("Error: "));
    assert_eq!(session.messages.len(), 4);
}

#[tokio::test]
async fn test_history_window_limits_classifier_view() {
    let dir = TempDir::new().unwrap();
    let classifier = StubClassifier::new(Vec::new());
    let mut router = Router::new(table(), classifier.clone(), SessionManager::new(dir.path()))
        .with_history_window(3);

    for turn in ["one", "two", "three"] {
        router.handle("cli:farmer", turn).await.unwrap();
    }

    assert_eq!(*classifier.seen_history.lock().unwrap(), vec![0, 2, 3]);
}
