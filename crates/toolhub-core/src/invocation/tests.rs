// crates/toolhub-core/src/invocation/tests.rs
// ============================================================================
// Module: Invocation Wrapper Unit Tests
// Description: Event accounting, guard short-circuit, and failure containment.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions."
)]

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use toolhub_config::Config;
use toolhub_config::ConfigStore;

use super::InvocationContext;
use super::Invoker;
use super::ToolError;
use super::ToolHandler;
use super::ToolOutput;
use crate::catalog::ToolDescriptor;
use crate::telemetry::Event;
use crate::telemetry::EventKind;
use crate::telemetry::TelemetryBus;

/// Handler behaviour under test.
enum Behaviour {
    Echo,
    Fail,
    Panic,
}

struct ScriptedHandler {
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl ScriptedHandler {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ToolHandler for ScriptedHandler {
    async fn call(
        &self,
        input: Value,
        context: InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Echo => Ok(ToolOutput::text(format!("{}:{input}", context.call_id))),
            Behaviour::Fail => Err(ToolError::Upstream("registry unreachable".to_string())),
            Behaviour::Panic => panic!("handler bug"),
        }
    }
}

fn invoker(config: Config) -> Invoker {
    Invoker::new(TelemetryBus::default(), Arc::new(ConfigStore::in_memory(config)))
}

fn kinds(events: &[Event]) -> Vec<EventKind> {
    events.iter().map(|event| event.kind).collect()
}

#[tokio::test]
async fn success_emits_call_then_result() {
    let invoker = invoker(Config::default());
    let handler = ScriptedHandler::new(Behaviour::Echo);
    let tool = ToolDescriptor::new("echo", "general", "Echo", "Echo");

    let output = invoker
        .invoke(&tool, handler.clone(), json!({ "text": "hi" }), Some("s1".to_string()))
        .await;

    assert!(!output.is_error);
    assert_eq!(output.text_content(), r#"1:{"text":"hi"}"#);
    let events = invoker.bus().recent_events();
    assert_eq!(kinds(&events), vec![EventKind::Call, EventKind::Result]);
    assert_eq!(events[0].input, Some(json!({ "text": "hi" })));
    assert_eq!(events[1].call_id, Some(events[0].id));
    assert_eq!(events[1].session_id.as_deref(), Some("s1"));
    assert!(events[1].duration_ms.is_some());
}

#[tokio::test]
async fn handler_error_becomes_error_result() {
    let invoker = invoker(Config::default());
    let handler = ScriptedHandler::new(Behaviour::Fail);
    let tool = ToolDescriptor::new("lookup", "web", "Lookup", "Lookup");

    let output = invoker.invoke(&tool, handler, json!({}), None).await;

    assert!(output.is_error);
    assert!(output.text_content().contains("registry unreachable"));
    let events = invoker.bus().recent_events();
    assert_eq!(kinds(&events), vec![EventKind::Call, EventKind::Error]);
    assert_eq!(events[1].call_id, Some(events[0].id));
    assert_eq!(invoker.bus().stats().totals.errors, 1);
}

#[tokio::test]
async fn handler_panic_is_contained() {
    let invoker = invoker(Config::default());
    let handler = ScriptedHandler::new(Behaviour::Panic);
    let tool = ToolDescriptor::new("buggy", "general", "Buggy", "Buggy");

    let output = invoker.invoke(&tool, handler, json!({}), None).await;

    assert!(output.is_error);
    assert!(output.text_content().contains("handler bug"));
    let events = invoker.bus().recent_events();
    assert_eq!(kinds(&events), vec![EventKind::Call, EventKind::Error]);
    assert!(!events.iter().any(|event| event.kind == EventKind::Result));

    let echo = ToolDescriptor::new("echo", "general", "Echo", "Echo");
    let after = invoker.invoke(&echo, ScriptedHandler::new(Behaviour::Echo), json!(1), None).await;
    assert!(!after.is_error);
}

#[tokio::test]
async fn guard_failure_never_reaches_handler() {
    let invoker = invoker(Config::default());
    let handler = ScriptedHandler::new(Behaviour::Echo);
    let tool = ToolDescriptor::new("search", "web", "Search", "Search").requires("apiKeys.x");

    let output = invoker.invoke(&tool, handler.clone(), json!({}), None).await;

    assert!(output.is_error);
    assert!(output.text_content().contains("apiKeys.x"));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    let events = invoker.bus().recent_events();
    let errors: Vec<&Event> =
        events.iter().filter(|event| event.kind == EventKind::Error).collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].error.as_deref().unwrap().contains("apiKeys.x"));
}

#[tokio::test]
async fn guard_reads_configuration_at_call_time() {
    let store = Arc::new(ConfigStore::in_memory(Config::default()));
    let invoker = Invoker::new(TelemetryBus::default(), Arc::clone(&store));
    let handler = ScriptedHandler::new(Behaviour::Echo);
    let tool = ToolDescriptor::new("search", "web", "Search", "Search").requires("apiKeys.x");

    assert!(invoker.invoke(&tool, handler.clone(), json!({}), None).await.is_error);
    store.merge(&json!({ "apiKeys": { "x": "secret" } })).unwrap();
    assert!(!invoker.invoke(&tool, handler.clone(), json!({}), None).await.is_error);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_invocations_are_independent() {
    let invoker = invoker(Config::default());
    let tool = ToolDescriptor::new("echo", "general", "Echo", "Echo");
    let mut tasks = Vec::new();
    for index in 0 .. 8 {
        let invoker = invoker.clone();
        let tool = tool.clone();
        tasks.push(tokio::spawn(async move {
            invoker.invoke(&tool, ScriptedHandler::new(Behaviour::Echo), json!(index), None).await
        }));
    }
    for task in tasks {
        assert!(!task.await.unwrap().is_error);
    }
    let stats = invoker.bus().stats();
    assert_eq!(stats.tools["echo"].total_calls, 8);
    assert_eq!(stats.tools["echo"].success_count, 8);
}
