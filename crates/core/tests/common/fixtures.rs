//! Test fixtures: configurations, sample programs and orchestrator wiring.

use crate::common::mock_verifiers::ScriptedVerifier;
use std::sync::Arc;
use tokio::sync::mpsc;
use vk_core::config::AppConfig;
use vk_core::model::{ScriptedModel, ScriptedReply};
use vk_core::state::InMemoryCheckpointStore;
use vk_core::{Orchestrator, TurnResult};
use vk_protocol::ipc::Event;
use vk_protocol::message_models::{ModelResponse, ToolCall};
use vk_protocol::turn_models::{TurnInput, TurnOutput};

/// A small, valid Grammo program.
#[allow(dead_code)]
pub const FACTORIAL: &str = "func int -> fact(int: n) {\n    if (n <= 1) { return 1; }\n    return n * fact(n - 1);\n}\n\nfunc void -> main() {\n    print(fact(5));\n}";

/// A draft of the factorial with no return statement.
#[allow(dead_code)]
pub const FACTORIAL_NO_RETURN: &str =
    "func int -> fact(int: n) {\n    n * fact(n - 1);\n}\n\nfunc void -> main() {\n    print(fact(5));\n}";

/// Wrap code in a Markdown fence, the way models usually answer.
#[allow(dead_code)]
pub fn fenced(code: &str) -> String {
    format!("Here is the program:\n```grammo\n{code}\n```")
}

/// A well-formed evaluator report.
#[allow(dead_code)]
pub fn report(summary: &str, tests: &str, code: &str) -> String {
    format!("SUMMARY: {summary}\nTESTS: {tests}\nSAFETY: none\n{code}")
}

/// A reply carrying a `run_tests` tool call.
#[allow(dead_code)]
pub fn run_tests_call(code: &str, tests: &str) -> ScriptedReply {
    let call = ToolCall {
        name: "run_tests".to_string(),
        args: serde_json::json!({"code": code, "tests": tests}),
        id: format!("call-{}", tests.len()),
    };
    ScriptedReply::Respond(ModelResponse::text("").with_tool_call(call))
}

/// A reply carrying a `compile` tool call.
#[allow(dead_code)]
pub fn compile_call(code: &str) -> ScriptedReply {
    let call = ToolCall {
        name: "compile".to_string(),
        args: serde_json::json!({"code": code}),
        id: "call-compile".to_string(),
    };
    ScriptedReply::Respond(ModelResponse::text("").with_tool_call(call))
}

/// Routing answer for the classification call.
#[allow(dead_code)]
pub fn route_reply(route: &str, needs_testing: bool) -> ScriptedReply {
    ScriptedReply::text(format!(
        "{{\"route\": \"{route}\", \"needs_testing\": {needs_testing}}}"
    ))
}

/// Defaults with a small, explicit budget.
#[allow(dead_code)]
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.budget.max_iterations = 8;
    config.budget.max_global_iterations = 50;
    config.retry.max_attempts = 3;
    config
}

/// An orchestrator wired to scripted collaborators, plus handles on them.
#[allow(dead_code)]
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub model: ScriptedModel,
    pub verifier: ScriptedVerifier,
    pub checkpoints: InMemoryCheckpointStore,
}

#[allow(dead_code)]
pub fn harness(
    config: AppConfig,
    replies: impl IntoIterator<Item = ScriptedReply>,
    verifier: ScriptedVerifier,
) -> Harness {
    let model = ScriptedModel::new(replies);
    let checkpoints = InMemoryCheckpointStore::new();
    let orchestrator = Orchestrator::builder(config)
        .model(Arc::new(model.clone()))
        .verifier(Arc::new(verifier.clone()))
        .checkpoints(Arc::new(checkpoints.clone()))
        .build()
        .expect("harness builds");
    Harness {
        orchestrator,
        model,
        verifier,
        checkpoints,
    }
}

/// Run one turn and collect every event it emitted.
#[allow(dead_code)]
pub async fn run_turn(
    orchestrator: &Orchestrator,
    session_id: &str,
    message: &str,
) -> (TurnResult<TurnOutput>, Vec<Event>) {
    let (events_tx, mut events_rx) = mpsc::channel(1024);
    let result = orchestrator
        .run_turn(TurnInput::new(session_id, message), &events_tx)
        .await;
    drop(events_tx);

    let mut events = Vec::new();
    while let Some(event) = events_rx.recv().await {
        events.push(event);
    }
    (result, events)
}
