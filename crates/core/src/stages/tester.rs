//! Tester stage: writes tests, runs them through the `run_tests` tool and
//! repairs until they pass.
//!
//! The artifact is snapshotted on entry. If the loop ends with tests still
//! failing, the artifact is rolled back to the snapshot so a bad repair never
//! replaces working code.

use crate::error::TurnResult;
use crate::prompts;
use crate::repair::runner::{run_loop, Check, ExhaustReason, LoopTerminal, StageProfile};
use crate::stages::generator::current_task;
use crate::stages::StageContext;
use tracing::{info, warn};
use vk_protocol::message_models::Message;
use vk_protocol::state_models::{PipelineState, Stage, StateUpdate};
use vk_protocol::tool_models::ToolKind;

pub fn profile(ctx: &StageContext<'_>) -> StageProfile {
    StageProfile::new(Stage::Test, prompts::tester_persona(ctx.language))
        .with_attempt_budget(ctx.budget.test_attempts)
        .with_tools(vec![ToolKind::RunTests])
        .with_check(Check::Tests)
}

pub async fn run_tester(ctx: StageContext<'_>, state: &PipelineState) -> TurnResult<StateUpdate> {
    let snapshot = state.current_artifact().to_string();
    let task = current_task(state);
    let payload = prompts::test_payload(&task, &snapshot);

    let outcome = run_loop(ctx.loop_ctx, state, &profile(&ctx), payload).await?;

    let passed = outcome.test_result.as_ref().is_some_and(|r| r.passed);
    let artifact = if passed && !outcome.artifact.trim().is_empty() {
        outcome.artifact.clone()
    } else {
        if outcome.test_result.is_some() {
            warn!(attempts = outcome.attempts, "Tests still failing, rolling back artifact");
        }
        snapshot.clone()
    };

    let test_summary = match (&outcome.terminal, &outcome.test_result) {
        (LoopTerminal::Verified, _) => {
            format!("Tests passed after {} attempt(s).", outcome.attempts)
        }
        (LoopTerminal::Exhausted(ExhaustReason::NoToolCall), None) => {
            "Tests were not run: no run_tests call was made.".to_string()
        }
        (_, Some(result)) => format!(
            "Tests failing after {} attempt(s): {}",
            outcome.attempts,
            result.stderr.trim()
        ),
        (_, None) => "Tests were not run.".to_string(),
    };
    info!(passed, attempts = outcome.attempts, "Tester finished");

    let mut update = StateUpdate {
        test_attempts: Some(outcome.attempts),
        test_result: outcome.test_result.clone(),
        tests: outcome.tests.clone(),
        original_artifact_snapshot: Some(snapshot),
        iteration_count: Some(outcome.iterations),
        global_iteration_count: Some(outcome.global_iterations),
        test_summary: Some(test_summary.clone()),
        candidate_artifact: Some(artifact.clone()),
        ..StateUpdate::default()
    };
    if !state.assembled_artifact.trim().is_empty() {
        update.assembled_artifact = Some(artifact);
    }
    update.messages.push(Message::assistant(test_summary));
    Ok(update)
}
