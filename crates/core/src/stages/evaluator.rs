//! Evaluator stage: final review and the labelled report.
//!
//! The model answers with `SUMMARY:`/`TESTS:`/`SAFETY:` labels followed by
//! the final code. Only the code is compiled. The turn ends successfully
//! whether or not it compiles; callers read `compile_result`.

use crate::error::TurnResult;
use crate::prompts;
use crate::report::Report;
use crate::repair::runner::{run_loop, ArtifactMode, StageProfile};
use crate::stages::generator::current_task;
use crate::stages::{compile_update, StageContext};
use tracing::info;
use vk_protocol::message_models::Message;
use vk_protocol::state_models::{PipelineState, Stage, StateUpdate};
use vk_protocol::tool_models::ToolKind;

pub fn profile(ctx: &StageContext<'_>) -> StageProfile {
    StageProfile::new(Stage::Evaluate, prompts::evaluator_persona(ctx.language))
        .with_attempt_budget(ctx.budget.evaluate_attempts)
        .with_tools(vec![ToolKind::ValidateSyntax, ToolKind::Compile])
        .with_artifact(ArtifactMode::Report)
        .with_repair_reminder(prompts::EVALUATOR_REMINDER)
}

pub async fn run_evaluator(ctx: StageContext<'_>, state: &PipelineState) -> TurnResult<StateUpdate> {
    let task = current_task(state);
    let payload = prompts::evaluate_payload(
        &task,
        state.current_artifact(),
        state.test_result.as_ref(),
        &state.compile_error_log,
    );

    let outcome = run_loop(ctx.loop_ctx, state, &profile(&ctx), payload).await?;
    let report = Report::parse(&outcome.artifact);
    info!(
        compiled = outcome.compile_result.as_ref().is_some_and(|r| r.compiled),
        attempts = outcome.attempts,
        "Evaluator finished"
    );

    let mut update = compile_update(&outcome);
    // The report replaces the raw output in history.
    update.messages.clear();
    Ok(finalize(state, report, update))
}

/// Write a parsed report into the final state fields.
///
/// An empty report body falls back to the best artifact so far.
pub fn finalize(state: &PipelineState, report: Report, mut update: StateUpdate) -> StateUpdate {
    let code = if report.body.trim().is_empty() {
        state.current_artifact().to_string()
    } else {
        report.body.clone()
    };

    let notes = report.notes_text().to_string();
    update.validation_summary = Some(report.summary.clone());
    update.test_summary = Some(if notes.is_empty() {
        state.test_summary.clone()
    } else {
        notes
    });
    update.safety_notes = Some(report.safety_text().to_string());
    if !state.assembled_artifact.trim().is_empty() {
        update.assembled_artifact = Some(code.clone());
    }
    update.candidate_artifact = Some(code.clone());

    let answer = Report {
        body: code,
        ..report
    };
    update.messages.push(Message::assistant(answer.to_string()));
    update
}

/// Finalize without a model call after the global ceiling was reached.
pub fn finalize_at_ceiling(state: &PipelineState) -> StateUpdate {
    let summary = format!(
        "Stopped early: the global iteration ceiling ({}/{}) was reached. Returning the best artifact so far without further checks.",
        state.global_iteration_count, state.max_global_iterations
    );
    let report = Report {
        summary,
        notes: None,
        safety: None,
        body: String::new(),
    };
    finalize(state, report, StateUpdate::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_falls_back_to_candidate() {
        let mut state = PipelineState::default();
        state.candidate_artifact = "func void -> main() {}".to_string();
        state.test_summary = "Tests passed after 1 attempt(s).".to_string();

        let update = finalize(&state, Report::parse("SUMMARY: fine"), StateUpdate::default());
        state.apply(update);

        assert_eq!(state.validation_summary, "fine");
        assert_eq!(state.candidate_artifact, "func void -> main() {}");
        assert_eq!(state.test_summary, "Tests passed after 1 attempt(s).");
        assert!(state.assembled_artifact.is_empty());
    }

    #[test]
    fn test_finalize_at_ceiling_keeps_artifact() {
        let mut state = PipelineState::new(8, 30);
        state.global_iteration_count = 30;
        state.assembled_artifact = "var int: x;".to_string();

        let update = finalize_at_ceiling(&state);
        state.apply(update);

        assert!(state.validation_summary.contains("ceiling (30/30)"));
        assert_eq!(state.assembled_artifact, "var int: x;");
        assert_eq!(state.candidate_artifact, "var int: x;");
    }
}
