//! Integrator stage: merges per-subtask artifacts into one program.

use crate::error::TurnResult;
use crate::prompts;
use crate::repair::runner::{run_loop, StageProfile};
use crate::stages::{compile_update, StageContext};
use tracing::info;
use vk_protocol::state_models::{PipelineState, Stage, StateUpdate};
use vk_protocol::tool_models::ToolKind;

pub fn profile(ctx: &StageContext<'_>) -> StageProfile {
    StageProfile::new(Stage::Integrate, prompts::integrator_persona(ctx.language))
        .with_attempt_budget(ctx.budget.integrate_attempts)
        .with_tools(vec![ToolKind::ValidateSyntax, ToolKind::Compile])
        .with_stream(ctx.stream_integration)
}

/// Parts to merge: the subtask artifacts, or the current artifact alone.
fn parts(state: &PipelineState) -> Vec<String> {
    let parts: Vec<String> = state
        .subtask_artifacts
        .iter()
        .filter(|part| !part.trim().is_empty())
        .cloned()
        .collect();
    if parts.is_empty() && !state.current_artifact().trim().is_empty() {
        vec![state.current_artifact().to_string()]
    } else {
        parts
    }
}

/// Assemble the program.
///
/// Writes `assembled_artifact` and `candidate_artifact`. When the loop
/// produced nothing, the parts are concatenated as a last resort.
pub async fn run_integrator(ctx: StageContext<'_>, state: &PipelineState) -> TurnResult<StateUpdate> {
    let parts = parts(state);
    let original = if state.original_task.trim().is_empty() {
        state.task.clone()
    } else {
        state.original_task.clone()
    };
    let payload = prompts::integrate_payload(&original, &state.plan, &parts);

    let outcome = run_loop(ctx.loop_ctx, state, &profile(&ctx), payload).await?;
    info!(
        verified = outcome.verified(),
        parts = parts.len(),
        attempts = outcome.attempts,
        "Integrator finished"
    );

    let assembled = if outcome.artifact.trim().is_empty() {
        parts.join("\n\n")
    } else {
        outcome.artifact.clone()
    };

    let mut update = compile_update(&outcome);
    update.task = Some(original);
    update.candidate_artifact = Some(assembled.clone());
    update.assembled_artifact = Some(assembled);
    Ok(update)
}
