//! Code generator stage.

use crate::error::TurnResult;
use crate::prompts;
use crate::repair::runner::{run_loop, StageProfile};
use crate::stages::{compile_update, StageContext};
use tracing::info;
use vk_protocol::state_models::{PipelineState, Stage, StateUpdate};
use vk_protocol::tool_models::ToolKind;

/// The task the generator works on: `task`, else the latest user message.
pub fn current_task(state: &PipelineState) -> String {
    if state.task.trim().is_empty() {
        state.last_user_text().unwrap_or_default()
    } else {
        state.task.clone()
    }
}

pub fn profile(ctx: &StageContext<'_>) -> StageProfile {
    StageProfile::new(Stage::Generate, prompts::generator_persona(ctx.language))
        .with_attempt_budget(ctx.budget.generate_attempts)
        .with_tools(vec![ToolKind::ValidateSyntax, ToolKind::Compile])
}

/// Draft and repair code for the current task.
///
/// The new candidate replaces `candidate_artifact` unless the loop produced
/// nothing, in which case the previous candidate is kept.
pub async fn run_generator(ctx: StageContext<'_>, state: &PipelineState) -> TurnResult<StateUpdate> {
    let task = current_task(state);
    let payload = prompts::generate_payload(
        &task,
        &state.candidate_artifact,
        &state.compile_error_log,
        ctx.language,
    );

    let outcome = run_loop(ctx.loop_ctx, state, &profile(&ctx), payload).await?;
    info!(
        verified = outcome.verified(),
        attempts = outcome.attempts,
        iterations = outcome.iterations,
        "Generator finished"
    );

    let mut update = compile_update(&outcome);
    if !outcome.artifact.trim().is_empty() {
        update.candidate_artifact = Some(outcome.artifact);
    }
    Ok(update)
}
