//! Plan execution: one generation loop per subtask.

use crate::error::TurnResult;
use crate::stages::generator::run_generator;
use crate::stages::StageContext;
use crate::state::turn::{complete_stage, enter_stage, log_to_turn, reset_loop_counters};
use tracing::info;
use vk_protocol::state_models::{PipelineState, Stage, StateUpdate};

/// How plan execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanProgress {
    /// Every subtask ran; the integration request is set up.
    Completed,
    /// The global ceiling was reached; remaining subtasks were skipped.
    CeilingReached,
}

/// Run the generator once per remaining subtask, starting at `plan_step`.
///
/// Subtasks run without streaming. Each subtask's artifact is appended to
/// `subtask_artifacts` and the cursor advances. On completion `task` is set
/// back to the original request for the integrator.
///
/// # Errors
///
/// Returns `TurnError` for fatal model or verifier failures. Merged updates
/// stay in `state`; the caller decides whether to keep them.
pub async fn execute_plan(
    ctx: StageContext<'_>,
    state: &mut PipelineState,
) -> TurnResult<PlanProgress> {
    let ctx = StageContext {
        stream_integration: false,
        ..ctx
    };

    while state.plan_step < state.plan.len() {
        let step = state.plan_step;
        let subtask = state.plan[step].clone();

        if !enter_stage(state, Stage::Generate, ctx.loop_ctx.events).await {
            info!(
                skipped = state.plan.len() - step,
                "Skipping remaining subtasks at the global ceiling"
            );
            return Ok(PlanProgress::CeilingReached);
        }
        info!(step = step + 1, total = state.plan.len(), %subtask, "Executing subtask");
        log_to_turn(
            ctx.loop_ctx.events,
            format!("Subtask {}/{}: {subtask}", step + 1, state.plan.len()),
        )
        .await;

        state.apply(reset_loop_counters());
        state.task = subtask;

        let update = run_generator(ctx, state).await?;
        complete_stage(state, Stage::Generate, update, ctx.loop_ctx.events).await;

        let mut parts = state.subtask_artifacts.clone();
        let artifact = &state.candidate_artifact;
        if !artifact.trim().is_empty() && parts.last() != Some(artifact) {
            parts.push(artifact.clone());
        }
        state.apply(StateUpdate {
            subtask_artifacts: Some(parts),
            plan_step: Some(step + 1),
            ..StateUpdate::default()
        });
    }

    state.task = state.original_task.clone();
    Ok(PlanProgress::Completed)
}
