//! Turn lifecycle helpers.
//!
//! This module provides functions for seeding a turn's `PipelineState`,
//! entering stages under the global iteration ceiling, and emitting the
//! matching events.

use crate::config::models::BudgetConfig;
use tokio::sync::mpsc::Sender;
use tracing::{info, warn};
use vk_protocol::ipc::Event;
use vk_protocol::message_models::Message;
use vk_protocol::state_models::{PipelineState, Stage, StateUpdate};

/// Build the state for a new turn.
///
/// Conversation history carries over from the previous turn. While the
/// planner is waiting for approval, the proposed plan and its task carry over
/// too; every other field starts fresh.
///
/// # Arguments
///
/// * `previous` - The session's last checkpointed state, if any
/// * `user_message` - The new user message
/// * `budget` - Iteration budgets for the turn
pub fn seed_turn(
    previous: Option<PipelineState>,
    user_message: &str,
    budget: &BudgetConfig,
) -> PipelineState {
    let mut state = PipelineState::new(budget.max_iterations, budget.max_global_iterations);

    if let Some(previous) = previous {
        state.messages = previous.messages;
        if previous.awaiting_approval {
            state.awaiting_approval = true;
            state.plan = previous.plan;
            state.task = previous.task;
            state.original_task = previous.original_task;
            state.needs_testing = previous.needs_testing;
            state.route = previous.route;
        }
    }

    state.messages.push(Message::user(user_message));
    state
}

/// Send an event, ignoring a closed receiver.
pub async fn emit(events_tx: &Sender<Event>, event: Event) {
    let _ = events_tx.send(event).await;
}

/// Emit a free-form log line.
pub async fn log_to_turn(events_tx: &Sender<Event>, message: impl Into<String>) {
    emit(
        events_tx,
        Event::Log {
            message: message.into(),
        },
    )
    .await;
}

/// Enter a stage.
///
/// # Returns
///
/// `false` when the global iteration ceiling has been reached; the caller
/// must skip the stage's work and go straight to finalization.
pub async fn enter_stage(state: &PipelineState, stage: Stage, events_tx: &Sender<Event>) -> bool {
    info!(
        stage = %stage,
        global_iteration = state.global_iteration_count,
        "Entering stage"
    );
    emit(
        events_tx,
        Event::StageEntered {
            stage,
            global_iteration: state.global_iteration_count,
        },
    )
    .await;

    if state.global_budget_exhausted() {
        warn!(
            stage = %stage,
            global_iteration = state.global_iteration_count,
            max_global_iterations = state.max_global_iterations,
            "Global iteration ceiling reached"
        );
        emit(
            events_tx,
            Event::CeilingReached {
                stage,
                global_iteration: state.global_iteration_count,
                max_global_iterations: state.max_global_iterations,
            },
        )
        .await;
        return false;
    }
    true
}

/// Merge a stage's update and emit `StageCompleted`.
pub async fn complete_stage(
    state: &mut PipelineState,
    stage: Stage,
    update: StateUpdate,
    events_tx: &Sender<Event>,
) {
    state.apply(update);
    emit(events_tx, Event::StageCompleted { stage }).await;
}

/// Update resetting the per-loop counters at the start of a repair loop.
pub fn reset_loop_counters() -> StateUpdate {
    StateUpdate {
        iteration_count: Some(0),
        compile_attempts: Some(0),
        compile_error_log: Some(Vec::new()),
        ..StateUpdate::default()
    }
}
