//! Pipeline stages.
//!
//! Each loop stage builds a [`StageProfile`](crate::repair::StageProfile) and
//! a payload, runs the shared repair loop, and turns the outcome into a
//! sparse [`StateUpdate`](vk_protocol::state_models::StateUpdate).

pub mod evaluator;
pub mod generator;
pub mod integrator;
pub mod tester;

use crate::config::models::BudgetConfig;
use crate::repair::runner::{LoopContext, LoopOutcome};
use vk_protocol::message_models::Message;
use vk_protocol::state_models::StateUpdate;

/// What a stage needs besides the state.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub loop_ctx: LoopContext<'a>,
    pub budget: &'a BudgetConfig,
    pub language: &'a str,
    pub stream_integration: bool,
}

/// Counter and compile fields shared by every compile-checked stage.
pub(crate) fn compile_update(outcome: &LoopOutcome) -> StateUpdate {
    let mut update = StateUpdate {
        compile_attempts: Some(outcome.attempts),
        compile_result: outcome.compile_result.clone(),
        compile_error_log: Some(outcome.error_log.clone()),
        iteration_count: Some(outcome.iterations),
        global_iteration_count: Some(outcome.global_iterations),
        ..StateUpdate::default()
    };
    if !outcome.raw_output.trim().is_empty() {
        update.messages.push(Message::assistant(outcome.raw_output.clone()));
    }
    update
}
