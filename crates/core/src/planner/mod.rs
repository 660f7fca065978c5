//! Planner sub-pipeline.
//!
//! ```text
//! MakePlan → AskApproval ⟂ (turn ends) → HandleApproval → RevisePlan → AskApproval
//!                                                       → ExecutePlan → Integrate
//! ```
//!
//! Suspension is represented by `awaiting_approval`; the next user message is
//! read as the reply to the proposed plan.

pub mod execute;
pub mod policy;

pub use execute::{execute_plan, PlanProgress};
pub use policy::{
    generic_plan, parse_plan, ApprovalPolicy, ApprovalReply, DefaultPlanPolicy, PlanPolicy,
    TokenApprovalPolicy,
};

use crate::error::TurnResult;
use crate::model::ResilientModel;
use crate::prompts;
use crate::stages::generator::current_task;
use crate::state::turn::emit;
use tokio::sync::mpsc::Sender;
use tracing::info;
use vk_protocol::ipc::Event;
use vk_protocol::message_models::Message;
use vk_protocol::state_models::{PipelineState, StateUpdate};

/// Collaborators of the planner steps.
#[derive(Clone, Copy)]
pub struct PlannerContext<'a> {
    pub model: &'a ResilientModel,
    pub plan_policy: &'a dyn PlanPolicy,
    pub approval_policy: &'a dyn ApprovalPolicy,
    pub events: &'a Sender<Event>,
}

/// Ask the model to decompose the current request.
///
/// Sets `original_task`, which later stages treat as immutable, and resets
/// the plan cursor and per-subtask artifacts.
///
/// # Errors
///
/// Returns `TurnError::Model` when the model call fails fatally.
pub async fn make_plan(ctx: PlannerContext<'_>, state: &PipelineState) -> TurnResult<StateUpdate> {
    let original = current_task(state).trim().to_string();
    let conversation = [
        Message::system(prompts::planner_persona()),
        Message::user(original.clone()),
    ];
    let response = ctx.model.invoke(&conversation, &[]).await?;

    let parsed = ctx.plan_policy.parse(&response.content.normalize());
    let plan = ctx.plan_policy.review(&original, parsed);
    info!(steps = plan.len(), "Plan created");

    Ok(StateUpdate {
        task: Some(original.clone()),
        original_task: Some(original),
        plan: Some(plan),
        plan_step: Some(0),
        subtask_artifacts: Some(Vec::new()),
        ..StateUpdate::default()
    })
}

/// Present the plan and suspend the turn.
pub async fn ask_approval(ctx: PlannerContext<'_>, plan: &[String]) -> StateUpdate {
    emit(
        ctx.events,
        Event::AwaitingApproval {
            plan: plan.to_vec(),
        },
    )
    .await;

    StateUpdate {
        awaiting_approval: Some(true),
        ..StateUpdate::default()
    }
    .message(Message::assistant(prompts::ask_approval_message(plan)))
}

/// Classify the user's reply to a pending plan.
///
/// An unrecognized reply keeps the planner suspended and asks again.
pub fn handle_approval(ctx: PlannerContext<'_>, state: &PipelineState) -> (ApprovalReply, StateUpdate) {
    let reply_text = state.last_user_text().unwrap_or_default();
    let reply = ctx.approval_policy.classify(&reply_text);
    info!(reply = ?reply, "Approval reply classified");

    let (awaiting, message) = match reply {
        ApprovalReply::Approve => (false, "Ok, proceeding with the plan.".to_string()),
        ApprovalReply::Reject => (
            false,
            "Ok, revising the plan based on your feedback.".to_string(),
        ),
        ApprovalReply::Unrecognized => (true, prompts::clarify_approval_message(&state.plan)),
    };

    let update = StateUpdate {
        awaiting_approval: Some(awaiting),
        ..StateUpdate::default()
    }
    .message(Message::assistant(message));
    (reply, update)
}

/// Re-plan using the user's feedback on the rejected plan.
///
/// # Errors
///
/// Returns `TurnError::Model` when the model call fails fatally.
pub async fn revise_plan(
    ctx: PlannerContext<'_>,
    state: &PipelineState,
    feedback: &str,
) -> TurnResult<StateUpdate> {
    let original = if state.original_task.trim().is_empty() {
        current_task(state)
    } else {
        state.original_task.clone()
    };
    let conversation = [
        Message::system(prompts::revise_plan_persona()),
        Message::user(prompts::revise_plan_payload(&original, &state.plan, feedback)),
    ];
    let response = ctx.model.invoke(&conversation, &[]).await?;

    let parsed = ctx.plan_policy.parse(&response.content.normalize());
    let plan = ctx.plan_policy.review(&original, parsed);
    info!(steps = plan.len(), "Plan revised");

    Ok(StateUpdate {
        plan: Some(plan),
        plan_step: Some(0),
        ..StateUpdate::default()
    })
}
