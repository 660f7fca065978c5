//! Session boundary models.
//!
//! A turn is one request/response cycle initiated by a user message.

use serde::{Deserialize, Serialize};

use crate::state_models::PipelineState;
use crate::tool_models::{CompileResult, TestResult};

/// Input to a single turn.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TurnInput {
    /// Key of the session checkpoint.
    pub session_id: String,

    pub user_message: String,
}

impl TurnInput {
    pub fn new(session_id: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_message: user_message.into(),
        }
    }
}

/// Output of a single turn.
///
/// A turn always carries some artifact and summary, even when the repair
/// budget was exhausted; inspect `compile_result`/`test_result` for pass/fail.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TurnOutput {
    pub final_artifact: String,

    pub validation_summary: String,

    pub safety_notes: String,

    pub test_summary: String,

    pub compile_result: Option<CompileResult>,

    pub test_result: Option<TestResult>,

    /// Text of the last assistant message (e.g. the plan approval prompt).
    pub reply: String,

    /// True when the turn ended suspended, waiting for the user's approval.
    pub suspended: bool,
}

impl TurnOutput {
    /// Project the user-visible fields out of a final state.
    pub fn from_state(state: &PipelineState) -> Self {
        let reply = state
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::message_models::Role::Assistant)
            .map(|m| m.text().trim().to_string())
            .unwrap_or_default();

        Self {
            final_artifact: state.current_artifact().trim().to_string(),
            validation_summary: state.validation_summary.clone(),
            safety_notes: state.safety_notes.clone(),
            test_summary: state.test_summary.clone(),
            compile_result: state.compile_result.clone(),
            test_result: state.test_result.clone(),
            reply,
            suspended: state.awaiting_approval,
        }
    }

    /// True when the artifact is known to compile.
    pub fn compiled(&self) -> bool {
        self.compile_result.as_ref().is_some_and(|r| r.compiled)
    }
}
