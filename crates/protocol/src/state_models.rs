//! Pipeline state threaded through every stage.
//!
//! A fresh [`PipelineState`] is seeded per user turn from the session's last
//! checkpoint. Stages never mutate it directly; they return a sparse
//! [`StateUpdate`] that the orchestrator merges before the next stage runs.

use serde::{Deserialize, Serialize};

use crate::message_models::Message;
use crate::tool_models::{CompileResult, TestResult};

/// Default per-stage iteration budget.
pub const DEFAULT_MAX_ITERATIONS: u32 = 8;

/// Default cross-stage iteration ceiling for one turn.
pub const DEFAULT_MAX_GLOBAL_ITERATIONS: u32 = 50;

/// The orchestrator's top-level routing decision.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    /// Direct generation of the whole artifact.
    Generate,
    /// Decomposition-first: plan, approve, execute per subtask, integrate.
    Plan,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Generate => f.write_str("generate"),
            Route::Plan => f.write_str("plan"),
        }
    }
}

/// Named stages of the pipeline state machine.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Generate,
    Plan,
    Integrate,
    Test,
    Evaluate,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Generate => "generate",
            Stage::Plan => "plan",
            Stage::Integrate => "integrate",
            Stage::Test => "test",
            Stage::Evaluate => "evaluate",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of data threaded through every stage of one turn.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PipelineState {
    /// Role-tagged conversation, append-only within a turn.
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Current directive.
    #[serde(default)]
    pub task: String,

    /// Root request; immutable once set by the planner.
    #[serde(default)]
    pub original_task: String,

    #[serde(default)]
    pub plan: Vec<String>,

    #[serde(default)]
    pub plan_step: usize,

    /// Suspends the planner between plan proposal and user confirmation.
    #[serde(default)]
    pub awaiting_approval: bool,

    /// Working source text of the stage in progress.
    #[serde(default)]
    pub candidate_artifact: String,

    /// The integrated whole.
    #[serde(default)]
    pub assembled_artifact: String,

    /// Artifacts produced per plan subtask, in plan order.
    #[serde(default)]
    pub subtask_artifacts: Vec<String>,

    #[serde(default)]
    pub compile_attempts: u32,

    #[serde(default)]
    pub compile_result: Option<CompileResult>,

    /// One entry per failed compile attempt.
    #[serde(default)]
    pub compile_error_log: Vec<String>,

    #[serde(default)]
    pub tests: String,

    #[serde(default)]
    pub test_attempts: u32,

    #[serde(default)]
    pub test_result: Option<TestResult>,

    /// Artifact as it was before the test stage touched it.
    #[serde(default)]
    pub original_artifact_snapshot: Option<String>,

    #[serde(default)]
    pub iteration_count: u32,

    pub max_iterations: u32,

    #[serde(default)]
    pub global_iteration_count: u32,

    pub max_global_iterations: u32,

    #[serde(default)]
    pub route: Option<Route>,

    #[serde(default)]
    pub needs_testing: bool,

    #[serde(default)]
    pub validation_summary: String,

    #[serde(default)]
    pub test_summary: String,

    #[serde(default)]
    pub safety_notes: String,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_GLOBAL_ITERATIONS)
    }
}

impl PipelineState {
    /// Create an empty state with the given budgets.
    pub fn new(max_iterations: u32, max_global_iterations: u32) -> Self {
        Self {
            messages: Vec::new(),
            task: String::new(),
            original_task: String::new(),
            plan: Vec::new(),
            plan_step: 0,
            awaiting_approval: false,
            candidate_artifact: String::new(),
            assembled_artifact: String::new(),
            subtask_artifacts: Vec::new(),
            compile_attempts: 0,
            compile_result: None,
            compile_error_log: Vec::new(),
            tests: String::new(),
            test_attempts: 0,
            test_result: None,
            original_artifact_snapshot: None,
            iteration_count: 0,
            max_iterations,
            global_iteration_count: 0,
            max_global_iterations,
            route: None,
            needs_testing: false,
            validation_summary: String::new(),
            test_summary: String::new(),
            safety_notes: String::new(),
        }
    }

    /// The best current artifact: the assembled one if present, else the candidate.
    pub fn current_artifact(&self) -> &str {
        if self.assembled_artifact.trim().is_empty() {
            &self.candidate_artifact
        } else {
            &self.assembled_artifact
        }
    }

    /// True once the cross-stage ceiling has been reached.
    pub fn global_budget_exhausted(&self) -> bool {
        self.global_iteration_count >= self.max_global_iterations
    }

    /// Text of the latest user message, if any.
    pub fn last_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::message_models::Role::User)
            .map(Message::text)
    }

    /// Merge a partial update produced by a stage.
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);

        macro_rules! set {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = update.$field {
                    self.$field = value;
                })*
            };
        }

        set!(
            task,
            original_task,
            plan,
            plan_step,
            awaiting_approval,
            candidate_artifact,
            assembled_artifact,
            subtask_artifacts,
            compile_attempts,
            compile_error_log,
            tests,
            test_attempts,
            iteration_count,
            max_iterations,
            global_iteration_count,
            needs_testing,
            validation_summary,
            test_summary,
            safety_notes,
        );

        if let Some(result) = update.compile_result {
            self.compile_result = Some(result);
        }
        if let Some(result) = update.test_result {
            self.test_result = Some(result);
        }
        if let Some(snapshot) = update.original_artifact_snapshot {
            self.original_artifact_snapshot = Some(snapshot);
        }
        if let Some(route) = update.route {
            self.route = Some(route);
        }
    }
}

/// A sparse set of field writes returned by a stage.
///
/// `None` leaves the field untouched. `messages` are appended, never replaced.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    pub task: Option<String>,
    pub original_task: Option<String>,
    pub plan: Option<Vec<String>>,
    pub plan_step: Option<usize>,
    pub awaiting_approval: Option<bool>,
    pub candidate_artifact: Option<String>,
    pub assembled_artifact: Option<String>,
    pub subtask_artifacts: Option<Vec<String>>,
    pub compile_attempts: Option<u32>,
    pub compile_result: Option<CompileResult>,
    pub compile_error_log: Option<Vec<String>>,
    pub tests: Option<String>,
    pub test_attempts: Option<u32>,
    pub test_result: Option<TestResult>,
    pub original_artifact_snapshot: Option<String>,
    pub iteration_count: Option<u32>,
    pub max_iterations: Option<u32>,
    pub global_iteration_count: Option<u32>,
    pub route: Option<Route>,
    pub needs_testing: Option<bool>,
    pub validation_summary: Option<String>,
    pub test_summary: Option<String>,
    pub safety_notes: Option<String>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the update.
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_sets_only_present_fields() {
        let mut state = PipelineState::default();
        state.task = "keep".to_string();
        state.candidate_artifact = "old".to_string();

        state.apply(StateUpdate {
            candidate_artifact: Some("new".to_string()),
            ..StateUpdate::default()
        });

        assert_eq!(state.task, "keep");
        assert_eq!(state.candidate_artifact, "new");
    }

    #[test]
    fn test_apply_appends_messages() {
        let mut state = PipelineState::default();
        state.messages.push(Message::user("one"));
        state.apply(StateUpdate::new().message(Message::assistant("two")));
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].text(), "two");
    }

    #[test]
    fn test_current_artifact_prefers_assembled() {
        let mut state = PipelineState::default();
        state.candidate_artifact = "candidate".to_string();
        assert_eq!(state.current_artifact(), "candidate");
        state.assembled_artifact = "assembled".to_string();
        assert_eq!(state.current_artifact(), "assembled");
    }

    #[test]
    fn test_global_budget() {
        let mut state = PipelineState::new(8, 2);
        assert!(!state.global_budget_exhausted());
        state.global_iteration_count = 2;
        assert!(state.global_budget_exhausted());
    }
}
