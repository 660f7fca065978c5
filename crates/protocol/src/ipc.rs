//! Trace events emitted by the orchestrator.
//!
//! The core sends `Event` values over a channel while a turn runs, so a front
//! end can render progress without inspecting pipeline internals.
//!
//! Uses tagged enum serialization:
//! ```json
//! {
//!   "type": "stageEntered",
//!   "payload": { "stage": "generate", "global_iteration": 3 }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::state_models::{Route, Stage};
use crate::tool_models::ToolKind;

/// Events sent from the core to a front end during a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// A turn started for a session.
    TurnStarted { session_id: String },

    /// The router picked a route.
    Routed {
        route: Route,
        needs_testing: bool,
        /// True when the fallback heuristic decided instead of the model.
        fallback: bool,
    },

    /// A stage was entered.
    StageEntered { stage: Stage, global_iteration: u32 },

    /// A stage finished and its update was merged.
    StageCompleted { stage: Stage },

    /// One pass through a repair loop's Generate state.
    Iteration {
        stage: Stage,
        iteration: u32,
        max_iterations: u32,
    },

    /// A verification tool was invoked.
    ToolInvoked { tool: ToolKind, ok: bool },

    /// A compile attempt finished.
    CompileAttempt {
        stage: Stage,
        attempt: u32,
        compiled: bool,
    },

    /// A test attempt finished.
    TestAttempt { attempt: u32, passed: bool },

    /// The planner proposed a plan and is waiting for approval.
    AwaitingApproval { plan: Vec<String> },

    /// The global iteration ceiling cut the turn short.
    CeilingReached {
        stage: Stage,
        global_iteration: u32,
        max_global_iterations: u32,
    },

    /// Incremental text from a streaming stage.
    OutputChunk { stage: Stage, text: String },

    /// A streaming call was restarted after a transient failure; output
    /// received so far for `stage` must be discarded.
    StreamRestarted { stage: Stage, attempt: u32 },

    /// Free-form log line.
    Log { message: String },

    /// The turn ended.
    TurnCompleted { suspended: bool, compiled: bool },

    /// The turn ended with a fatal error; the previous checkpoint is kept.
    TurnFailed { error: String },
}
