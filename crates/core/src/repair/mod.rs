//! Generate-Validate-Repair loop.
//!
//! - [`machine`]: loop states and legal transitions
//! - [`runner`]: the loop itself, parameterized by a [`runner::StageProfile`]

pub mod machine;
pub mod runner;

pub use machine::{IllegalTransition, LoopMachine, LoopState};
pub use runner::{
    run_loop, ArtifactMode, Check, ExhaustReason, LoopContext, LoopOutcome, LoopTerminal,
    StageProfile,
};
