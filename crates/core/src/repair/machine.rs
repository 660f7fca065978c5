//! Generate-Validate-Repair state machine.
//!
//! Every stage loop moves through the same states:
//!
//! ```text
//! Generate → ToolCall | Validate | Exhausted
//! ToolCall → Generate | Validate | Exhausted
//! Validate → Verified | Repair | Exhausted
//! Repair   → Generate | Exhausted
//! ```
//!
//! `Verified` and `Exhausted` are terminal. Each transition is checked and
//! recorded so a finished loop can be inspected step by step.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Ask the model for a draft.
    Generate,
    /// Execute the tool calls carried by the last response.
    ToolCall,
    /// Run the stage's check on the candidate.
    Validate,
    /// Feed the failure back to the model.
    Repair,
    /// The candidate passed its check.
    Verified,
    /// A budget ran out; the last known state is kept.
    Exhausted,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Exhausted)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Generate => "Generate",
            Self::ToolCall => "ToolCall",
            Self::Validate => "Validate",
            Self::Repair => "Repair",
            Self::Verified => "Verified",
            Self::Exhausted => "Exhausted",
        };
        f.write_str(name)
    }
}

fn is_legal_transition(from: LoopState, to: LoopState) -> bool {
    use LoopState::*;

    if to == Exhausted && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Generate, ToolCall)
            | (Generate, Validate)
            | (ToolCall, Generate)
            | (ToolCall, Validate)
            | (Validate, Verified)
            | (Validate, Repair)
            | (Repair, Generate)
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: LoopState,
    pub to: LoopState,
    /// Generate entries so far.
    pub iteration: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Illegal loop transition: {from} -> {to}")]
pub struct IllegalTransition {
    pub from: LoopState,
    pub to: LoopState,
}

/// Tracks the current loop state and every transition taken.
#[derive(Debug, Clone)]
pub struct LoopMachine {
    current: LoopState,
    iteration: u32,
    transitions: Vec<TransitionRecord>,
}

impl Default for LoopMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopMachine {
    /// Start at `Generate`.
    pub fn new() -> Self {
        Self {
            current: LoopState::Generate,
            iteration: 0,
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> LoopState {
        self.current
    }

    pub fn set_iteration(&mut self, iteration: u32) {
        self.iteration = iteration;
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Move to `to` if the edge exists.
    pub fn advance(&mut self, to: LoopState) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }
        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            iteration: self.iteration,
        });
        self.current = to;
        Ok(())
    }

    /// The state sequence, starting with the initial state.
    pub fn path(&self) -> Vec<LoopState> {
        std::iter::once(LoopState::Generate)
            .chain(self.transitions.iter().map(|t| t.to))
            .collect()
    }
}
