//! Turn-level error type.
//!
//! Only the Fatal class of failures reaches the turn boundary. Verification
//! failures and malformed model output are ordinary values handled inside the
//! repair loop.

use crate::model::resilient::Classification;
use crate::repair::machine::IllegalTransition;
use crate::state::checkpoint::CheckpointError;
use crate::tools::base::VerifierError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TurnError {
    #[error("Model call failed: {0}")]
    Model(#[from] Classification),

    #[error("Verification tool failed: {0}")]
    Verifier(#[from] VerifierError),

    #[error("Checkpoint store failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
}

pub type TurnResult<T> = Result<T, TurnError>;
