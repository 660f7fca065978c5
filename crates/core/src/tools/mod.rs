//! Verification tools: syntax validation, compilation and test execution.
//!
//! The [`Verifier`] trait is the external contract; [`VerificationPort`]
//! bounds every call with a timeout, and [`ToolExecutor`] exposes the tools to
//! the model as callable functions.

pub mod adapters;
pub mod base;
pub mod executor;
pub mod port;

pub use adapters::{CommandVerifier, HttpVerifier};
pub use base::{Verifier, VerifierError};
pub use executor::{tool_specs, ToolExecutor, ToolOutcome};
pub use port::{ExecutePort, VerificationPort};
