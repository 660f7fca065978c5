//! Common test utilities for the integration suites.
//!
//! This module provides shared functionality across the suites including:
//! - Test fixtures (configs, sample programs, orchestrator wiring)
//! - Custom assertions over trace events
//! - Scripted verifiers

pub mod assertions;
pub mod fixtures;
pub mod mock_verifiers;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use mock_verifiers::*;
