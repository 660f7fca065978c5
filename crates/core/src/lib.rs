//! # vk-core
//!
//! Pipeline orchestration engine for verikit.
//!
//! This crate turns a natural-language coding request into a verified
//! program by chaining a generative model and external verification tools
//! through bounded Generate-Validate-Repair loops.
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from `.verikit/config.toml`
//! - [`model`]: Model adapters and the resilient invocation wrapper
//! - [`tools`]: Verifier contract, adapters and the model-facing tool surface
//! - [`extract`]: Artifact extraction from model output
//! - [`repair`]: The Generate-Validate-Repair loop
//! - [`stages`]: Generator, integrator, tester and evaluator stages
//! - [`planner`]: Plan, approval and per-subtask execution
//! - [`router`]: Route classification and fallback policy
//! - [`report`]: The labelled final report format
//! - [`state`]: Turn seeding and checkpoint stores
//! - [`engine`]: The orchestrator running one turn at a time

pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod model;
pub mod planner;
pub mod prompts;
pub mod repair;
pub mod report;
pub mod router;
pub mod stages;
pub mod state;
pub mod tools;

pub use engine::{BuildError, Orchestrator, OrchestratorBuilder};
pub use error::{TurnError, TurnResult};
