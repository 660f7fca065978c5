//! # vk-protocol
//!
//! Shared data models for verikit.
//!
//! This crate defines the structures exchanged between the pipeline core,
//! external collaborators and front ends:
//! - Conversation messages and model responses
//! - Verification tool results
//! - The per-turn pipeline state and its partial updates
//! - Session boundary input/output and trace events
//!
//! ## Modules
//!
//! - [`message_models`]: Role-tagged messages, content union, tool calls
//! - [`tool_models`]: Syntax, compile and test result records
//! - [`state_models`]: `PipelineState`, `StateUpdate`, routes and stages
//! - [`turn_models`]: Turn input and output
//! - [`ipc`]: Trace events sent from the core to a front end
//!
//! ## Design Principles
//!
//! - Minimal dependencies: only serde and serde_json
//! - Independent compilation: no dependencies on other verikit crates

pub mod ipc;
pub mod message_models;
pub mod state_models;
pub mod tool_models;
pub mod turn_models;

pub use ipc::*;
pub use message_models::*;
pub use state_models::*;
pub use tool_models::*;
pub use turn_models::*;
