//! Model adapter implementations.

mod ollama;
pub mod scripted;

pub use ollama::OllamaModel;
pub use scripted::{ScriptedModel, ScriptedReply};
