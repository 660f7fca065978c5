//! Generative model access.
//!
//! [`ChatModel`] is the adapter seam; [`ResilientModel`] is the only way the
//! pipeline calls a model.

pub mod adapters;
pub mod base;
pub mod resilient;

pub use adapters::{OllamaModel, ScriptedModel, ScriptedReply};
pub use base::{ChatModel, ModelCapabilities, ModelError, ModelStream, ToolSpec};
pub use resilient::{
    classify, sanitize_messages, Classification, FailureClass, ResilientModel, RetryPolicy,
    StreamEvent,
};
