//! Base ChatModel trait and supporting types.

use async_trait::async_trait;
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;
use vk_protocol::message_models::{Message, ModelResponse};

/// What the target model supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    /// Accepts messages with a distinct system role.
    pub system_role: bool,
    /// Accepts native tool/function bindings and returns tool-call records.
    pub tool_calls: bool,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            system_role: true,
            tool_calls: true,
        }
    }
}

/// A tool the model may call, described by a JSON-schema parameter object.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The provider signalled resource exhaustion or rate limiting.
    #[error("Rate limited: {message}")]
    RateLimited { message: String },
    #[error("API call failed: {0}")]
    ApiError(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Response parsing error: {0}")]
    ParseError(String),
    /// An error raised by a wrapping layer, keeping the original as its cause.
    #[error("{context}: {source}")]
    Wrapped {
        context: String,
        #[source]
        source: Box<ModelError>,
    },
}

impl ModelError {
    /// Wrap this error with additional context.
    pub fn wrap(self, context: impl Into<String>) -> Self {
        ModelError::Wrapped {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The directly chained cause, if any.
    pub fn cause(&self) -> Option<&ModelError> {
        match self {
            ModelError::Wrapped { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    /// This error followed by every chained cause.
    pub fn chain(&self) -> impl Iterator<Item = &ModelError> {
        std::iter::successors(Some(self), |e| e.cause())
    }
}

/// Incremental text output of a streaming call.
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<String, ModelError>> + Send>>;

/// The model contract: `invoke(messages, tools?) -> {content, toolCalls?}`.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    fn capabilities(&self) -> ModelCapabilities;

    /// Single request/response call. `tools` is empty when none are bound.
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ModelResponse, ModelError>;

    /// Streaming call yielding text chunks. Tool binding is not supported.
    async fn stream(&self, messages: &[Message]) -> Result<ModelStream, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_walks_wrapped_causes() {
        let err = ModelError::RateLimited {
            message: "quota".to_string(),
        }
        .wrap("generate call")
        .wrap("stage generate");

        let chain: Vec<_> = err.chain().collect();
        assert_eq!(chain.len(), 3);
        assert!(matches!(chain[2], ModelError::RateLimited { .. }));
        assert_eq!(
            err.to_string(),
            "stage generate: generate call: Rate limited: quota"
        );
    }

    #[test]
    fn test_cause_of_plain_error_is_none() {
        assert!(ModelError::ApiError("boom".to_string()).cause().is_none());
    }
}
