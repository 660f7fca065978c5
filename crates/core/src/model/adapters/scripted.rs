//! Scripted model for tests and dry runs.
//!
//! Replays a queue of canned replies in order and records every call it
//! receives.

use crate::model::base::{ChatModel, ModelCapabilities, ModelError, ModelStream, ToolSpec};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use vk_protocol::message_models::{Message, ModelResponse};

/// One canned reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Answer with this response. Streaming yields its text as one chunk.
    Respond(ModelResponse),
    /// Fail the call (or the stream open) with this error.
    Fail(ModelError),
    /// Stream `chunks`, then fail with `error`.
    FailMidStream { chunks: Vec<String>, error: ModelError },
}

impl ScriptedReply {
    /// Plain text reply.
    pub fn text(content: impl Into<String>) -> Self {
        ScriptedReply::Respond(ModelResponse::text(content.into()))
    }
}

/// A call received by the scripted model.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
    pub streamed: bool,
}

#[derive(Clone)]
pub struct ScriptedModel {
    name: String,
    capabilities: ModelCapabilities,
    replies: Arc<Mutex<VecDeque<ScriptedReply>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            name: "scripted".to_string(),
            capabilities: ModelCapabilities::default(),
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Queue more replies after the existing ones.
    pub async fn push(&self, reply: ScriptedReply) {
        self.replies.lock().await.push_back(reply);
    }

    /// Every call received so far, oldest first.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.replies.lock().await.len()
    }

    async fn next_reply(&self, call: RecordedCall) -> Result<ScriptedReply, ModelError> {
        self.calls.lock().await.push(call);
        self.replies
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| ModelError::ApiError("scripted model has no replies left".to_string()))
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ModelCapabilities {
        self.capabilities
    }

    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ModelResponse, ModelError> {
        let call = RecordedCall {
            messages: messages.to_vec(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
            streamed: false,
        };
        match self.next_reply(call).await? {
            ScriptedReply::Respond(response) => Ok(response),
            ScriptedReply::Fail(error) => Err(error),
            ScriptedReply::FailMidStream { error, .. } => Err(error),
        }
    }

    async fn stream(&self, messages: &[Message]) -> Result<ModelStream, ModelError> {
        let call = RecordedCall {
            messages: messages.to_vec(),
            tools: Vec::new(),
            streamed: true,
        };
        let items: Vec<Result<String, ModelError>> = match self.next_reply(call).await? {
            ScriptedReply::Respond(response) => vec![Ok(response.content.normalize())],
            ScriptedReply::Fail(error) => return Err(error),
            ScriptedReply::FailMidStream { chunks, error } => chunks
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(error)))
                .collect(),
        };
        Ok(Box::pin(tokio_stream::iter(items)))
    }
}
