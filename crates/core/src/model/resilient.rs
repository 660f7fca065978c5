//! Resilient invocation wrapper.
//!
//! [`ResilientModel`] wraps any [`ChatModel`] with:
//! - failure classification (rate limiting is retryable, everything else is fatal)
//! - adaptive backoff honouring a server-suggested `retry in <float>s` delay
//! - payload sanitization so a call never carries zero effective content
//! - capability gating for models without a system role or native tool calls
//!
//! The call boundary returns `Result<T, Classification>`; classification is
//! computed once per failure and never hidden inside business logic.

use crate::config::models::RetryConfig;
use crate::extract::fenced_json_block;
use crate::model::base::{ChatModel, ModelError, ToolSpec};
use regex::Regex;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};
use vk_protocol::message_models::{Message, ModelResponse, Role, ToolCall};

/// Continuation text used when a payload would otherwise be empty.
pub const CONTINUATION_MESSAGE: &str = "Continue.";

/// How a single failure should be handled.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureClass {
    /// Rate limited; `suggested_delay` is the server hint, if any.
    Retryable { suggested_delay: Option<Duration> },
    Fatal,
}

/// Terminal error of a wrapped call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Classification {
    /// Still rate limited after the retry budget was spent.
    #[error("Transient failure persisted after {attempts} attempts: {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: ModelError,
    },
    /// Not a classified transient failure.
    #[error("Fatal model error: {0}")]
    Fatal(#[source] ModelError),
}

impl Classification {
    /// The original error.
    pub fn error(&self) -> &ModelError {
        match self {
            Classification::Transient { source, .. } => source,
            Classification::Fatal(source) => source,
        }
    }
}

fn retry_delay_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)retry in ([0-9]+(?:\.[0-9]+)?)\s*s").expect("valid retry delay regex")
    })
}

/// Classify a model error.
///
/// Retryable iff the error or one of its chained causes is a typed
/// rate-limit, or a rendered message contains `RESOURCE_EXHAUSTED` or `429`.
pub fn classify(error: &ModelError) -> FailureClass {
    let typed = error
        .chain()
        .any(|e| matches!(e, ModelError::RateLimited { .. }));
    let textual = error.chain().any(|e| {
        let msg = e.to_string();
        msg.contains("RESOURCE_EXHAUSTED") || msg.contains("429")
    });

    if typed || textual {
        FailureClass::Retryable {
            suggested_delay: suggested_delay(error),
        }
    } else {
        FailureClass::Fatal
    }
}

/// Parse a server-suggested delay from the error or any chained cause.
pub fn suggested_delay(error: &ModelError) -> Option<Duration> {
    error.chain().find_map(|e| {
        let msg = e.to_string();
        retry_delay_pattern()
            .captures(&msg)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    })
}

/// Backoff schedule for retryable failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub floor: Duration,
    pub multiplier: f64,
    pub cap: Duration,
    pub buffer: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            floor: Duration::from_secs_f64(config.floor_secs.max(0.0)),
            multiplier: config.multiplier,
            cap: Duration::from_secs_f64(config.cap_secs.max(config.floor_secs).max(0.0)),
            buffer: Duration::from_secs_f64(config.buffer_secs.max(0.0)),
        }
    }
}

impl RetryPolicy {
    /// Exponential delay after the given 1-based failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.multiplier * 2f64.powi(exponent);
        let secs = secs.clamp(self.floor.as_secs_f64(), self.cap.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Delay before the next attempt, preferring the server's suggestion.
    pub fn delay_for(&self, attempt: u32, suggested: Option<Duration>) -> Duration {
        match suggested {
            Some(delay) => delay + self.buffer,
            None => self.backoff(attempt),
        }
    }
}

/// Chunk of a resilient stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(String),
    /// The underlying stream failed and was restarted; discard earlier chunks.
    Restarted { attempt: u32 },
}

pub type ResilientStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, Classification>> + Send>>;

/// A [`ChatModel`] shielded from transient failures.
#[derive(Clone)]
pub struct ResilientModel {
    inner: Arc<dyn ChatModel>,
    policy: RetryPolicy,
}

impl ResilientModel {
    pub fn new(inner: Arc<dyn ChatModel>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn model_name(&self) -> &str {
        self.inner.name()
    }

    /// Invoke the model with retries, sanitization and capability gating.
    ///
    /// When the model cannot bind tools natively, a textual directive asks
    /// for a fenced JSON tool call, which is parsed into a [`ToolCall`] with a
    /// fresh id. Unparsable JSON is treated as a plain text response.
    pub async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ModelResponse, Classification> {
        let caps = self.inner.capabilities();
        let emulate_tools = !tools.is_empty() && !caps.tool_calls;

        let mut payload = messages.to_vec();
        if emulate_tools {
            payload.push(Message::user(textual_tool_directive(tools)));
        }
        let payload = sanitize_messages(&payload, caps.system_role);
        let bound: &[ToolSpec] = if caps.tool_calls { tools } else { &[] };

        let inner = Arc::clone(&self.inner);
        let mut response = self
            .with_retry(|| {
                let inner = Arc::clone(&inner);
                let payload = payload.clone();
                let bound = bound.to_vec();
                async move { inner.invoke(&payload, &bound).await }
            })
            .await?;

        if emulate_tools && response.tool_calls.is_empty() {
            if let Some(call) = parse_textual_tool_call(&response.content.normalize(), tools) {
                debug!(tool = %call.name, id = %call.id, "Synthesized tool call from text");
                response.tool_calls.push(call);
            }
        }

        Ok(response)
    }

    /// Run `op` until it succeeds, fails fatally, or the attempt budget is spent.
    pub async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, Classification>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ModelError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match classify(&error) {
                FailureClass::Fatal => return Err(Classification::Fatal(error)),
                FailureClass::Retryable { suggested_delay } => {
                    if attempt >= self.policy.max_attempts {
                        warn!(attempts = attempt, error = %error, "Retry budget exhausted");
                        return Err(Classification::Transient {
                            attempts: attempt,
                            source: error,
                        });
                    }
                    let delay = self.policy.delay_for(attempt, suggested_delay);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retryable model error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Stream the model's output with the same retry policy.
    ///
    /// A failure while opening or reading the stream is classified at the
    /// point of failure; when retryable, the stream is reopened from scratch
    /// and a [`StreamEvent::Restarted`] tells the consumer to drop what it
    /// has received so far.
    pub fn stream(&self, messages: &[Message]) -> ResilientStream {
        let caps = self.inner.capabilities();
        let payload = sanitize_messages(messages, caps.system_role);
        let inner = Arc::clone(&self.inner);
        let policy = self.policy.clone();

        let stream = async_stream::stream! {
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                let failure = match inner.stream(&payload).await {
                    Err(error) => error,
                    Ok(mut chunks) => {
                        let mut failed = None;
                        while let Some(item) = chunks.next().await {
                            match item {
                                Ok(text) => {
                                    yield Ok(StreamEvent::Chunk(text));
                                }
                                Err(error) => {
                                    failed = Some(error);
                                    break;
                                }
                            }
                        }
                        match failed {
                            None => return,
                            Some(error) => error,
                        }
                    }
                };

                match classify(&failure) {
                    FailureClass::Fatal => {
                        yield Err(Classification::Fatal(failure));
                        return;
                    }
                    FailureClass::Retryable { suggested_delay } => {
                        if attempt >= policy.max_attempts {
                            yield Err(Classification::Transient { attempts: attempt, source: failure });
                            return;
                        }
                        let delay = policy.delay_for(attempt, suggested_delay);
                        debug!(attempt, delay_ms = delay.as_millis() as u64, "Restarting stream after retryable error");
                        tokio::time::sleep(delay).await;
                        yield Ok(StreamEvent::Restarted { attempt });
                    }
                }
            }
        };

        Box::pin(stream)
    }

    /// Collect a resilient stream into the final text, honouring restarts.
    ///
    /// `on_event` observes every event as it arrives.
    pub async fn stream_text<F>(
        &self,
        messages: &[Message],
        mut on_event: F,
    ) -> Result<String, Classification>
    where
        F: FnMut(&StreamEvent),
    {
        let mut stream = self.stream(messages);
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            let event = event?;
            on_event(&event);
            match event {
                StreamEvent::Chunk(chunk) => text.push_str(&chunk),
                StreamEvent::Restarted { .. } => text.clear(),
            }
        }
        Ok(text)
    }
}

/// Make a conversation safe to send.
///
/// - Messages with blank content are dropped, unless they carry tool calls.
/// - Without a system role, all system content is merged into the first user
///   message (or a new leading user message when the conversation does not
///   start with one).
/// - A conversation with no non-system message gets a continuation message.
pub fn sanitize_messages(messages: &[Message], system_role: bool) -> Vec<Message> {
    let kept: Vec<Message> = messages
        .iter()
        .filter(|m| !m.content.is_blank() || m.has_tool_calls())
        .cloned()
        .collect();

    let mut out = if system_role {
        kept
    } else {
        merge_system_messages(kept)
    };

    if !out.iter().any(|m| m.role != Role::System) {
        out.push(Message::user(CONTINUATION_MESSAGE));
    }
    out
}

fn merge_system_messages(messages: Vec<Message>) -> Vec<Message> {
    let (system, mut chat): (Vec<Message>, Vec<Message>) =
        messages.into_iter().partition(|m| m.role == Role::System);

    if system.is_empty() {
        return chat;
    }

    let merged = system
        .iter()
        .map(Message::text)
        .collect::<Vec<_>>()
        .join("\n\n");

    match chat.first_mut() {
        Some(first) if first.role == Role::User => {
            first.content = format!("Instructions:\n{merged}\n\nQuery:\n{}", first.text()).into();
        }
        _ => chat.insert(0, Message::user(merged)),
    }
    chat
}

/// Directive asking a model without native tool support for a JSON tool call.
pub fn textual_tool_directive(tools: &[ToolSpec]) -> String {
    let mut text = String::from(
        "You cannot use native tool calls.\n\
         To call a tool, output a JSON object in a ```json fenced block:\n\
         ```json\n{\n  \"action\": \"<tool name>\",\n  \"args\": { ... }\n}\n```\n\
         Available tools:\n",
    );
    for tool in tools {
        text.push_str(&format!(
            "- {}: {} Arguments schema: {}\n",
            tool.name, tool.description, tool.parameters
        ));
    }
    text
}

/// Parse a fenced JSON tool call emitted as text.
///
/// Returns `None` for missing or malformed JSON and for unknown tool names.
pub fn parse_textual_tool_call(text: &str, tools: &[ToolSpec]) -> Option<ToolCall> {
    let block = fenced_json_block(text)?;
    let value: serde_json::Value = serde_json::from_str(block).ok()?;
    let action = value.get("action")?.as_str()?;
    if !tools.iter().any(|t| t.name == action) {
        return None;
    }
    let args = value.get("args").filter(|a| a.is_object())?.clone();
    Some(ToolCall {
        name: action.to_string(),
        args,
        id: uuid::Uuid::new_v4().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_spec() -> ToolSpec {
        ToolSpec {
            name: "compile".to_string(),
            description: "Compile source.".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn test_classify_typed_rate_limit() {
        let err = ModelError::RateLimited {
            message: "quota".to_string(),
        };
        assert_eq!(
            classify(&err),
            FailureClass::Retryable {
                suggested_delay: None
            }
        );
    }

    #[test]
    fn test_classify_chained_cause() {
        let err = ModelError::RateLimited {
            message: "Please retry in 5.2s".to_string(),
        }
        .wrap("provider call failed");
        assert_eq!(
            classify(&err),
            FailureClass::Retryable {
                suggested_delay: Some(Duration::from_secs_f64(5.2))
            }
        );
    }

    #[test]
    fn test_classify_textual_fallback() {
        let err = ModelError::ApiError("HTTP 429 Too Many Requests".to_string());
        assert!(matches!(classify(&err), FailureClass::Retryable { .. }));

        let err = ModelError::ApiError("status RESOURCE_EXHAUSTED".to_string());
        assert!(matches!(classify(&err), FailureClass::Retryable { .. }));
    }

    #[test]
    fn test_classify_other_errors_fatal() {
        let err = ModelError::Transport("connection refused".to_string());
        assert_eq!(classify(&err), FailureClass::Fatal);
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        let secs: Vec<f64> = (1..=7).map(|a| policy.backoff(a).as_secs_f64()).collect();
        assert_eq!(secs, vec![2.0, 4.0, 8.0, 16.0, 32.0, 60.0, 60.0]);
        assert_eq!(policy.backoff(40), Duration::from_secs(60));
    }

    #[test]
    fn test_suggested_delay_adds_buffer() {
        let policy = RetryPolicy::default();
        let delay = policy.delay_for(1, Some(Duration::from_secs_f64(5.2)));
        assert!((delay.as_secs_f64() - 6.2).abs() < 1e-9);
    }

    #[test]
    fn test_sanitize_drops_blank_and_keeps_tool_calls() {
        let call = ToolCall {
            name: "compile".to_string(),
            args: serde_json::json!({}),
            id: "1".to_string(),
        };
        let mut with_call = Message::assistant("");
        with_call.tool_calls.push(call);

        let out = sanitize_messages(
            &[Message::user("hi"), Message::assistant("  "), with_call],
            true,
        );
        assert_eq!(out.len(), 2);
        assert!(out[1].has_tool_calls());
    }

    #[test]
    fn test_sanitize_merges_system_into_first_user() {
        let out = sanitize_messages(
            &[
                Message::system("be terse"),
                Message::user("write fact"),
                Message::system("use func"),
            ],
            false,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role, Role::User);
        assert_eq!(
            out[0].text(),
            "Instructions:\nbe terse\n\nuse func\n\nQuery:\nwrite fact"
        );
    }

    #[test]
    fn test_sanitize_inserts_user_when_first_is_not_user() {
        let out = sanitize_messages(
            &[Message::system("rules"), Message::assistant("previous answer")],
            false,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, Role::User);
        assert_eq!(out[0].text(), "rules");
    }

    #[test]
    fn test_sanitize_never_empty() {
        let out = sanitize_messages(&[Message::system("rules")], true);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].text(), CONTINUATION_MESSAGE);

        let out = sanitize_messages(&[Message::user("   ")], false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text(), CONTINUATION_MESSAGE);
    }

    #[test]
    fn test_parse_textual_tool_call() {
        let text = "I will compile.\n```json\n{\"action\": \"compile\", \"args\": {\"code\": \"func void -> main() {}\"}}\n```";
        let call = parse_textual_tool_call(text, &[compile_spec()]).expect("tool call");
        assert_eq!(call.name, "compile");
        assert_eq!(call.arg_str("code"), Some("func void -> main() {}"));
        assert!(uuid::Uuid::parse_str(&call.id).is_ok());
    }

    #[test]
    fn test_parse_textual_tool_call_malformed_is_none() {
        let spec = [compile_spec()];
        assert!(parse_textual_tool_call("```json\n{\"action\": \"compile\",\n```", &spec).is_none());
        assert!(parse_textual_tool_call("no json here", &spec).is_none());
        assert!(parse_textual_tool_call(
            "```json\n{\"action\": \"delete\", \"args\": {}}\n```",
            &spec
        )
        .is_none());
    }
}
