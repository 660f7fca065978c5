//! Ollama-compatible chat adapter (`POST {endpoint}/api/chat`).

use crate::config::models::ModelConfig;
use crate::model::base::{ChatModel, ModelCapabilities, ModelError, ModelStream, ToolSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_stream::StreamExt;
use tracing::debug;
use vk_protocol::message_models::{Message, ModelResponse, Role, ToolCall};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct WireMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    error: Option<String>,
}

/// Chat model served by an Ollama-compatible endpoint.
pub struct OllamaModel {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    capabilities: ModelCapabilities,
}

impl OllamaModel {
    /// Create an adapter from the `[model]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ModelError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            name: config.name.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            capabilities: ModelCapabilities {
                system_role: config.supports_system_role,
                tool_calls: config.supports_tool_calls,
            },
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.endpoint)
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<reqwest::Response, ModelError> {
        let response = self
            .client
            .post(self.chat_url())
            .json(request)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Err(ModelError::RateLimited {
                message: format!("HTTP 429: {body}"),
            })
        } else {
            Err(ModelError::ApiError(format!("HTTP {status}: {body}")))
        }
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn to_wire(message: &Message) -> WireMessage {
    WireMessage {
        role: wire_role(message.role).to_string(),
        content: message.text(),
        tool_calls: message
            .tool_calls
            .iter()
            .map(|call| WireToolCall {
                function: WireFunction {
                    name: call.name.clone(),
                    arguments: call.args.clone(),
                },
            })
            .collect(),
    }
}

fn tool_binding(tool: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn from_wire(message: WireMessage) -> ModelResponse {
    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|call| ToolCall {
            name: call.function.name,
            args: match call.function.arguments {
                // Some servers send arguments as a JSON-encoded string.
                Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
                other => other,
            },
            id: uuid::Uuid::new_v4().to_string(),
        })
        .collect();

    ModelResponse {
        content: message.content.into(),
        tool_calls,
    }
}

fn parse_chunk(line: &[u8]) -> Result<Option<String>, ModelError> {
    let chunk: ChatChunk = serde_json::from_slice(line)
        .map_err(|e| ModelError::ParseError(format!("Invalid stream line: {e}")))?;
    if let Some(error) = chunk.error {
        return Err(ModelError::ApiError(error));
    }
    Ok(chunk
        .message
        .map(|m| m.content)
        .filter(|content| !content.is_empty()))
}

#[async_trait]
impl ChatModel for OllamaModel {
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
        let request = ChatRequest {
            model: &self.name,
            messages: messages.iter().map(to_wire).collect(),
            stream: false,
            tools: tools.iter().map(tool_binding).collect(),
        };
        debug!(model = %self.name, messages = messages.len(), tools = tools.len(), "Invoking model");

        let response = self.send(&request).await?;
        let chunk: ChatChunk = response
            .json()
            .await
            .map_err(|e| ModelError::ParseError(e.to_string()))?;

        if let Some(error) = chunk.error {
            return Err(ModelError::ApiError(error));
        }
        let message = chunk
            .message
            .ok_or_else(|| ModelError::ParseError("Response has no message".to_string()))?;
        Ok(from_wire(message))
    }

    async fn stream(&self, messages: &[Message]) -> Result<ModelStream, ModelError> {
        let request = ChatRequest {
            model: &self.name,
            messages: messages.iter().map(to_wire).collect(),
            stream: true,
            tools: Vec::new(),
        };
        let response = self.send(&request).await?;
        let mut bytes = Box::pin(response.bytes_stream());

        let stream = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(item) = bytes.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(ModelError::Transport(e.to_string()));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    match parse_chunk(&line) {
                        Ok(Some(text)) => {
                            yield Ok(text);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            if !buffer.iter().all(u8::is_ascii_whitespace) {
                match parse_chunk(&buffer) {
                    Ok(Some(text)) => {
                        yield Ok(text);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_message_carries_tool_calls() {
        let mut message = Message::assistant("");
        message.tool_calls.push(ToolCall {
            name: "compile".to_string(),
            args: json!({"code": "func void -> main() {}"}),
            id: "abc".to_string(),
        });

        let wire = serde_json::to_value(to_wire(&message)).expect("serialize");
        assert_eq!(wire["role"], "assistant");
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "compile");
    }

    #[test]
    fn test_from_wire_decodes_string_arguments() {
        let wire: WireMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": "",
            "tool_calls": [{"function": {"name": "run_tests", "arguments": "{\"code\": \"x\"}"}}]
        }))
        .expect("wire message");

        let response = from_wire(wire);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].arg_str("code"), Some("x"));
        assert!(!response.tool_calls[0].id.is_empty());
    }

    #[test]
    fn test_parse_chunk() {
        assert_eq!(
            parse_chunk(br#"{"message": {"role": "assistant", "content": "func"}, "done": false}"#),
            Ok(Some("func".to_string()))
        );
        assert_eq!(parse_chunk(br#"{"done": true}"#), Ok(None));
        assert!(matches!(
            parse_chunk(br#"{"error": "model not found"}"#),
            Err(ModelError::ApiError(_))
        ));
        assert!(matches!(parse_chunk(b"not json"), Err(ModelError::ParseError(_))));
    }

    #[test]
    fn test_new_uses_config_capabilities() {
        let config = ModelConfig {
            supports_tool_calls: false,
            endpoint: "http://localhost:11434/".to_string(),
            ..ModelConfig::default()
        };
        let model = OllamaModel::new(&config).expect("client builds");
        assert!(!model.capabilities().tool_calls);
        assert_eq!(model.chat_url(), "http://localhost:11434/api/chat");
    }
}
