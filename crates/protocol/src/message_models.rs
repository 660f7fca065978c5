//! Conversation message models.
//!
//! This module defines the role-tagged messages threaded through every stage,
//! the response content union returned by models, and tool-call records.

use serde::{Deserialize, Serialize};

/// The author of a message in a conversation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One element of a structured content payload.
///
/// Some models return content as a list of typed parts instead of a plain
/// string. Only the text parts carry meaning for the pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// A text fragment.
    Text { text: String },

    /// Any non-text part (images, reasoning blobs, provider metadata).
    #[serde(other)]
    Other,
}

/// Message or response content.
///
/// Serialized untagged so both `"content": "..."` and
/// `"content": [{"type": "text", "text": "..."}]` shapes deserialize.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Map any content variant to plain text.
    ///
    /// Text parts are concatenated in order; non-text parts are dropped.
    pub fn normalize(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Other => None,
                })
                .collect::<String>(),
        }
    }

    /// True when the normalized text is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.normalize().trim().is_empty()
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        MessageContent::Text(value)
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        MessageContent::Text(value.to_string())
    }
}

/// A request from the model to invoke a named tool.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Tool name, e.g. `compile` or `run_tests`.
    pub name: String,

    /// JSON object with the tool arguments.
    #[serde(default)]
    pub args: serde_json::Value,

    /// Unique id correlating the call with its tool-result message.
    pub id: String,
}

impl ToolCall {
    /// Read a string argument, if present.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(|v| v.as_str())
    }
}

/// A single role-tagged message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,

    pub content: MessageContent,

    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// For tool-result messages, the id of the call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// For tool-result messages, the name of the tool that produced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Build a tool-result message answering `call`.
    pub fn tool_result(call: &ToolCall, content: impl Into<MessageContent>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    /// Plain text of this message.
    pub fn text(&self) -> String {
        self.content.normalize()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The model contract's return value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ModelResponse {
    pub content: MessageContent,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    pub fn text(content: impl Into<MessageContent>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    /// Convert into the assistant message appended to history.
    pub fn into_message(self) -> Message {
        Message {
            tool_calls: self.tool_calls,
            ..Message::assistant(self.content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_parts_drops_non_text() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: "func ".to_string(),
            },
            ContentPart::Other,
            ContentPart::Text {
                text: "int -> f() {}".to_string(),
            },
        ]);
        assert_eq!(content.normalize(), "func int -> f() {}");
    }

    #[test]
    fn test_parts_deserialize_unknown_part_type() {
        let json = r#"[{"type":"text","text":"hi"},{"type":"image_url","url":"x"}]"#;
        let content: MessageContent = serde_json::from_str(json).unwrap();
        assert_eq!(content.normalize(), "hi");
    }

    #[test]
    fn test_blank_content() {
        assert!(MessageContent::from("   \n").is_blank());
        assert!(MessageContent::Parts(vec![ContentPart::Other]).is_blank());
        assert!(!MessageContent::from("x").is_blank());
    }

    #[test]
    fn test_tool_result_links_call() {
        let call = ToolCall {
            name: "compile".to_string(),
            args: serde_json::json!({"code": "func"}),
            id: "call-1".to_string(),
        };
        let msg = Message::tool_result(&call, "{}");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(msg.name.as_deref(), Some("compile"));
        assert_eq!(call.arg_str("code"), Some("func"));
    }
}
