//! Chat data model shared by all backends.
//!
//! These are the internal lingua franca — not document-store shapes, not
//! backend wire types. Each adapter converts to and from these.

use serde::{Deserialize, Serialize};

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User message.
    User,
    /// Assistant (model) message.
    Assistant,
    /// Tool result message.
    Tool,
}

/// A message in the chat sent to an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: Role,
    /// The message text.
    pub content: String,
    /// For `role = tool`: the id of the tool call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For `role = tool`: the name of the tool that produced this result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    /// Create a plain message with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Create a tool-result message answering `tool_call_id`.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Backend-assigned (or synthesized) tool call id.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Parsed tool arguments.
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// A tool made available to the model, described as JSON Schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub parameters: serde_json::Value,
}

/// Token usage reported by a backend for one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input (prompt) tokens consumed.
    pub input_tokens: u64,
    /// Output (completion) tokens generated.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Sum of input and output tokens.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A completion request handed to an adapter.
///
/// The model is not part of the request — each adapter instance is bound
/// to one `(backend, model)` pair by the manager.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Ordered chat messages, system first.
    pub messages: Vec<ChatMessage>,
    /// Tools offered to the model (empty = no tool use).
    pub tools: Vec<ToolSpec>,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum output tokens.
    pub max_tokens: u32,
}

impl ChatRequest {
    /// Create a request with default sampling (temperature 0.7, 4096 max tokens).
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }

    /// Attach tools to the request.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// Override the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the output token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_serde_roundtrip() {
        for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
            let json = serde_json::to_string(&role).unwrap();
            let back: Role = serde_json::from_str(&json).unwrap();
            assert_eq!(role, back);
        }
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
    }

    #[test]
    fn tool_result_message_carries_ids() {
        let msg = ChatMessage::tool_result("call_1", "filesystem", "ok");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.tool_name.as_deref(), Some("filesystem"));
    }

    #[test]
    fn plain_message_omits_tool_fields_in_json() {
        let msg = ChatMessage::new(Role::User, "hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("tool_call_id").is_none());
        assert!(json.get("tool_name").is_none());
    }

    #[test]
    fn tool_call_roundtrip() {
        let call = ToolCall {
            id: "tc_1".into(),
            name: "shell".into(),
            arguments: json!({"command": "ls"}).as_object().unwrap().clone(),
        };
        let json = serde_json::to_value(&call).unwrap();
        let back: ToolCall = serde_json::from_value(json).unwrap();
        assert_eq!(call, back);
    }

    #[test]
    fn token_usage_total() {
        let usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 32,
        };
        assert_eq!(usage.total(), 42);
    }

    #[test]
    fn request_builder_applies_overrides() {
        let req = ChatRequest::new(vec![ChatMessage::new(Role::User, "hi")])
            .with_temperature(0.2)
            .with_max_tokens(128);
        assert_eq!(req.temperature, 0.2);
        assert_eq!(req.max_tokens, 128);
        assert!(req.tools.is_empty());
    }
}
