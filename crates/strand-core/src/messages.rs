//! Conversation message types.
//!
//! A session's history is a sequence of [`Message`]s. Assistant messages
//! may carry tool calls; tool messages carry the matching results. The
//! shapes here are provider-agnostic; `strand-llm` converts them to the
//! wire format of whichever backend is in use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{MessageId, SessionId, ToolCallId};

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// End-user input (including synthetic markers).
    User,
    /// Model output.
    Assistant,
    /// Tool results responding to an assistant's tool calls.
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Provider-assigned call ID, echoed back in the result.
    pub id: ToolCallId,
    /// Tool name as registered (for provider tools: `<provider>_<tool>`).
    pub name: String,
    /// Structured arguments.
    pub arguments: Value,
}

/// The result of executing one tool call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// The call this result answers.
    pub tool_call_id: ToolCallId,
    /// Output text (or error description).
    pub content: String,
    /// Whether execution failed.
    #[serde(default)]
    pub is_error: bool,
}

/// Token usage reported by the provider for one model call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Prompt tokens consumed.
    pub input_tokens: u64,
    /// Completion tokens produced.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Sum of input and output tokens.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Accumulate another usage report into this one.
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// One entry in a session's conversation history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message ID.
    pub id: MessageId,
    /// Owning session.
    pub session_id: SessionId,
    /// Author role.
    pub role: Role,
    /// Text content (empty for pure tool-call messages).
    pub content: String,
    /// Tool calls requested (assistant messages only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Tool results (tool messages only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a user message.
    #[must_use]
    pub fn user(session_id: SessionId, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            session_id,
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Build an assistant message with optional tool calls.
    #[must_use]
    pub fn assistant(
        session_id: SessionId,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            session_id,
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_results: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Build a tool-result message.
    #[must_use]
    pub fn tool_results(session_id: SessionId, results: Vec<ToolResult>) -> Self {
        Self {
            id: MessageId::new(),
            session_id,
            role: Role::Tool,
            content: String::new(),
            tool_calls: Vec::new(),
            tool_results: results,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_message_shape() {
        let sid = SessionId::from("s1");
        let msg = Message::user(sid.clone(), "hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.session_id, sid);
        assert_eq!(msg.content, "hello");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn assistant_message_with_tool_calls() {
        let call = ToolCall {
            id: ToolCallId::from("call_1"),
            name: "bash".into(),
            arguments: json!({"command": "ls"}),
        };
        let msg = Message::assistant(SessionId::from("s1"), "", vec![call]);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].name, "bash");
    }

    #[test]
    fn tool_results_message() {
        let result = ToolResult {
            tool_call_id: ToolCallId::from("call_1"),
            content: "ok".into(),
            is_error: false,
        };
        let msg = Message::tool_results(SessionId::from("s1"), vec![result]);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_results.len(), 1);
        assert!(msg.content.is_empty());
    }

    #[test]
    fn token_usage_accumulates() {
        let mut usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
        };
        usage.add(TokenUsage {
            input_tokens: 20,
            output_tokens: 10,
        });
        assert_eq!(usage.input_tokens, 120);
        assert_eq!(usage.output_tokens, 60);
        assert_eq!(usage.total(), 180);
    }

    #[test]
    fn message_serde_camel_case() {
        let msg = Message::user(SessionId::from("s1"), "hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("sessionId").is_some());
        assert!(json.get("createdAt").is_some());
        // Empty collections are skipped on the wire
        assert!(json.get("toolCalls").is_none());
    }

    #[test]
    fn tool_result_error_flag_defaults_false() {
        let parsed: ToolResult =
            serde_json::from_value(json!({"toolCallId": "c1", "content": "out"})).unwrap();
        assert!(!parsed.is_error);
    }
}
