//! Session event taxonomy.
//!
//! Everything a run produces for observers flows through [`SessionEvent`].
//! Events are fanned out to SSE subscribers by the stream hub; the
//! variant name doubles as the SSE `event:` field via
//! [`SessionEvent::event_name`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{MessageId, SessionId, ToolCallId};

/// Lifecycle state of a tool call as observed by subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Requested by the model, not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Error,
}

/// An event emitted during a session's lifetime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// First event on every new subscription.
    Connected {
        /// Session being observed.
        session_id: SessionId,
    },
    /// Tool call progress. Emitted once per status transition.
    Tool {
        /// Tool call ID.
        id: ToolCallId,
        /// Tool name.
        name: String,
        /// Current status.
        status: ToolStatus,
        /// Arguments, present from `pending` onward.
        #[serde(skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
        /// Output text, present on `completed` and `error`.
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    /// A run finished with a final assistant message.
    Complete {
        /// ID of the final message.
        message_id: MessageId,
        /// Final message text.
        content: String,
    },
    /// A run was interrupted before completing. Emitted at most once
    /// per run.
    Cancelled,
    /// A run failed terminally.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

impl SessionEvent {
    /// SSE `event:` field for this variant.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Tool { .. } => "tool",
            Self::Complete { .. } => "complete",
            Self::Cancelled => "cancelled",
            Self::Error { .. } => "error",
        }
    }

    /// Shorthand for a `Tool` event in the `pending` state.
    #[must_use]
    pub fn tool_pending(id: ToolCallId, name: impl Into<String>, input: Value) -> Self {
        Self::Tool {
            id,
            name: name.into(),
            status: ToolStatus::Pending,
            input: Some(input),
            output: None,
        }
    }

    /// Shorthand for a `Tool` event in the `running` state.
    #[must_use]
    pub fn tool_running(id: ToolCallId, name: impl Into<String>) -> Self {
        Self::Tool {
            id,
            name: name.into(),
            status: ToolStatus::Running,
            input: None,
            output: None,
        }
    }

    /// Shorthand for a terminal `Tool` event.
    #[must_use]
    pub fn tool_finished(
        id: ToolCallId,
        name: impl Into<String>,
        output: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::Tool {
            id,
            name: name.into(),
            status: if is_error {
                ToolStatus::Error
            } else {
                ToolStatus::Completed
            },
            input: None,
            output: Some(output.into()),
        }
    }
}
