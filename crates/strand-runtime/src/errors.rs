//! Runtime error types.

use strand_llm::ProviderError;

/// Errors from the session inbox.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue is at capacity; the input was not accepted.
    #[error("Queue full (capacity {capacity})")]
    QueueFull {
        /// Configured capacity.
        capacity: usize,
    },

    /// The queue was closed (session deleted or server shutting down).
    #[error("Queue closed")]
    Closed,
}

/// Errors that can occur while executing a run.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Model provider error (auth, rate limit, transport).
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Tool execution error.
    #[error("Tool error: {tool_name}: {message}")]
    Tool {
        /// Tool name.
        tool_name: String,
        /// Error description.
        message: String,
    },

    /// Session inbox error.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Session not found.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The run was cancelled.
    #[error("Run cancelled")]
    Cancelled,

    /// The run exceeded the maximum turn count.
    #[error("Max turns ({0}) exceeded")]
    MaxTurns(u32),

    /// Internal / unexpected error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Whether the caller can reasonably retry.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::Queue(QueueError::QueueFull { .. }) | Self::Cancelled | Self::MaxTurns(_) => true,
            Self::Queue(QueueError::Closed)
            | Self::Tool { .. }
            | Self::SessionNotFound(_)
            | Self::Internal(_) => false,
        }
    }

    /// Error category string for event emission.
    #[must_use]
    pub fn category(&self) -> &str {
        match self {
            Self::Provider(_) => "provider",
            Self::Tool { .. } => "tool",
            Self::Queue(_) => "queue",
            Self::SessionNotFound(_) => "session_not_found",
            Self::Cancelled => "cancelled",
            Self::MaxTurns(_) => "max_turns",
            Self::Internal(_) => "internal",
        }
    }
}
