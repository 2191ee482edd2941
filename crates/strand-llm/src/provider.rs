//! # Provider Trait
//!
//! Core abstraction for LLM backends. A provider accepts the session's
//! conversation so far plus the available tool definitions and returns
//! one complete model turn. The run coordinator keeps calling `send`
//! until the model stops requesting tools.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use strand_core::messages::{Message, TokenUsage, ToolCall};
use strand_core::tools::ToolDefinition;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur during provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Authentication failed (expired token, invalid key, etc.).
    #[error("Auth error: {message}")]
    Auth {
        /// Error description.
        message: String,
    },

    /// Rate limited by the provider.
    #[error("Rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested retry delay in milliseconds.
        retry_after_ms: u64,
        /// Error description.
        message: String,
    },

    /// Provider returned an API error.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
        /// Whether this error can be retried.
        retryable: bool,
    },

    /// Request was cancelled.
    #[error("Request cancelled")]
    Cancelled,

    /// Request exceeded the model-call deadline.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured deadline in milliseconds.
        timeout_ms: u64,
    },

    /// Provider-specific error.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

impl ProviderError {
    /// Whether this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s == reqwest::StatusCode::TOO_MANY_REQUESTS || s.is_server_error()
                    })
            }
            Self::RateLimited { .. } | Self::Timeout { .. } => true,
            Self::Api { retryable, .. } => *retryable,
            Self::Auth { .. } | Self::Cancelled | Self::Json(_) | Self::Other { .. } => false,
        }
    }

    /// Extract retry-after delay in milliseconds, if available.
    #[must_use]
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms, .. } => Some(*retry_after_ms),
            _ => None,
        }
    }

    /// Error category string for logging and event emission.
    #[must_use]
    pub fn category(&self) -> &str {
        match self {
            Self::Http(_) => "network",
            Self::Json(_) => "parse",
            Self::Auth { .. } => "auth",
            Self::RateLimited { .. } => "rate_limit",
            Self::Api { .. } => "api",
            Self::Cancelled => "cancelled",
            Self::Timeout { .. } => "timeout",
            Self::Other { .. } => "unknown",
        }
    }
}

/// Why the model stopped generating.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of the assistant turn.
    EndTurn,
    /// The model wants tool results before continuing.
    ToolUse,
    /// Output hit the token limit.
    MaxTokens,
    /// A configured stop sequence was produced.
    StopSequence,
    /// Provider-specific stop reason.
    Other(String),
}

impl StopReason {
    /// Parse a provider's stop-reason string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "end_turn" => Self::EndTurn,
            "tool_use" => Self::ToolUse,
            "max_tokens" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// One complete model turn.
#[derive(Clone, Debug)]
pub struct ProviderResponse {
    /// Assistant text (may be empty when only tools were requested).
    pub content: String,
    /// Tool calls the model wants executed before it continues.
    pub tool_calls: Vec<ToolCall>,
    /// Token usage for this call.
    pub usage: TokenUsage,
    /// Why generation stopped.
    pub stop_reason: StopReason,
}

impl ProviderResponse {
    /// Whether the run loop should execute tools and call again.
    #[must_use]
    pub fn wants_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Options for a single send.
///
/// All fields are optional, providers use sensible defaults when not
/// specified.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 - 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Stop sequences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Core LLM provider trait.
///
/// Implementors must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier (e.g., `"anthropic"`).
    fn name(&self) -> &str;

    /// Current model ID.
    fn model(&self) -> &str;

    /// Send the conversation and receive one complete turn.
    async fn send(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &SendOptions,
    ) -> ProviderResult<ProviderResponse>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
