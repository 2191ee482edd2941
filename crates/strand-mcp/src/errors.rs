//! MCP error types.

use thiserror::Error;

/// Errors from MCP provider connections and calls.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to spawn the provider process.
    #[error("failed to spawn provider process: {message}")]
    Spawn {
        /// Description of the spawn failure.
        message: String,
    },

    /// Transport-level failure (broken pipe, closed connection).
    #[error("transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The provider returned a JSON-RPC error.
    #[error("provider error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the provider.
        message: String,
    },

    /// A request exceeded its deadline.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// The deadline in milliseconds.
        timeout_ms: u64,
    },

    /// The named provider is not connected.
    #[error("provider not connected: {provider}")]
    NotConnected {
        /// Provider name.
        provider: String,
    },

    /// No provider is registered under this name.
    #[error("unknown provider: {provider}")]
    UnknownProvider {
        /// Provider name.
        provider: String,
    },

    /// The tool name does not resolve to any provider tool.
    #[error("unknown provider tool: {name}")]
    UnknownTool {
        /// The namespaced tool name.
        name: String,
    },

    /// HTTP request failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
