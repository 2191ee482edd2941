//! Tool error types.
//!
//! Unified error enum for all tool execution failures. Failed tool calls
//! are reported back to the model as error tool results rather than
//! aborting the run, so `Display` output is user facing.

use std::io;

use thiserror::Error;

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Parameter validation failed.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// File or path not found.
    #[error("file not found: {path}")]
    FileNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Permission denied accessing a path.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path with insufficient permissions.
        path: String,
    },

    /// Path is a directory when a file was expected.
    #[error("is a directory: {path}")]
    IsDirectory {
        /// The directory path.
        path: String,
    },

    /// Generic I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Operation timed out.
    #[error("timeout after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// The run's permission policy rejected the call.
    #[error("permission denied by policy: {reason}")]
    PolicyDenied {
        /// Why the call was rejected.
        reason: String,
    },

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tool not found in registry.
    #[error("tool not found: {name}")]
    ToolNotFound {
        /// The tool name that was not found.
        name: String,
    },

    /// Internal error (catch-all).
    #[error("{message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}
