//! # strand-tools
//!
//! Built-in tools and the tool registry for the Strand agent server.
//!
//! Every tool implements the [`Tool`] trait: a schema sent to the model
//! plus an async `execute` that honors the per-call cancellation token.
//! The runtime dispatches model tool calls through the [`ToolRegistry`].

#![deny(unsafe_code)]

pub mod builtins;
pub mod errors;
pub mod registry;
pub mod traits;

pub use errors::ToolError;
pub use registry::ToolRegistry;
pub use traits::{Tool, ToolContext};
