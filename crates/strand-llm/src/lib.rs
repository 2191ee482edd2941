//! # strand-llm
//!
//! LLM provider abstraction for the Strand agent server.
//!
//! [`Provider`] is the seam between the run coordinator and a model
//! backend: one blocking `send` per agent turn, returning text, tool
//! calls, and token usage. [`anthropic::AnthropicProvider`] is the
//! concrete client for the Anthropic Messages API, and [`retry`]
//! wraps any send in exponential backoff with cancellation support.

#![deny(unsafe_code)]

pub mod anthropic;
pub mod provider;
pub mod retry;

pub use provider::{
    Provider, ProviderError, ProviderResponse, ProviderResult, SendOptions, StopReason,
};
pub use retry::{send_with_retry, RetryConfig};
