//! # strand-server
//!
//! HTTP + SSE surface for the Strand agent runtime.
//!
//! Three route families share one [`AppState`]:
//!
//! - `/rpc` is a JSON-RPC 2.0 endpoint for session CRUD and blocking
//!   message sends,
//! - `/stream` opens a Server-Sent Events subscription to a session's
//!   live event feed (optionally submitting an initial message),
//! - `/stream/{session}/...` are side-channel controls for enqueueing
//!   messages and pausing or resuming the session while a stream is
//!   attached elsewhere.

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod rpc;
pub mod server;
pub mod stream;

pub use config::ServerConfig;
pub use server::{AppState, StrandServer};
