//! # strand-core
//!
//! Shared types for the Strand agent server: branded IDs, conversation
//! messages, tool schemas, and the session event taxonomy streamed to
//! clients.

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod messages;
pub mod tools;
