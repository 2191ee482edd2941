//! Session execution core.
//!
//! Everything between the HTTP surface and the model/tool layers lives
//! here: per-session bounded queues with a pause gate, the run
//! coordinator (tool loop, cancellation, generation guard), the stream
//! hub fanning events out to subscribers, and the per-session dispatch
//! task tying them together.

#![deny(unsafe_code)]

pub mod coordinator;
pub mod dispatcher;
pub mod errors;
pub mod history;
pub mod hub;
pub mod permission;
pub mod queue;
pub mod session;
pub mod title;
pub mod types;

pub use coordinator::{RunConfig, RunCoordinator, RunHandle};
pub use dispatcher::Dispatcher;
pub use errors::{QueueError, RuntimeError};
pub use history::{MemoryMessageStore, MessageStore};
pub use hub::{StreamHub, Subscriber};
pub use permission::{AllowAll, PermissionChecker, PermissionDecision, StaticPolicy};
pub use queue::{QueuedInput, SessionQueue, DEFAULT_QUEUE_CAPACITY};
pub use session::{SessionEntry, SessionInfo, SessionRegistry};
pub use types::RunOutcome;
