//! Conversation history storage.

use async_trait::async_trait;
use dashmap::DashMap;
use strand_core::ids::SessionId;
use strand_core::messages::Message;

use crate::errors::RuntimeError;

/// Where session transcripts live. The runtime only appends and reads;
/// durability is the implementation's business.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append one message to its session's transcript.
    async fn append(&self, message: Message) -> Result<(), RuntimeError>;

    /// Full transcript for a session, in append order.
    async fn list(&self, session_id: &SessionId) -> Result<Vec<Message>, RuntimeError>;

    /// Drop a session's transcript.
    async fn remove(&self, session_id: &SessionId) -> Result<(), RuntimeError>;

    /// Number of messages in a session's transcript.
    async fn count(&self, session_id: &SessionId) -> Result<usize, RuntimeError>;
}

/// In-memory store backed by a concurrent map.
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: DashMap<SessionId, Vec<Message>>,
}

impl MemoryMessageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(&self, message: Message) -> Result<(), RuntimeError> {
        self.messages
            .entry(message.session_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn list(&self, session_id: &SessionId) -> Result<Vec<Message>, RuntimeError> {
        Ok(self
            .messages
            .get(session_id)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn remove(&self, session_id: &SessionId) -> Result<(), RuntimeError> {
        let _ = self.messages.remove(session_id);
        Ok(())
    }

    async fn count(&self, session_id: &SessionId) -> Result<usize, RuntimeError> {
        Ok(self.messages.get(session_id).map_or(0, |entry| entry.len()))
    }
}
