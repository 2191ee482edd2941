//! Per-session event fan-out.
//!
//! Producers publish with `try_send` into each subscriber's bounded
//! channel and never block. A subscriber that cannot keep up (full
//! channel) or has gone away (closed channel) is dropped from the set;
//! everyone else keeps receiving.

use std::collections::HashMap;

use dashmap::DashMap;
use strand_core::events::SessionEvent;
use strand_core::ids::{SessionId, SubscriberId};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default per-subscriber channel capacity.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// A subscriber's receiving end.
pub struct Subscriber {
    /// Subscriber ID, needed to detach.
    pub id: SubscriberId,
    receiver: mpsc::Receiver<SessionEvent>,
}

impl Subscriber {
    /// Receive the next event. `None` once dropped by the hub.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.receiver.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.receiver.try_recv().ok()
    }
}

/// Fan-out hub keyed by session. The subscriber table is its own lock;
/// publishing never touches run state.
pub struct StreamHub {
    sessions: DashMap<SessionId, HashMap<SubscriberId, mpsc::Sender<SessionEvent>>>,
    buffer: usize,
}

impl StreamHub {
    /// Hub with the default per-subscriber buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    /// Hub with a custom per-subscriber buffer.
    #[must_use]
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            buffer,
        }
    }

    /// Attach a new subscriber. Its channel is pre-seeded with the
    /// `connected` event so the first read always identifies the
    /// session.
    pub fn attach(&self, session_id: &SessionId) -> Subscriber {
        let id = SubscriberId::new();
        let (sender, receiver) = mpsc::channel(self.buffer);
        let _ = sender.try_send(SessionEvent::Connected {
            session_id: session_id.clone(),
        });
        let _ = self
            .sessions
            .entry(session_id.clone())
            .or_default()
            .insert(id.clone(), sender);
        debug!(session_id = %session_id, subscriber_id = %id, "subscriber attached");
        Subscriber { id, receiver }
    }

    /// Remove a subscriber. Idempotent.
    pub fn detach(&self, session_id: &SessionId, subscriber_id: &SubscriberId) {
        if let Some(mut subscribers) = self.sessions.get_mut(session_id) {
            if subscribers.remove(subscriber_id).is_some() {
                debug!(session_id = %session_id, subscriber_id = %subscriber_id, "subscriber detached");
            }
        }
    }

    /// Deliver an event to every subscriber of the session. Subscribers
    /// whose channel is full or closed are dropped; delivery to the
    /// rest is unaffected.
    pub fn publish(&self, session_id: &SessionId, event: &SessionEvent) {
        let Some(mut subscribers) = self.sessions.get_mut(session_id) else {
            return;
        };
        subscribers.retain(|subscriber_id, sender| match sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    session_id = %session_id,
                    subscriber_id = %subscriber_id,
                    "subscriber channel full, dropping subscriber"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Subscribers attached to one session.
    pub fn subscriber_count(&self, session_id: &SessionId) -> usize {
        self.sessions
            .get(session_id)
            .map_or(0, |subscribers| subscribers.len())
    }

    /// Subscribers across all sessions.
    pub fn total_subscribers(&self) -> usize {
        self.sessions.iter().map(|entry| entry.len()).sum()
    }

    /// Drop the session's hub entry when nothing holds it open: no
    /// subscribers and no active run.
    pub fn maybe_gc(&self, session_id: &SessionId, has_active_run: bool) {
        if has_active_run {
            return;
        }
        let removed = self
            .sessions
            .remove_if(session_id, |_, subscribers| subscribers.is_empty());
        if removed.is_some() {
            debug!(session_id = %session_id, "hub entry collected");
        }
    }

    /// Drop the session's hub entry unconditionally, closing every
    /// subscriber channel.
    pub fn remove_session(&self, session_id: &SessionId) {
        let _ = self.sessions.remove(session_id);
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}
