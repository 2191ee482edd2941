//! Session registry and per-session run state.
//!
//! Each session owns a queue, a generation counter, and at most one
//! active run. The generation counter is the staleness guard: a run
//! carries the generation it started under, and its completion only
//! takes effect while that generation is still current. Deleting a
//! session bumps the generation, so a run still winding down cannot
//! publish terminal events afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use strand_core::ids::{RunId, SessionId};
use strand_core::messages::TokenUsage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::errors::RuntimeError;
use crate::queue::{SessionQueue, DEFAULT_QUEUE_CAPACITY};

/// Wire-facing session summary for list/get surfaces.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session ID.
    pub id: SessionId,
    /// Auto-generated or user-set title.
    pub title: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Cumulative token usage across runs.
    pub usage: TokenUsage,
    /// Whether a run is executing right now.
    pub active: bool,
    /// Inputs waiting in the queue.
    pub queued: usize,
    /// Whether the queue gate is set.
    pub paused: bool,
}

struct ActiveRun {
    run_id: RunId,
    generation: u64,
    cancel: CancellationToken,
}

/// One session's live state.
pub struct SessionEntry {
    /// Session ID.
    pub id: SessionId,
    /// The session's inbox.
    pub queue: Arc<SessionQueue>,
    created_at: DateTime<Utc>,
    title: Mutex<Option<String>>,
    usage: Mutex<TokenUsage>,
    generation: AtomicU64,
    active: Mutex<Option<ActiveRun>>,
}

impl SessionEntry {
    fn new(id: SessionId, queue_capacity: usize) -> Self {
        Self {
            id,
            queue: Arc::new(SessionQueue::new(queue_capacity)),
            created_at: Utc::now(),
            title: Mutex::new(None),
            usage: Mutex::new(TokenUsage::default()),
            generation: AtomicU64::new(0),
            active: Mutex::new(None),
        }
    }

    /// Claim the run slot. Returns the new generation and a fresh
    /// cancellation token, or `None` if a run is already active.
    pub fn begin_run(&self, run_id: RunId) -> Option<(u64, CancellationToken)> {
        let mut active = self.active.lock();
        if active.is_some() {
            return None;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        *active = Some(ActiveRun {
            run_id,
            generation,
            cancel: cancel.clone(),
        });
        Some((generation, cancel))
    }

    /// Release the run slot if `generation` still owns it.
    pub fn finish_run(&self, generation: u64) {
        let mut active = self.active.lock();
        if active
            .as_ref()
            .is_some_and(|run| run.generation == generation)
        {
            *active = None;
        }
    }

    /// Whether `generation` is still the session's current generation.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Current generation value.
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Bump the generation without starting a run, making any
    /// in-flight run's completion stale.
    pub fn invalidate(&self) {
        let _ = self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Cancel the active run's token, if any. The run slot stays
    /// claimed until the run winds down.
    pub fn cancel_active(&self) -> bool {
        let active = self.active.lock();
        if let Some(run) = active.as_ref() {
            debug!(session_id = %self.id, run_id = %run.run_id, "cancelling active run");
            run.cancel.cancel();
            true
        } else {
            false
        }
    }

    /// Pause the session: set the queue gate and cancel the active
    /// run, if any. Queued inputs stay put. Idempotent.
    pub fn pause(&self) {
        self.queue.pause();
        let _ = self.cancel_active();
    }

    /// Resume the session: clear the gate and wake the dispatch task.
    /// Idempotent.
    pub fn resume(&self) {
        self.queue.resume();
    }

    /// Whether a run is executing right now.
    pub fn has_active_run(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Fold a run's usage into the session total.
    pub fn add_usage(&self, usage: TokenUsage) {
        self.usage.lock().add(usage);
    }

    /// Cumulative usage across runs.
    pub fn usage(&self) -> TokenUsage {
        *self.usage.lock()
    }

    /// Session title, if one has been set.
    pub fn title(&self) -> Option<String> {
        self.title.lock().clone()
    }

    /// Set the session title.
    pub fn set_title(&self, title: impl Into<String>) {
        *self.title.lock() = Some(title.into());
    }

    /// Summary for the wire.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            title: self.title(),
            created_at: self.created_at,
            usage: self.usage(),
            active: self.has_active_run(),
            queued: self.queue.len(),
            paused: self.queue.is_paused(),
        }
    }
}

/// All live sessions. An explicit instance owned by the composition
/// root; two registries share nothing.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionEntry>>,
    queue_capacity: usize,
}

impl SessionRegistry {
    /// Registry whose sessions get the default queue capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Registry with a custom per-session queue capacity.
    #[must_use]
    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            queue_capacity,
        }
    }

    /// Create a session with a fresh ID.
    #[instrument(skip(self))]
    pub fn create(&self) -> Arc<SessionEntry> {
        self.create_with_id(SessionId::new())
    }

    /// Create a session under a caller-chosen ID, or return the
    /// existing entry.
    pub fn create_with_id(&self, id: SessionId) -> Arc<SessionEntry> {
        let entry = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| Arc::new(SessionEntry::new(id, self.queue_capacity)));
        entry.clone()
    }

    /// Look up a session.
    pub fn get(&self, id: &SessionId) -> Result<Arc<SessionEntry>, RuntimeError> {
        self.sessions
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RuntimeError::SessionNotFound(id.to_string()))
    }

    /// Whether the session exists.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Remove a session. Any active run is cancelled and its pending
    /// completion invalidated; the queue is closed so the dispatch
    /// task exits.
    #[instrument(skip(self), fields(session_id = %id))]
    pub fn delete(&self, id: &SessionId) -> Result<(), RuntimeError> {
        let (_, entry) = self
            .sessions
            .remove(id)
            .ok_or_else(|| RuntimeError::SessionNotFound(id.to_string()))?;
        let _ = entry.cancel_active();
        entry.invalidate();
        entry.queue.close();
        debug!(session_id = %id, "session deleted");
        Ok(())
    }

    /// Summaries of every session, newest first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> =
            self.sessions.iter().map(|entry| entry.info()).collect();
        infos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        infos
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions exist.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions with an executing run.
    pub fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.has_active_run())
            .count()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
