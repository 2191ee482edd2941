//! Per-session dispatch tasks.
//!
//! One task per session pulls from the queue (blocking on the gated
//! wait, zero CPU while paused or empty), claims the run slot, starts
//! the coordinator, awaits the outcome, and answers any blocked
//! caller. The task exits when the queue closes.

use std::sync::Arc;

use dashmap::DashMap;
use strand_core::ids::{RunId, SessionId};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::coordinator::RunCoordinator;
use crate::errors::QueueError;
use crate::hub::StreamHub;
use crate::queue::QueuedInput;
use crate::session::SessionEntry;
use crate::title;
use crate::types::RunOutcome;

/// Owns the per-session dispatch tasks.
pub struct Dispatcher {
    coordinator: Arc<RunCoordinator>,
    hub: Arc<StreamHub>,
    tasks: DashMap<SessionId, JoinHandle<()>>,
    titles_started: DashMap<SessionId, ()>,
}

impl Dispatcher {
    /// Build a dispatcher over a coordinator and hub.
    pub fn new(coordinator: Arc<RunCoordinator>, hub: Arc<StreamHub>) -> Self {
        Self {
            coordinator,
            hub,
            tasks: DashMap::new(),
            titles_started: DashMap::new(),
        }
    }

    /// Enqueue an input and make sure the session's dispatch task is
    /// running. Rejection is synchronous and drops nothing already
    /// queued.
    pub fn submit(
        self: &Arc<Self>,
        entry: &Arc<SessionEntry>,
        input: QueuedInput,
    ) -> Result<(), QueueError> {
        entry.queue.enqueue(input)?;
        self.ensure_running(entry);
        Ok(())
    }

    /// Spawn the session's dispatch task if it is not already running.
    pub fn ensure_running(self: &Arc<Self>, entry: &Arc<SessionEntry>) {
        let _ = self.tasks.entry(entry.id.clone()).or_insert_with(|| {
            let dispatcher = self.clone();
            let entry = entry.clone();
            tokio::spawn(async move {
                dispatcher.run_session_loop(entry).await;
            })
        });
    }

    /// Number of live dispatch tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Abort every dispatch task. Queues are left as they are; used
    /// only on server shutdown.
    pub fn shutdown(&self) {
        for task in self.tasks.iter() {
            task.abort();
        }
        self.tasks.clear();
    }

    async fn run_session_loop(&self, entry: Arc<SessionEntry>) {
        debug!(session_id = %entry.id, "dispatch task started");
        while let Some(input) = entry.queue.next_ready().await {
            self.maybe_generate_title(&entry, &input.content);

            let run_id = RunId::new();
            let Some((generation, cancel)) = entry.begin_run(run_id) else {
                // Single consumer per queue; a claimed slot here means
                // an outside caller raced us
                warn!(session_id = %entry.id, "run slot already claimed, dropping input");
                if let Some(reply) = input.reply {
                    let _ = reply.send(RunOutcome::Failed {
                        error: "another run is active".into(),
                    });
                }
                continue;
            };

            let handle = self
                .coordinator
                .start(entry.clone(), generation, cancel, input.content);
            let outcome = handle.outcome().await;
            entry.finish_run(generation);

            if let Some(reply) = input.reply {
                let _ = reply.send(outcome);
            }
            self.hub.maybe_gc(&entry.id, entry.has_active_run());
        }
        let _ = self.tasks.remove(&entry.id);
        self.hub.maybe_gc(&entry.id, false);
        debug!(session_id = %entry.id, "dispatch task stopped");
    }

    /// Kick off title generation on the session's first input.
    /// Fire-and-forget; the run does not wait for it.
    fn maybe_generate_title(&self, entry: &Arc<SessionEntry>, prompt: &str) {
        if entry.title().is_some() {
            return;
        }
        if self
            .titles_started
            .insert(entry.id.clone(), ())
            .is_some()
        {
            return;
        }
        let provider = self.coordinator.provider().clone();
        let entry = entry.clone();
        let prompt = prompt.to_owned();
        let _ = tokio::spawn(async move {
            if let Some(generated) = title::generate_title(&provider, &prompt).await {
                if entry.title().is_none() {
                    debug!(session_id = %entry.id, title = %generated, "session titled");
                    entry.set_title(generated);
                }
            }
        });
    }
}
