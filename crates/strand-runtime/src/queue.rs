//! Per-session bounded inbox with a pause gate.
//!
//! One dispatch task per session consumes the queue. It sleeps on a
//! single condition, item present and gate clear, via [`Notify`]; only
//! `enqueue` and `resume` wake it, so a paused session costs zero CPU
//! no matter how much is queued behind the gate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tracing::debug;

use crate::errors::QueueError;
use crate::types::RunOutcome;

/// Default inbox capacity per session.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// One queued prompt awaiting dispatch.
#[derive(Debug)]
pub struct QueuedInput {
    /// Prompt text.
    pub content: String,
    /// When the input was accepted.
    pub enqueued_at: DateTime<Utc>,
    /// Present when a caller is blocked waiting on the terminal result.
    pub reply: Option<oneshot::Sender<RunOutcome>>,
}

impl QueuedInput {
    /// An input nobody is waiting on.
    #[must_use]
    pub fn fire_and_forget(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            enqueued_at: Utc::now(),
            reply: None,
        }
    }

    /// An input whose terminal result is delivered to `reply`.
    #[must_use]
    pub fn with_reply(content: impl Into<String>, reply: oneshot::Sender<RunOutcome>) -> Self {
        Self {
            content: content.into(),
            enqueued_at: Utc::now(),
            reply: Some(reply),
        }
    }
}

struct QueueInner {
    items: VecDeque<QueuedInput>,
    paused: bool,
    closed: bool,
}

/// Bounded FIFO inbox for one session.
pub struct SessionQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    capacity: usize,
    dequeues: AtomicU64,
}

impl SessionQueue {
    /// Create a queue with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                paused: false,
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            dequeues: AtomicU64::new(0),
        }
    }

    /// Accept an input, or reject synchronously when at capacity.
    /// Accepted inputs are never dropped.
    pub fn enqueue(&self, input: QueuedInput) -> Result<(), QueueError> {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(QueueError::Closed);
            }
            if inner.items.len() >= self.capacity {
                return Err(QueueError::QueueFull {
                    capacity: self.capacity,
                });
            }
            inner.items.push_back(input);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Set the gate. Queued items stay put; nothing is dequeued until
    /// [`resume`](Self::resume). Idempotent.
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if !inner.paused {
            inner.paused = true;
            debug!(queued = inner.items.len(), "queue paused");
        }
    }

    /// Clear the gate and wake the dispatch task. Idempotent.
    pub fn resume(&self) {
        let was_paused = {
            let mut inner = self.inner.lock();
            let was = inner.paused;
            inner.paused = false;
            was
        };
        if was_paused {
            debug!("queue resumed");
            self.notify.notify_one();
        }
    }

    /// Close the queue. Pending items are dropped and the dispatch
    /// task unblocks with `None`.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.items.clear();
        }
        self.notify.notify_one();
    }

    /// Take the next item if one is ready and the gate is clear.
    pub fn try_next(&self) -> Option<QueuedInput> {
        let mut inner = self.inner.lock();
        if inner.paused || inner.closed {
            return None;
        }
        let item = inner.items.pop_front();
        if item.is_some() {
            let _ = self.dequeues.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Wait until an item is ready and the gate is clear, then take
    /// it. Returns `None` once the queue is closed. Single-consumer.
    pub async fn next_ready(&self) -> Option<QueuedInput> {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return None;
                }
                if !inner.paused {
                    if let Some(item) = inner.items.pop_front() {
                        let _ = self.dequeues.fetch_add(1, Ordering::Relaxed);
                        return Some(item);
                    }
                }
            }
            self.notify.notified().await;
        }
    }

    /// Whether the gate is set.
    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Items currently waiting.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether the inbox is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Total items dequeued since creation. Flat while paused.
    pub fn dequeue_count(&self) -> u64 {
        self.dequeues.load(Ordering::Relaxed)
    }
}

impl Default for SessionQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn fifo_order() {
        let queue = SessionQueue::new(10);
        queue.enqueue(QueuedInput::fire_and_forget("a")).unwrap();
        queue.enqueue(QueuedInput::fire_and_forget("b")).unwrap();
        queue.enqueue(QueuedInput::fire_and_forget("c")).unwrap();

        assert_eq!(queue.next_ready().await.unwrap().content, "a");
        assert_eq!(queue.next_ready().await.unwrap().content, "b");
        assert_eq!(queue.next_ready().await.unwrap().content, "c");
        assert_eq!(queue.dequeue_count(), 3);
    }

    #[tokio::test]
    async fn rejects_when_full() {
        let queue = SessionQueue::new(2);
        queue.enqueue(QueuedInput::fire_and_forget("a")).unwrap();
        queue.enqueue(QueuedInput::fire_and_forget("b")).unwrap();

        let err = queue
            .enqueue(QueuedInput::fire_and_forget("c"))
            .unwrap_err();
        assert_eq!(err, QueueError::QueueFull { capacity: 2 });

        // Items already accepted survive the rejection
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.next_ready().await.unwrap().content, "a");
    }

    #[tokio::test]
    async fn pause_gates_dequeue() {
        let queue = SessionQueue::new(10);
        queue.enqueue(QueuedInput::fire_and_forget("a")).unwrap();
        queue.pause();

        assert!(queue.try_next().is_none());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dequeue_count(), 0);

        queue.resume();
        assert_eq!(queue.try_next().unwrap().content, "a");
    }

    #[tokio::test]
    async fn no_dequeues_while_paused() {
        let queue = Arc::new(SessionQueue::new(10));
        queue.pause();
        for i in 0..5 {
            queue
                .enqueue(QueuedInput::fire_and_forget(format!("m{i}")))
                .unwrap();
        }

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut taken = Vec::new();
                while taken.len() < 5 {
                    match queue.next_ready().await {
                        Some(item) => taken.push(item.content),
                        None => break,
                    }
                }
                taken
            })
        };

        // Give the consumer time to reach the wait; nothing moves
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.dequeue_count(), 0);
        assert_eq!(queue.len(), 5);

        queue.resume();
        let taken = consumer.await.unwrap();
        assert_eq!(taken, ["m0", "m1", "m2", "m3", "m4"]);
        assert_eq!(queue.dequeue_count(), 5);
    }

    #[tokio::test]
    async fn enqueue_wakes_waiting_consumer() {
        let queue = Arc::new(SessionQueue::new(10));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next_ready().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(QueuedInput::fire_and_forget("late")).unwrap();

        let item = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.unwrap().content, "late");
    }

    #[tokio::test]
    async fn pause_and_resume_are_idempotent() {
        let queue = SessionQueue::new(10);
        queue.pause();
        queue.pause();
        assert!(queue.is_paused());
        queue.resume();
        queue.resume();
        assert!(!queue.is_paused());
    }

    #[tokio::test]
    async fn close_unblocks_consumer() {
        let queue = Arc::new(SessionQueue::new(10));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next_ready().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let result = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());
        assert!(queue
            .enqueue(QueuedInput::fire_and_forget("x"))
            .is_err());
    }
}
