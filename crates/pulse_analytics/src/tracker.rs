//! Event tracker
//!
//! Critical events (delivered, clicked, converted, bounced) persist
//! synchronously before `track` returns. Everything else rides an
//! in-memory queue drained on a fixed interval: the drain swaps the queue
//! for an empty one so concurrent enqueues during a flush are never lost,
//! and a failed batch is re-prepended for the next attempt.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use pulse_core::{EventStore, NotificationEvent, PulseError};

pub struct EventTracker {
    store: Arc<dyn EventStore>,
    queue: Mutex<Vec<NotificationEvent>>,
    flush_interval: Duration,
}

impl EventTracker {
    pub fn new(store: Arc<dyn EventStore>, flush_interval: Duration) -> Arc<Self> {
        Arc::new(Self { store, queue: Mutex::new(Vec::new()), flush_interval })
    }

    /// Record one event. Never fails the caller: a store outage on a
    /// critical event re-buffers it for the next flush.
    pub async fn track(&self, event: NotificationEvent) {
        if event.kind.is_critical() {
            match self.store.append(std::slice::from_ref(&event)).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!("Synchronous persist failed, buffering: {}", e);
                }
            }
        }
        self.queue.lock().await.push(event);
    }

    /// Drain the queue once. Returns the number of events persisted.
    pub async fn flush(&self) -> usize {
        let batch = {
            let mut queue = self.queue.lock().await;
            std::mem::take(&mut *queue)
        };
        if batch.is_empty() {
            return 0;
        }

        match self.store.append(&batch).await {
            Ok(()) => {
                tracing::debug!("Flushed {} events", batch.len());
                batch.len()
            }
            Err(e) => {
                tracing::warn!("Flush of {} events failed, re-queueing: {}", batch.len(), e);
                let mut queue = self.queue.lock().await;
                let mut restored = batch;
                restored.append(&mut queue);
                *queue = restored;
                0
            }
        }
    }

    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Periodic drain task. Runs until aborted.
    pub fn spawn_flush_task(self: &Arc<Self>) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tracker.flush_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tracker.flush().await;
            }
        })
    }
}
