//! Retention sweeper
//!
//! Notifications and events past the retention window are deleted on a
//! periodic sweep. Terminal records stay queryable for analytics until the
//! window elapses; a store outage skips the sweep rather than failing it.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use pulse_core::{EventStore, NotificationStore};

pub struct RetentionSweeper {
    notifications: Arc<dyn NotificationStore>,
    events: Arc<dyn EventStore>,
    retention_days: i64,
}

impl RetentionSweeper {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        events: Arc<dyn EventStore>,
        retention_days: i64,
    ) -> Arc<Self> {
        Arc::new(Self { notifications, events, retention_days })
    }

    /// Run one sweep. Returns (notifications purged, events purged).
    pub async fn purge_once(&self) -> (u64, u64) {
        let cutoff = Utc::now() - ChronoDuration::days(self.retention_days);

        let notifications = match self.notifications.purge_before(cutoff).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Notification retention sweep failed: {}", e);
                0
            }
        };
        let events = match self.events.purge_before(cutoff).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Event retention sweep failed: {}", e);
                0
            }
        };

        if notifications + events > 0 {
            tracing::info!(
                "Purged {} notifications and {} events past {}-day retention",
                notifications,
                events,
                self.retention_days
            );
        }
        (notifications, events)
    }

    /// Periodic sweep task. Runs until aborted.
    pub fn spawn_purge_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let sweeper = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                sweeper.purge_once().await;
            }
        })
    }
}
