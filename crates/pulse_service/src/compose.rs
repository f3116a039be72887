//! Social-event composition
//!
//! Collapses bursts of like events into one grouped notification and emits
//! follower-milestone notifications exactly once per threshold.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use pulse_core::{Notification, NotificationKind, Priority};

/// Follower counts that earn a milestone notification.
const MILESTONE_THRESHOLDS: [u64; 6] = [10, 100, 1_000, 10_000, 100_000, 1_000_000];

struct LikeBatch {
    likers: Vec<String>,
    opened_at: DateTime<Utc>,
}

/// Batches like events per content item inside a grouping window.
pub struct LikeAggregator {
    window: Duration,
    pending: Mutex<HashMap<(String, String), LikeBatch>>,
}

impl LikeAggregator {
    pub fn new(window: Duration) -> Self {
        Self { window, pending: Mutex::new(HashMap::new()) }
    }

    /// Record one like. Returns nothing: grouped notifications are emitted
    /// by `drain_due` once a batch's window closes.
    pub async fn record(&self, owner_id: &str, content_id: &str, liker_id: &str) {
        let mut pending = self.pending.lock().await;
        let batch = pending
            .entry((owner_id.to_string(), content_id.to_string()))
            .or_insert_with(|| LikeBatch { likers: Vec::new(), opened_at: Utc::now() });
        if !batch.likers.iter().any(|l| l == liker_id) {
            batch.likers.push(liker_id.to_string());
        }
    }

    /// Emit one grouped notification per batch whose window has elapsed.
    pub async fn drain_due(&self, now: DateTime<Utc>) -> Vec<Notification> {
        let mut pending = self.pending.lock().await;
        let due: Vec<(String, String)> = pending
            .iter()
            .filter(|(_, b)| now - b.opened_at >= self.window)
            .map(|(k, _)| k.clone())
            .collect();

        let mut out = Vec::new();
        for key in due {
            let Some(batch) = pending.remove(&key) else { continue };
            let (owner, content_id) = key;
            out.push(grouped_like_notification(&owner, &content_id, &batch.likers));
        }
        out
    }
}

/// One notification naming the likers, however many there were.
fn grouped_like_notification(owner: &str, content_id: &str, likers: &[String]) -> Notification {
    let content = match likers {
        [] => "Your post was liked".to_string(),
        [a] => format!("{a} liked your post"),
        [a, b] => format!("{a} and {b} liked your post"),
        [a, b, rest @ ..] => format!("{a}, {b} and {} others liked your post", rest.len()),
    };
    Notification::new(owner, NotificationKind::Like, content)
        .with_action_url(format!("/posts/{content_id}"))
}

/// Emits exactly one milestone notification per crossed threshold.
pub struct MilestoneTracker {
    emitted: Mutex<HashSet<(String, u64)>>,
}

impl Default for MilestoneTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MilestoneTracker {
    pub fn new() -> Self {
        Self { emitted: Mutex::new(HashSet::new()) }
    }

    /// Check a follower-count transition. A threshold fires only on the
    /// transition that crosses it; re-checking at the same count is a no-op.
    pub async fn check_followers(
        &self,
        user_id: &str,
        previous: u64,
        current: u64,
    ) -> Option<Notification> {
        let crossed = MILESTONE_THRESHOLDS
            .iter()
            .copied()
            .filter(|&t| previous < t && current >= t)
            .max()?;

        let mut emitted = self.emitted.lock().await;
        if !emitted.insert((user_id.to_string(), crossed)) {
            return None;
        }

        Some(
            Notification::new(
                user_id,
                NotificationKind::Milestone,
                format!("You reached {crossed} followers!"),
            )
            .with_priority(Priority::High),
        )
    }
}
