//! Notification lifecycle events
//!
//! Events are the feedback half of the loop: every delivery and engagement
//! outcome becomes a `NotificationEvent`, which analytics rolls up and the
//! profile builder reads back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::notification::Channel;

/// What happened to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Sent,
    Delivered,
    Opened,
    Clicked,
    Converted,
    Dismissed,
    Bounced,
    Failed,
}

impl EventKind {
    /// Critical events are persisted synchronously before `track` returns;
    /// everything else rides the batched flush.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            EventKind::Delivered | EventKind::Clicked | EventKind::Converted | EventKind::Bounced
        )
    }
}

/// A single recorded lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub user_id: String,
    pub kind: EventKind,
    pub channel: Option<Channel>,
    pub metadata: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(notification_id: Uuid, user_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification_id,
            user_id: user_id.into(),
            kind,
            channel: None,
            metadata: serde_json::Value::Null,
            occurred_at: Utc::now(),
        }
    }

    pub fn on_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_kinds() {
        assert!(EventKind::Delivered.is_critical());
        assert!(EventKind::Clicked.is_critical());
        assert!(EventKind::Converted.is_critical());
        assert!(EventKind::Bounced.is_critical());
        assert!(!EventKind::Sent.is_critical());
        assert!(!EventKind::Opened.is_critical());
        assert!(!EventKind::Dismissed.is_critical());
    }
}
