//! Store and sender traits
//!
//! Persistence technology is abstract: the pipeline talks to document/event
//! stores and opaque channel senders through these traits. Everything is
//! async and awaited, never polled.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::delivery::SendOutcome;
use crate::error::PulseError;
use crate::event::NotificationEvent;
use crate::notification::{Channel, EnhancedNotification, Notification};
use crate::profile::NotificationPreferences;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<(), PulseError>;
    async fn get(&self, id: Uuid) -> Result<Option<Notification>, PulseError>;
    async fn update(&self, notification: &Notification) -> Result<(), PulseError>;
    /// Notifications for a user created at or after `since`.
    async fn for_user_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Notification>, PulseError>;
    /// Delete notifications created before `cutoff`. Returns the count removed.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PulseError>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, events: &[NotificationEvent]) -> Result<(), PulseError>;
    async fn for_user_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<NotificationEvent>, PulseError>;
    /// Delete events that occurred before `cutoff`. Returns the count removed.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PulseError>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn preferences(&self, user_id: &str)
        -> Result<Option<NotificationPreferences>, PulseError>;
    async fn segments(&self, user_id: &str) -> Result<Vec<String>, PulseError>;
}

/// An opaque per-channel sender. How the message physically transmits is
/// not this system's concern.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(
        &self,
        channel: Channel,
        notification: &EnhancedNotification,
    ) -> Result<SendOutcome, PulseError>;
}
