//! In-memory store implementations
//!
//! Reference implementations of the store traits, used by tests and by
//! deployments that front a real document store elsewhere. A `fail` flag
//! lets tests simulate an unavailable store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::PulseError;
use crate::event::NotificationEvent;
use crate::notification::Notification;
use crate::profile::NotificationPreferences;
use crate::store::{EventStore, NotificationStore, PreferenceStore};

#[derive(Default)]
pub struct MemoryNotificationStore {
    records: RwLock<HashMap<Uuid, Notification>>,
    fail: AtomicBool,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call return `StoreUnavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), PulseError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PulseError::StoreUnavailable("notification store down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert(&self, notification: &Notification) -> Result<(), PulseError> {
        self.check()?;
        self.records.write().await.insert(notification.id, notification.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, PulseError> {
        self.check()?;
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn update(&self, notification: &Notification) -> Result<(), PulseError> {
        self.check()?;
        self.records.write().await.insert(notification.id, notification.clone());
        Ok(())
    }

    async fn for_user_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Notification>, PulseError> {
        self.check()?;
        let records = self.records.read().await;
        let mut out: Vec<Notification> = records
            .values()
            .filter(|n| n.user_id == user_id && n.created_at >= since)
            .cloned()
            .collect();
        out.sort_by_key(|n| n.created_at);
        Ok(out)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PulseError> {
        self.check()?;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, n| n.created_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<NotificationEvent>>,
    fail: AtomicBool,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn all(&self) -> Vec<NotificationEvent> {
        self.events.read().await.clone()
    }

    fn check(&self) -> Result<(), PulseError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PulseError::StoreUnavailable("event store down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, events: &[NotificationEvent]) -> Result<(), PulseError> {
        self.check()?;
        self.events.write().await.extend_from_slice(events);
        Ok(())
    }

    async fn for_user_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<NotificationEvent>, PulseError> {
        self.check()?;
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.user_id == user_id && e.occurred_at >= since)
            .cloned()
            .collect())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PulseError> {
        self.check()?;
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|e| e.occurred_at >= cutoff);
        Ok((before - events.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryPreferenceStore {
    prefs: RwLock<HashMap<String, NotificationPreferences>>,
    segments: RwLock<HashMap<String, Vec<String>>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_preferences(&self, user_id: &str, prefs: NotificationPreferences) {
        self.prefs.write().await.insert(user_id.to_string(), prefs);
    }

    pub async fn set_segments(&self, user_id: &str, segments: Vec<String>) {
        self.segments.write().await.insert(user_id.to_string(), segments);
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<NotificationPreferences>, PulseError> {
        Ok(self.prefs.read().await.get(user_id).cloned())
    }

    async fn segments(&self, user_id: &str) -> Result<Vec<String>, PulseError> {
        Ok(self.segments.read().await.get(user_id).cloned().unwrap_or_default())
    }
}
