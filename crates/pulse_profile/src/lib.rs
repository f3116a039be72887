//! Behavior profiling: lazy, cached, TTL-bounded user profiles.

pub mod builder;
pub mod cache;

pub use builder::ProfileBuilder;
pub use cache::ExpiringCache;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use pulse_core::{PreferenceStore, PulseError, UserProfile};

/// Read-through profile service.
///
/// `get` serves from cache within TTL and recomputes on miss; preference or
/// event writes call `invalidate` so the next read recomputes.
pub struct ProfileService {
    builder: ProfileBuilder,
    preferences: Arc<dyn PreferenceStore>,
    cache: ExpiringCache<String, UserProfile>,
}

impl ProfileService {
    pub fn new(
        builder: ProfileBuilder,
        preferences: Arc<dyn PreferenceStore>,
        cache_ttl: Duration,
    ) -> Self {
        Self { builder, preferences, cache: ExpiringCache::new(cache_ttl) }
    }

    pub async fn get(&self, user_id: &str) -> Result<UserProfile, PulseError> {
        if let Some(profile) = self.cache.get(&user_id.to_string()).await {
            return Ok(profile);
        }

        let behavior = self.builder.build(user_id).await?;
        let preferences = self
            .preferences
            .preferences(user_id)
            .await?
            .ok_or_else(|| PulseError::ProfileUnavailable(user_id.to_string()))?;
        let segments = self.preferences.segments(user_id).await.unwrap_or_default();

        let profile = UserProfile {
            user_id: user_id.to_string(),
            preferences,
            behavior,
            segments,
            updated_at: Utc::now(),
        };
        tracing::debug!("Rebuilt behavior profile for {}", user_id);
        self.cache.insert(user_id.to_string(), profile.clone()).await;
        Ok(profile)
    }

    /// Drop the cached profile; the next `get` recomputes from the stores.
    pub async fn invalidate(&self, user_id: &str) {
        self.cache.invalidate(&user_id.to_string()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{
        Channel, EventKind, EventStore, MemoryEventStore, MemoryNotificationStore,
        MemoryPreferenceStore, Notification, NotificationEvent, NotificationKind,
        NotificationPreferences, NotificationStore,
    };

    async fn service_with_history(
        sent: usize,
        opened: usize,
    ) -> (ProfileService, Arc<MemoryEventStore>, Arc<MemoryPreferenceStore>) {
        let notifications = Arc::new(MemoryNotificationStore::new());
        let events = Arc::new(MemoryEventStore::new());
        let prefs = Arc::new(MemoryPreferenceStore::new());
        prefs.set_preferences("u1", NotificationPreferences::default()).await;

        let n = Notification::new("u1", NotificationKind::Like, "hi");
        notifications.insert(&n).await.unwrap();

        let mut batch = Vec::new();
        for _ in 0..sent {
            batch.push(
                NotificationEvent::new(n.id, "u1", EventKind::Sent).on_channel(Channel::Push),
            );
        }
        for _ in 0..opened {
            batch.push(
                NotificationEvent::new(n.id, "u1", EventKind::Opened).on_channel(Channel::Push),
            );
        }
        events.append(&batch).await.unwrap();

        let builder = ProfileBuilder::new(notifications, events.clone(), 30);
        let service = ProfileService::new(builder, prefs.clone(), Duration::from_secs(300));
        (service, events, prefs)
    }

    #[tokio::test]
    async fn engagement_rate_from_history() {
        let (service, _, _) = service_with_history(10, 4).await;
        let profile = service.get("u1").await.unwrap();
        assert!((profile.behavior.engagement_rate - 40.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn recompute_is_idempotent_on_unchanged_input() {
        let (service, _, _) = service_with_history(10, 4).await;
        let first = service.get("u1").await.unwrap();
        service.invalidate("u1").await;
        let second = service.get("u1").await.unwrap();
        assert_eq!(first.behavior.engagement_rate, second.behavior.engagement_rate);
        assert_eq!(first.behavior.preferred_channels, second.behavior.preferred_channels);
        assert_eq!(first.behavior.optimal_hours, second.behavior.optimal_hours);
    }

    #[tokio::test]
    async fn cached_profile_survives_store_outage() {
        let (service, events, _) = service_with_history(10, 4).await;
        let _ = service.get("u1").await.unwrap();

        events.set_failing(true);
        // Within TTL the cached profile is still served.
        assert!(service.get("u1").await.is_ok());

        // After invalidation the outage is surfaced.
        service.invalidate("u1").await;
        assert!(service.get("u1").await.is_err());
    }

    #[tokio::test]
    async fn missing_preferences_is_profile_unavailable() {
        let notifications = Arc::new(MemoryNotificationStore::new());
        let events = Arc::new(MemoryEventStore::new());
        let prefs = Arc::new(MemoryPreferenceStore::new());
        let builder = ProfileBuilder::new(notifications, events, 30);
        let service = ProfileService::new(builder, prefs, Duration::from_secs(300));

        let err = service.get("ghost").await.unwrap_err();
        assert!(matches!(err, PulseError::ProfileUnavailable(_)));
    }
}
