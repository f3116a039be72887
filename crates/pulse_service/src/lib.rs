//! The explicitly-wired notification intelligence service.
//!
//! One constructed object owns the caches, queues and timers; call sites
//! receive it by reference. No hidden global state.

pub mod compose;

pub use compose::{LikeAggregator, MilestoneTracker};

use async_trait::async_trait;
use chrono::{Timelike, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use pulse_analytics::{
    export, AnalyticsAggregator, AnalyticsReport, EventTracker, ExportFormat, InsightsBuilder,
    PerformanceInsights, Period, RetentionSweeper,
};
use pulse_core::{
    AttemptStatus, Channel, ChannelSender, DeliveryStrategy, EngagementPrediction,
    EnhancedNotification, EventKind, EventStore, Notification, NotificationEvent,
    NotificationStore, PreferenceStore, PulseConfig, PulseError, UserContext, UserProfile,
};
use pulse_delivery::{DeliveryOrchestrator, EventSink};
use pulse_gate::{DeliveryGate, GateDecision, PredictiveScorer};
use pulse_profile::{ProfileBuilder, ProfileService};
use pulse_rules::{PersonalizationRule, RuleCache, RuleEngine, RuleManager, RuleStore};

/// How often the retention sweeper runs.
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60 * 24);

/// Bridges the orchestrator's event reports into the tracker.
struct TrackerSink {
    tracker: Arc<EventTracker>,
}

#[async_trait]
impl EventSink for TrackerSink {
    async fn record(&self, event: NotificationEvent) {
        self.tracker.track(event).await;
    }
}

/// Admission result of running the decision stages for one notification.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Personalization or the gate suppressed delivery.
    Skipped { reason: Option<String> },
    /// Admitted. Delivery (including any deferral and retry pacing) runs on
    /// a background task; terminal status lands in the event stream.
    Accepted { notification_id: Uuid },
}

pub struct NotificationService {
    config: PulseConfig,
    notifications: Arc<dyn NotificationStore>,
    profiles: ProfileService,
    engine: RuleEngine,
    rules: RuleManager,
    gate: DeliveryGate,
    scorer: PredictiveScorer,
    orchestrator: Arc<DeliveryOrchestrator>,
    tracker: Arc<EventTracker>,
    aggregator: AnalyticsAggregator,
    insights: InsightsBuilder,
    likes: LikeAggregator,
    milestones: MilestoneTracker,
    /// In-flight delivery tasks, keyed by notification. Entries remove
    /// themselves on completion; `cancel_delivery` aborts one early.
    deliveries: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
    flush_task: JoinHandle<()>,
    purge_task: JoinHandle<()>,
}

impl NotificationService {
    /// Wire the whole pipeline. Starts the periodic event-flush and
    /// retention-sweep tasks.
    pub async fn new(
        config: PulseConfig,
        notifications: Arc<dyn NotificationStore>,
        events: Arc<dyn EventStore>,
        preferences: Arc<dyn PreferenceStore>,
        rule_store: Arc<dyn RuleStore>,
        sender: Arc<dyn ChannelSender>,
    ) -> Result<Self, PulseError> {
        let builder =
            ProfileBuilder::new(notifications.clone(), events.clone(), config.profile.lookback_days);
        let profiles =
            ProfileService::new(builder, preferences.clone(), config.profile.cache_ttl());

        let rule_cache = RuleCache::load(rule_store.clone()).await?;
        let engine = RuleEngine::new(rule_cache.clone());
        let rules = RuleManager::new(rule_store, rule_cache);

        let tracker = EventTracker::new(events.clone(), config.tracker.flush_interval());
        let flush_task = tracker.spawn_flush_task();

        let sink = Arc::new(TrackerSink { tracker: tracker.clone() });
        let orchestrator =
            Arc::new(DeliveryOrchestrator::new(sender, notifications.clone(), sink));

        let aggregator =
            AnalyticsAggregator::new(notifications.clone(), events.clone(), preferences);
        let insights = InsightsBuilder::new(notifications.clone(), events.clone());

        let sweeper =
            RetentionSweeper::new(notifications.clone(), events, config.analytics.retention_days);
        let purge_task = sweeper.spawn_purge_task(RETENTION_SWEEP_INTERVAL);

        let likes = LikeAggregator::new(chrono::Duration::seconds(
            config.grouping.like_window_secs as i64,
        ));

        Ok(Self {
            config,
            notifications,
            profiles,
            engine,
            rules,
            gate: DeliveryGate::new(),
            scorer: PredictiveScorer::new(),
            orchestrator,
            tracker,
            aggregator,
            insights,
            likes,
            milestones: MilestoneTracker::new(),
            deliveries: Arc::new(Mutex::new(HashMap::new())),
            flush_task,
            purge_task,
        })
    }

    // ========================================================================
    // Decision path
    // ========================================================================

    /// Gate decision for a notification. Without a resolvable profile the
    /// answer is a conservative deny, never an error.
    pub async fn should_send_notification(
        &self,
        notification: &Notification,
        profile: Option<&UserProfile>,
        context: &UserContext,
    ) -> GateDecision {
        let resolved: UserProfile;
        let profile = match profile {
            Some(p) => p,
            None => match self.profiles.get(&notification.user_id).await {
                Ok(p) => {
                    resolved = p;
                    &resolved
                }
                Err(e) => {
                    tracing::info!("Denying send, profile unavailable: {}", e);
                    return GateDecision::deny_no_profile(&notification.user_id);
                }
            },
        };
        let enhanced = EnhancedNotification::from_base(notification.clone());
        self.gate.check(&enhanced, profile, context, Utc::now().hour())
    }

    /// Run personalization rules. A missing profile leaves the notification
    /// untouched rather than failing the caller.
    pub async fn personalize_notification(
        &self,
        notification: Notification,
        profile: Option<&UserProfile>,
    ) -> EnhancedNotification {
        let resolved: UserProfile;
        let profile = match profile {
            Some(p) => p,
            None => match self.profiles.get(&notification.user_id).await {
                Ok(p) => {
                    resolved = p;
                    &resolved
                }
                Err(e) => {
                    tracing::debug!("Personalization skipped, no profile: {}", e);
                    return EnhancedNotification::from_base(notification);
                }
            },
        };
        self.engine.personalize(notification, profile)
    }

    /// Predicted engagement. Falls back to a fresh default profile.
    pub async fn predict_notification_performance(
        &self,
        notification: &Notification,
        profile: Option<&UserProfile>,
        context: &UserContext,
    ) -> EngagementPrediction {
        let resolved = match profile {
            Some(p) => p.clone(),
            None => self
                .profiles
                .get(&notification.user_id)
                .await
                .unwrap_or_else(|_| UserProfile::fresh(&notification.user_id)),
        };
        self.scorer.predict(notification, &resolved, context)
    }

    /// Full pipeline: personalize → gate → predict, then hand off to a
    /// background delivery task. Returns as soon as the notification is
    /// admitted or suppressed; deferral and retry pacing never block the
    /// producer.
    pub async fn process_notification(
        &self,
        notification: Notification,
        context: UserContext,
    ) -> ProcessOutcome {
        if let Err(e) = self.notifications.insert(&notification).await {
            tracing::warn!("Could not persist notification {}: {}", notification.id, e);
        }

        let profile = match self.profiles.get(&notification.user_id).await {
            Ok(p) => p,
            Err(e) => {
                tracing::info!("Skipping {}: {}", notification.id, e);
                return ProcessOutcome::Skipped {
                    reason: Some(format!("No behavior profile for user {}", notification.user_id)),
                };
            }
        };

        let mut enhanced = self.engine.personalize(notification, &profile);
        enhanced.context = context.clone();
        if !enhanced.base.channels.any_enabled() {
            return ProcessOutcome::Skipped {
                reason: Some("Suppressed by personalization rules".to_string()),
            };
        }

        let decision = self.gate.check(&enhanced, &profile, &context, Utc::now().hour());
        if !decision.should_send {
            return ProcessOutcome::Skipped { reason: decision.reason };
        }

        let prediction = self.scorer.predict(&enhanced.base, &profile, &context);
        if enhanced.strategy.is_none() {
            enhanced.strategy = Some(self.default_strategy(&enhanced, &prediction));
        }
        enhanced.prediction = Some(prediction);

        let id = enhanced.base.id;
        let orchestrator = self.orchestrator.clone();
        let deliveries = self.deliveries.clone();
        let handle = tokio::spawn(async move {
            if let Some(at) = enhanced.scheduled_at {
                let now = Utc::now();
                if at > now {
                    let wait = (at - now).to_std().unwrap_or_default();
                    tracing::debug!("Deferring {} for {:?}", id, wait);
                    tokio::time::sleep(wait).await;
                }
            }
            let outcome = orchestrator.deliver(&enhanced).await;
            if outcome.status != AttemptStatus::Delivered {
                tracing::warn!(
                    "Delivery of {} ended {:?} after {} attempts",
                    id,
                    outcome.status,
                    outcome.attempts.len()
                );
            }
            deliveries.lock().await.remove(&id);
        });

        let mut deliveries = self.deliveries.lock().await;
        deliveries.retain(|_, h| !h.is_finished());
        deliveries.insert(id, handle);
        ProcessOutcome::Accepted { notification_id: id }
    }

    /// Wait for a delivery task to reach terminal status. A no-op when the
    /// task already completed or was never admitted.
    pub async fn await_delivery(&self, notification_id: Uuid) {
        let handle = self.deliveries.lock().await.remove(&notification_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::warn!("Delivery task for {} panicked: {}", notification_id, e);
                }
            }
        }
    }

    /// Abort an in-flight delivery, including a pending deferral or retry
    /// timer. Returns whether a task was actually cancelled.
    pub async fn cancel_delivery(&self, notification_id: Uuid) -> bool {
        match self.deliveries.lock().await.remove(&notification_id) {
            Some(handle) => {
                handle.abort();
                tracing::info!("Cancelled delivery of {}", notification_id);
                true
            }
            None => false,
        }
    }

    /// Primary channel from the prediction ranking, constrained to what
    /// personalization left enabled.
    fn default_strategy(
        &self,
        enhanced: &EnhancedNotification,
        prediction: &EngagementPrediction,
    ) -> DeliveryStrategy {
        let primary = prediction
            .recommended_channels
            .iter()
            .copied()
            .find(|c| enhanced.base.channels.is_enabled(*c))
            .or_else(|| enhanced.base.channels.enabled().next())
            .unwrap_or(Channel::InApp);
        let fallbacks: Vec<Channel> =
            enhanced.base.channels.enabled().filter(|c| *c != primary).collect();

        DeliveryStrategy {
            primary,
            fallbacks,
            max_attempts: self.config.delivery.max_attempts,
            retry_delay_secs: self.config.delivery.retry_delay_secs,
            escalations: Vec::new(),
        }
    }

    // ========================================================================
    // Feedback path
    // ========================================================================

    /// Record a lifecycle event. Critical kinds persist before returning;
    /// an open also cancels pending escalations and marks the record read.
    pub async fn track_notification_event(
        &self,
        notification_id: Uuid,
        kind: EventKind,
        metadata: serde_json::Value,
        user_id: &str,
    ) {
        if kind == EventKind::Opened {
            self.orchestrator.notify_opened(notification_id).await;
            match self.notifications.get(notification_id).await {
                Ok(Some(mut n)) => {
                    n.read = true;
                    if let Err(e) = self.notifications.update(&n).await {
                        tracing::warn!("Could not mark {} read: {}", notification_id, e);
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Read-state update failed: {}", e),
            }
        }

        let event = NotificationEvent::new(notification_id, user_id, kind)
            .with_metadata(metadata);
        self.tracker.track(event).await;
    }

    /// Drop the cached profile after a preference write.
    pub async fn invalidate_profile(&self, user_id: &str) {
        self.profiles.invalidate(user_id).await;
    }

    // ========================================================================
    // Social composition
    // ========================================================================

    /// Buffer a like for grouping. The grouped notification is emitted by
    /// `drain_like_groups` once the batch's window closes.
    pub async fn record_like(&self, owner_id: &str, content_id: &str, liker_id: &str) {
        self.likes.record(owner_id, content_id, liker_id).await;
    }

    /// Run every due like batch through the pipeline. The platform's
    /// scheduler calls this on the grouping cadence.
    pub async fn drain_like_groups(&self, context: &UserContext) -> Vec<ProcessOutcome> {
        let due = self.likes.drain_due(Utc::now()).await;
        let mut outcomes = Vec::with_capacity(due.len());
        for notification in due {
            outcomes.push(self.process_notification(notification, context.clone()).await);
        }
        outcomes
    }

    /// Report a follower-count transition. A newly crossed milestone enters
    /// the pipeline immediately; each threshold fires at most once.
    pub async fn record_follower_count(
        &self,
        user_id: &str,
        previous: u64,
        current: u64,
        context: &UserContext,
    ) -> Option<ProcessOutcome> {
        let notification = self.milestones.check_followers(user_id, previous, current).await?;
        Some(self.process_notification(notification, context.clone()).await)
    }

    // ========================================================================
    // Rule management
    // ========================================================================

    pub async fn upsert_rule(&self, rule: PersonalizationRule) -> Result<(), PulseError> {
        self.rules.upsert(rule).await
    }

    pub async fn delete_rule(&self, rule_id: i64) -> Result<(), PulseError> {
        self.rules.delete(rule_id).await
    }

    // ========================================================================
    // Analytics surface
    // ========================================================================

    pub async fn advanced_analytics(&self, user_id: &str, period: Period) -> AnalyticsReport {
        self.aggregator.report(user_id, period).await
    }

    pub async fn performance_insights(&self, user_id: &str) -> PerformanceInsights {
        let report = self.aggregator.report(user_id, Period::Month).await;
        match self.insights.build(user_id, &report).await {
            Ok(insights) => insights,
            Err(e) => {
                tracing::warn!("Insights degraded for {}: {}", user_id, e);
                PerformanceInsights {
                    trends: Vec::new(),
                    recommendations: pulse_analytics::recommendations(&report),
                    comparisons: Vec::new(),
                    top_content: Vec::new(),
                }
            }
        }
    }

    pub async fn export_analytics(
        &self,
        user_id: &str,
        period: Period,
        format: ExportFormat,
    ) -> Result<String, PulseError> {
        let report = self.aggregator.report(user_id, period).await;
        export(&report, format)
    }

    /// Flush pending events once, outside the periodic schedule.
    pub async fn flush_events(&self) -> usize {
        self.tracker.flush().await
    }
}

impl Drop for NotificationService {
    fn drop(&mut self) {
        self.flush_task.abort();
        self.purge_task.abort();
        if let Ok(mut deliveries) = self.deliveries.try_lock() {
            for (_, handle) in deliveries.drain() {
                handle.abort();
            }
        }
    }
}
