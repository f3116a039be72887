//! End-to-end pipeline tests against in-memory stores and a stub sender.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use pulse_core::{
    AppState, Channel, ChannelSender, EnhancedNotification, EventKind, MemoryEventStore,
    MemoryNotificationStore, MemoryPreferenceStore, Notification, NotificationKind,
    NotificationPreferences, NotificationStore, Priority, PulseConfig, PulseError, SendOutcome,
    UserContext,
};
use pulse_rules::{MemoryRuleStore, PersonalizationRule, RuleAction, RuleCondition};
use pulse_service::{NotificationService, ProcessOutcome};

/// Sender that records every attempted channel. Fails the first
/// `fail_first` sends, then delivers.
struct StubSender {
    fail_first: u32,
    calls: AtomicU32,
    sent: Mutex<Vec<Channel>>,
}

impl StubSender {
    fn new() -> Arc<Self> {
        Self::flaky(0)
    }

    fn flaky(fail_first: u32) -> Arc<Self> {
        Arc::new(Self { fail_first, calls: AtomicU32::new(0), sent: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl ChannelSender for StubSender {
    async fn send(
        &self,
        channel: Channel,
        _notification: &EnhancedNotification,
    ) -> Result<SendOutcome, PulseError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().await.push(channel);
        if n < self.fail_first {
            Ok(SendOutcome::Failed("gateway timeout".into()))
        } else {
            Ok(SendOutcome::Delivered)
        }
    }
}

struct Fixture {
    service: NotificationService,
    sender: Arc<StubSender>,
    notifications: Arc<MemoryNotificationStore>,
    events: Arc<MemoryEventStore>,
    prefs: Arc<MemoryPreferenceStore>,
}

async fn fixture() -> Fixture {
    fixture_with(StubSender::new()).await
}

async fn fixture_with(sender: Arc<StubSender>) -> Fixture {
    let notifications = Arc::new(MemoryNotificationStore::new());
    let events = Arc::new(MemoryEventStore::new());
    let prefs = Arc::new(MemoryPreferenceStore::new());
    let rules = Arc::new(MemoryRuleStore::new());
    prefs.set_preferences("u1", NotificationPreferences::default()).await;

    let mut config = PulseConfig::default();
    config.grouping.like_window_secs = 0;

    let service = NotificationService::new(
        config,
        notifications.clone(),
        events.clone(),
        prefs.clone(),
        rules,
        sender.clone(),
    )
    .await
    .unwrap();

    Fixture { service, sender, notifications, events, prefs }
}

fn foreground() -> UserContext {
    UserContext { app_state: AppState::Foreground, ..Default::default() }
}

fn urgent(user: &str) -> Notification {
    Notification::new(user, NotificationKind::System, "maintenance tonight")
        .with_priority(Priority::Urgent)
}

// ============================================================================
// Full pipeline
// ============================================================================

#[tokio::test]
async fn urgent_notification_flows_to_delivery() {
    let fx = fixture().await;

    let n = urgent("u1");
    let id = n.id;
    let outcome = fx.service.process_notification(n, foreground()).await;
    assert!(matches!(outcome, ProcessOutcome::Accepted { notification_id } if notification_id == id));

    fx.service.await_delivery(id).await;
    assert_eq!(fx.sender.sent.lock().await.len(), 1);

    // The delivered event persisted synchronously; the sent event is queued.
    fx.service.flush_events().await;
    let kinds: Vec<EventKind> =
        fx.events.all().await.iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::Sent));
    assert!(kinds.contains(&EventKind::Delivered));
}

#[tokio::test]
async fn global_disable_skips_with_reason() {
    let fx = fixture().await;
    fx.prefs
        .set_preferences(
            "u1",
            NotificationPreferences { enabled: false, ..Default::default() },
        )
        .await;

    let outcome = fx.service.process_notification(urgent("u1"), foreground()).await;
    match outcome {
        ProcessOutcome::Skipped { reason } => {
            assert_eq!(reason.as_deref(), Some("Notifications disabled by user"));
        }
        other => panic!("expected skip, got {other:?}"),
    }
    assert!(fx.sender.sent.lock().await.is_empty());
}

#[tokio::test]
async fn unknown_user_is_denied_not_errored() {
    let fx = fixture().await;

    let n = urgent("ghost");
    let decision = fx.service.should_send_notification(&n, None, &foreground()).await;
    assert!(!decision.should_send);
    assert!(decision.reason.unwrap().contains("No behavior profile"));

    let outcome = fx.service.process_notification(n, foreground()).await;
    assert!(matches!(outcome, ProcessOutcome::Skipped { .. }));
}

// ============================================================================
// Delivery pacing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn admission_is_not_blocked_by_retry_pacing() {
    let fx = fixture_with(StubSender::flaky(1)).await;

    let n = urgent("u1");
    let id = n.id;
    let before = tokio::time::Instant::now();
    let outcome = fx.service.process_notification(n, foreground()).await;
    assert!(matches!(outcome, ProcessOutcome::Accepted { .. }));
    // Admission consumed none of the retry delay.
    assert_eq!(tokio::time::Instant::now(), before);

    fx.service.await_delivery(id).await;
    assert_eq!(fx.sender.calls.load(Ordering::SeqCst), 2);
}

fn defer_rule(id: i64, kind: NotificationKind) -> PersonalizationRule {
    PersonalizationRule {
        id,
        name: "send at an optimal hour".to_string(),
        kind,
        condition: RuleCondition::Always,
        actions: vec![RuleAction::ModifySchedule],
        priority: 5,
        active: true,
    }
}

#[tokio::test(start_paused = true)]
async fn scheduled_delivery_defers_off_the_caller() {
    let fx = fixture().await;
    fx.service.upsert_rule(defer_rule(7, NotificationKind::Like)).await.unwrap();

    let n = Notification::new("u1", NotificationKind::Like, "like")
        .with_priority(Priority::Urgent);
    let id = n.id;
    let before = tokio::time::Instant::now();
    let outcome = fx.service.process_notification(n, foreground()).await;
    assert!(matches!(outcome, ProcessOutcome::Accepted { .. }));
    assert_eq!(tokio::time::Instant::now(), before);
    assert!(fx.sender.sent.lock().await.is_empty());

    fx.service.await_delivery(id).await;
    assert_eq!(fx.sender.sent.lock().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_delivery_never_sends() {
    let fx = fixture().await;
    fx.service.upsert_rule(defer_rule(8, NotificationKind::Like)).await.unwrap();

    let n = Notification::new("u1", NotificationKind::Like, "like")
        .with_priority(Priority::Urgent);
    let id = n.id;
    let outcome = fx.service.process_notification(n, foreground()).await;
    assert!(matches!(outcome, ProcessOutcome::Accepted { .. }));

    assert!(fx.service.cancel_delivery(id).await);
    tokio::time::sleep(std::time::Duration::from_secs(60 * 60 * 48)).await;
    assert!(fx.sender.sent.lock().await.is_empty());
    // Cancelling again reports nothing in flight.
    assert!(!fx.service.cancel_delivery(id).await);
}

// ============================================================================
// Personalization interplay
// ============================================================================

fn skip_rule(id: i64) -> PersonalizationRule {
    PersonalizationRule {
        id,
        name: "suppress all likes".to_string(),
        kind: NotificationKind::Like,
        condition: RuleCondition::Always,
        actions: vec![RuleAction::Skip { when: None }],
        priority: 10,
        active: true,
    }
}

#[tokio::test]
async fn skip_rule_suppresses_before_the_gate() {
    let fx = fixture().await;
    fx.service.upsert_rule(skip_rule(1)).await.unwrap();

    let n = Notification::new("u1", NotificationKind::Like, "someone liked your post")
        .with_priority(Priority::Urgent);
    let outcome = fx.service.process_notification(n, foreground()).await;
    match outcome {
        ProcessOutcome::Skipped { reason } => {
            assert_eq!(reason.as_deref(), Some("Suppressed by personalization rules"));
        }
        other => panic!("expected skip, got {other:?}"),
    }
    assert!(fx.sender.sent.lock().await.is_empty());
}

#[tokio::test]
async fn channel_narrowing_constrains_delivery() {
    let fx = fixture().await;
    fx.service
        .upsert_rule(PersonalizationRule {
            id: 2,
            name: "push only for mentions".to_string(),
            kind: NotificationKind::Mention,
            condition: RuleCondition::Always,
            actions: vec![RuleAction::ModifyChannels { channels: vec![Channel::Push] }],
            priority: 10,
            active: true,
        })
        .await
        .unwrap();

    let n = Notification::new("u1", NotificationKind::Mention, "@u1 check this")
        .with_priority(Priority::Urgent);
    let id = n.id;
    let outcome = fx.service.process_notification(n, foreground()).await;
    assert!(matches!(outcome, ProcessOutcome::Accepted { .. }));
    fx.service.await_delivery(id).await;

    // Later stages never widen what personalization narrowed.
    let sent = fx.sender.sent.lock().await;
    assert_eq!(*sent, vec![Channel::Push]);
}

#[tokio::test]
async fn deleted_rule_stops_applying() {
    let fx = fixture().await;
    fx.service.upsert_rule(skip_rule(3)).await.unwrap();

    let n = Notification::new("u1", NotificationKind::Like, "like")
        .with_priority(Priority::Urgent);
    let outcome = fx.service.process_notification(n.clone(), foreground()).await;
    assert!(matches!(outcome, ProcessOutcome::Skipped { .. }));

    fx.service.delete_rule(3).await.unwrap();
    let again = Notification::new("u1", NotificationKind::Like, "like")
        .with_priority(Priority::Urgent);
    let id = again.id;
    let outcome = fx.service.process_notification(again, foreground()).await;
    assert!(matches!(outcome, ProcessOutcome::Accepted { .. }));
    fx.service.await_delivery(id).await;
    assert_eq!(fx.sender.sent.lock().await.len(), 1);
}

// ============================================================================
// Social composition
// ============================================================================

#[tokio::test]
async fn grouped_likes_flow_through_the_pipeline() {
    let fx = fixture().await;

    fx.service.record_like("u1", "post-1", "alice").await;
    fx.service.record_like("u1", "post-1", "bob").await;
    fx.service.record_like("u1", "post-1", "carol").await;

    let outcomes = fx.service.drain_like_groups(&foreground()).await;
    assert_eq!(outcomes.len(), 1);

    // The grouped notification was admitted into the pipeline and persisted.
    let since = chrono::Utc::now() - chrono::Duration::days(1);
    let stored = fx.notifications.for_user_since("u1", since).await.unwrap();
    let grouped = stored
        .iter()
        .find(|n| n.kind == NotificationKind::Like)
        .expect("grouped like notification stored");
    assert!(grouped.content.contains("and"));

    // Nothing left to drain.
    assert!(fx.service.drain_like_groups(&foreground()).await.is_empty());
}

#[tokio::test]
async fn follower_milestone_enters_pipeline_once() {
    let fx = fixture().await;

    let first = fx.service.record_follower_count("u1", 99, 100, &foreground()).await;
    assert!(first.is_some());

    let since = chrono::Utc::now() - chrono::Duration::days(1);
    let stored = fx.notifications.for_user_since("u1", since).await.unwrap();
    assert!(stored.iter().any(|n| n.kind == NotificationKind::Milestone));

    // The same threshold never fires twice.
    assert!(fx.service.record_follower_count("u1", 99, 100, &foreground()).await.is_none());
}

// ============================================================================
// Feedback path
// ============================================================================

#[tokio::test]
async fn opened_event_marks_the_notification_read() {
    let fx = fixture().await;

    let n = urgent("u1");
    let id = n.id;
    let outcome = fx.service.process_notification(n, foreground()).await;
    assert!(matches!(outcome, ProcessOutcome::Accepted { .. }));
    fx.service.await_delivery(id).await;

    fx.service
        .track_notification_event(id, EventKind::Opened, serde_json::json!({}), "u1")
        .await;
    fx.service.flush_events().await;

    let events = fx.events.all().await;
    assert!(events.iter().any(|e| e.kind == EventKind::Opened && e.notification_id == id));

    let stored = fx.notifications.get(id).await.unwrap().unwrap();
    assert!(stored.read);
}
