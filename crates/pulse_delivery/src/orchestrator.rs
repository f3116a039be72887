//! Delivery orchestrator
//!
//! Drives the per-attempt state machine Pending → Sent → {Delivered,
//! Failed, Bounced}. Failed or bounced attempts roll to the next fallback
//! channel after the strategy's retry delay; exhausting the budget (or an
//! `Abandon` escalation) ends in a terminal failed status that is never
//! surfaced to the notification producer.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use pulse_core::{
    AttemptStatus, Channel, ChannelSender, DeliveryAttempt, DeliveryStrategy, EnhancedNotification,
    EscalationAction, EscalationRule, EscalationTrigger, EventKind, NotificationEvent,
    NotificationStore, SendOutcome,
};

/// Where the orchestrator reports lifecycle events. The analytics tracker
/// implements this at wiring time.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, event: NotificationEvent);
}

/// Final result of a delivery run.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub notification_id: Uuid,
    pub status: AttemptStatus,
    pub attempts: Vec<DeliveryAttempt>,
}

pub struct DeliveryOrchestrator {
    sender: Arc<dyn ChannelSender>,
    store: Arc<dyn NotificationStore>,
    sink: Arc<dyn EventSink>,
    /// One escalation watcher per notification. An entry is removed when
    /// the watcher fires its last escalation or the recipient opens.
    watchers: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

impl DeliveryOrchestrator {
    pub fn new(
        sender: Arc<dyn ChannelSender>,
        store: Arc<dyn NotificationStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self { sender, store, sink, watchers: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Execute the notification's delivery strategy to a terminal status.
    pub async fn deliver(&self, notification: &EnhancedNotification) -> DeliveryOutcome {
        let strategy = notification.strategy.clone().unwrap_or_else(|| {
            fallback_strategy(notification)
        });
        let id = notification.base.id;
        let mut attempts = Vec::new();
        let mut failed_so_far = 0u32;

        for attempt_number in 1..=strategy.max_attempts.max(1) {
            let channel = strategy.channel_for_attempt(attempt_number);
            let mut attempt = DeliveryAttempt::new(id, channel, attempt_number);

            attempt.status = AttemptStatus::Sent;
            self.record(id, &notification.base.user_id, EventKind::Sent, channel).await;

            let outcome = match self.sender.send(channel, notification).await {
                Ok(outcome) => outcome,
                Err(e) => SendOutcome::Failed(e.to_string()),
            };

            match outcome {
                SendOutcome::Delivered => {
                    attempt.status = AttemptStatus::Delivered;
                    attempt.completed_at = Some(Utc::now());
                    self.record(id, &notification.base.user_id, EventKind::Delivered, channel)
                        .await;
                    attempts.push(attempt);
                    self.arm_escalations(notification, &strategy).await;
                    return DeliveryOutcome { notification_id: id, status: AttemptStatus::Delivered, attempts };
                }
                SendOutcome::Failed(detail) => {
                    tracing::warn!("Attempt {} on {:?} failed: {}", attempt_number, channel, detail);
                    attempt.status = AttemptStatus::Failed;
                    attempt.error = Some(detail);
                    self.record(id, &notification.base.user_id, EventKind::Failed, channel).await;
                }
                SendOutcome::Bounced(detail) => {
                    tracing::warn!("Attempt {} on {:?} bounced: {}", attempt_number, channel, detail);
                    attempt.status = AttemptStatus::Bounced;
                    attempt.error = Some(detail);
                    self.record(id, &notification.base.user_id, EventKind::Bounced, channel).await;
                }
            }
            attempt.completed_at = Some(Utc::now());
            attempts.push(attempt);
            failed_so_far += 1;

            if abandon_requested(&strategy.escalations, failed_so_far) {
                tracing::info!("Escalation policy abandoned delivery of {}", id);
                break;
            }
            if attempt_number < strategy.max_attempts {
                tokio::time::sleep(jittered(strategy.retry_delay())).await;
            }
        }

        DeliveryOutcome { notification_id: id, status: AttemptStatus::Failed, attempts }
    }

    /// Mark the notification opened: cancels any pending escalation timer.
    pub async fn notify_opened(&self, notification_id: Uuid) {
        if let Some(handle) = self.watchers.lock().await.remove(&notification_id) {
            handle.abort();
            tracing::debug!("Cancelled escalation watcher for {}", notification_id);
        }
    }

    /// Number of notifications with an armed escalation watcher.
    pub async fn pending_escalations(&self) -> usize {
        self.watchers.lock().await.len()
    }

    /// Arm `NotOpenedAfter` escalation timers after a successful delivery.
    /// All timers for one notification run on a single watcher task that
    /// unregisters itself after the last escalation fires.
    async fn arm_escalations(
        &self,
        notification: &EnhancedNotification,
        strategy: &DeliveryStrategy,
    ) {
        let mut timed: Vec<(u64, EscalationAction)> = strategy
            .escalations
            .iter()
            .filter_map(|rule| match rule.trigger {
                EscalationTrigger::NotOpenedAfter { after_secs } => {
                    Some((after_secs, rule.action.clone()))
                }
                _ => None,
            })
            .collect();
        if timed.is_empty() {
            return;
        }
        timed.sort_by_key(|(after_secs, _)| *after_secs);

        let id = notification.base.id;
        let sender = self.sender.clone();
        let store = self.store.clone();
        let sink = self.sink.clone();
        let notification = notification.clone();
        let watchers = self.watchers.clone();

        let handle = tokio::spawn(async move {
            let mut elapsed = 0u64;
            for (after_secs, action) in timed {
                tokio::time::sleep(Duration::from_secs(after_secs - elapsed)).await;
                elapsed = after_secs;
                run_escalation(
                    action,
                    notification.clone(),
                    sender.clone(),
                    store.clone(),
                    sink.clone(),
                )
                .await;
            }
            watchers.lock().await.remove(&id);
        });

        let mut watchers = self.watchers.lock().await;
        watchers.retain(|_, h| !h.is_finished());
        watchers.insert(id, handle);
    }

    async fn record(&self, id: Uuid, user_id: &str, kind: EventKind, channel: Channel) {
        self.sink.record(NotificationEvent::new(id, user_id, kind).on_channel(channel)).await;
    }
}

/// Strategy when personalization supplied none: primary is the first
/// enabled channel, fallbacks come from the profile's preferred list.
fn fallback_strategy(notification: &EnhancedNotification) -> DeliveryStrategy {
    let primary =
        notification.base.channels.enabled().next().unwrap_or(Channel::InApp);
    let fallbacks: Vec<Channel> = notification
        .fallback_channels
        .iter()
        .copied()
        .filter(|c| *c != primary)
        .collect();
    let max_attempts = 1 + fallbacks.len() as u32;
    DeliveryStrategy { primary, fallbacks, max_attempts, retry_delay_secs: 60, escalations: Vec::new() }
}

fn abandon_requested(escalations: &[EscalationRule], failed_count: u32) -> bool {
    escalations.iter().any(|rule| {
        matches!(rule.trigger, EscalationTrigger::AttemptsFailed { count } if failed_count >= count)
            && rule.action == EscalationAction::Abandon
    })
}

/// Re-send once on the escalation channel if the notification is still unread.
async fn run_escalation(
    action: EscalationAction,
    notification: EnhancedNotification,
    sender: Arc<dyn ChannelSender>,
    store: Arc<dyn NotificationStore>,
    sink: Arc<dyn EventSink>,
) {
    let id = notification.base.id;
    match store.get(id).await {
        Ok(Some(current)) if current.read => return,
        Err(e) => {
            tracing::warn!("Escalation read-check for {} failed: {}", id, e);
            return;
        }
        _ => {}
    }

    let channel = match action {
        EscalationAction::Retry { channel, delay_secs } => {
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            channel.unwrap_or(notification.base.channels.enabled().next().unwrap_or(Channel::Push))
        }
        EscalationAction::Escalate { channel } => channel,
        EscalationAction::Abandon => return,
    };

    tracing::info!("Escalating unopened {} to {:?}", id, channel);
    let user_id = notification.base.user_id.clone();
    match sender.send(channel, &notification).await {
        Ok(SendOutcome::Delivered) => {
            sink.record(
                NotificationEvent::new(id, user_id, EventKind::Delivered).on_channel(channel),
            )
            .await;
        }
        Ok(SendOutcome::Failed(_)) | Ok(SendOutcome::Bounced(_)) | Err(_) => {
            sink.record(NotificationEvent::new(id, user_id, EventKind::Failed).on_channel(channel))
                .await;
        }
    }
}

/// Retry delay with up to 10% random jitter.
fn jittered(delay: Duration) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    let factor: f64 = rand::thread_rng().gen_range(0.0..0.1);
    delay + delay.mul_f64(factor)
}
