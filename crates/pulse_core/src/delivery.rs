//! Delivery strategy and attempt tracking types
//!
//! Escalation triggers are structured predicates evaluated against attempt
//! timestamps and read status, not parsed condition strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::notification::Channel;

/// Per-attempt delivery state machine:
/// Pending → Sent → { Delivered | Failed | Bounced }.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Bounced,
}

impl AttemptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptStatus::Delivered | AttemptStatus::Failed | AttemptStatus::Bounced)
    }
}

/// One delivery try on one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub notification_id: Uuid,
    pub channel: Channel,
    pub status: AttemptStatus,
    /// Strictly increasing per notification, starting at 1.
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl DeliveryAttempt {
    pub fn new(notification_id: Uuid, channel: Channel, attempt_number: u32) -> Self {
        Self {
            notification_id,
            channel,
            status: AttemptStatus::Pending,
            attempt_number,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }
}

/// When to escalate a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscalationTrigger {
    /// The notification was sent but not opened within the window.
    NotOpenedAfter { after_secs: u64 },
    /// N attempts have failed or bounced.
    AttemptsFailed { count: u32 },
}

/// What to do when an escalation trigger fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscalationAction {
    /// Retry on the same or a named channel after a delay.
    Retry { channel: Option<Channel>, delay_secs: u64 },
    /// Switch to a stronger channel immediately.
    Escalate { channel: Channel },
    /// Stop trying; the notification goes terminal-failed.
    Abandon,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub trigger: EscalationTrigger,
    pub action: EscalationAction,
}

/// How a notification should be pushed out: primary channel, ordered
/// fallbacks, retry budget, and escalation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStrategy {
    pub primary: Channel,
    pub fallbacks: Vec<Channel>,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub escalations: Vec<EscalationRule>,
}

impl DeliveryStrategy {
    pub fn direct(primary: Channel) -> Self {
        Self {
            primary,
            fallbacks: Vec::new(),
            max_attempts: 1,
            retry_delay_secs: 60,
            escalations: Vec::new(),
        }
    }

    pub fn with_fallbacks(primary: Channel, fallbacks: Vec<Channel>, max_attempts: u32) -> Self {
        Self { primary, fallbacks, max_attempts, retry_delay_secs: 60, escalations: Vec::new() }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Channel for the Nth attempt (1-based): primary first, then fallbacks,
    /// sticking to the last fallback once the list is exhausted.
    pub fn channel_for_attempt(&self, attempt_number: u32) -> Channel {
        if attempt_number <= 1 {
            return self.primary;
        }
        let idx = (attempt_number - 2) as usize;
        self.fallbacks
            .get(idx)
            .or_else(|| self.fallbacks.last())
            .copied()
            .unwrap_or(self.primary)
    }
}

/// Result of one opaque channel send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Transient failure; retryable.
    Failed(String),
    /// The channel endpoint rejected the recipient (bad token, dead address).
    Bounced(String),
}
