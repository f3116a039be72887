//! Notification data model
//!
//! A `Notification` is created once and passed immutably through each
//! pipeline stage; stages consume it by value and yield a new value
//! (personalization wraps it into an `EnhancedNotification`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::delivery::DeliveryStrategy;

/// A delivery surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    InApp,
    Push,
    Email,
    Sms,
    Webhook,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::InApp,
        Channel::Push,
        Channel::Email,
        Channel::Sms,
        Channel::Webhook,
    ];
}

/// The closed set of notification types the platform emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    FriendRequest,
    Mention,
    Tag,
    Share,
    System,
    Achievement,
    Milestone,
}

/// Delivery priority. `Urgent` bypasses quiet hours and background checks.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// The set of channels a notification is currently enabled for.
///
/// Personalization and the delivery gate only ever narrow this set;
/// an empty set means the notification is suppressed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSet(BTreeSet<Channel>);

impl ChannelSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn of(channels: &[Channel]) -> Self {
        Self(channels.iter().copied().collect())
    }

    pub fn enable(&mut self, channel: Channel) {
        self.0.insert(channel);
    }

    pub fn disable(&mut self, channel: Channel) {
        self.0.remove(&channel);
    }

    pub fn is_enabled(&self, channel: Channel) -> bool {
        self.0.contains(&channel)
    }

    pub fn any_enabled(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn enabled(&self) -> impl Iterator<Item = Channel> + '_ {
        self.0.iter().copied()
    }

    /// Keep only channels present in `other` (personalization narrowing).
    pub fn intersect(&mut self, other: &[Channel]) {
        self.0.retain(|c| other.contains(c));
    }

    /// Disable every channel. Used by the `Skip` rule action.
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// An outbound notification as produced by the platform's event sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    /// Recipient.
    pub user_id: String,
    /// Originating actor, if any (liker, commenter, follower...).
    pub sender_id: Option<String>,
    pub kind: NotificationKind,
    pub content: String,
    /// Call-to-action target, when the notification links somewhere.
    pub action_url: Option<String>,
    pub channels: ChannelSet,
    pub priority: Priority,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: impl Into<String>, kind: NotificationKind, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            sender_id: None,
            kind,
            content: content.into(),
            action_url: None,
            channels: ChannelSet::of(&[Channel::InApp, Channel::Push]),
            priority: Priority::Normal,
            read: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_channels(mut self, channels: &[Channel]) -> Self {
        self.channels = ChannelSet::of(channels);
        self
    }
}

/// Whether the recipient's app is currently foregrounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    Foreground,
    #[default]
    Background,
}

/// Device class the recipient was last seen on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    #[default]
    Mobile,
    Desktop,
    Web,
}

impl DeviceKind {
    /// Channels this device class can actually receive.
    pub fn supports(&self, channel: Channel) -> bool {
        match (self, channel) {
            (DeviceKind::Desktop, Channel::Sms) => false,
            (DeviceKind::Web, Channel::Sms) => false,
            (DeviceKind::Web, Channel::Push) => false,
            _ => true,
        }
    }
}

/// Snapshot of the recipient's context at decision time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContext {
    pub app_state: AppState,
    pub device: DeviceKind,
    pub captured_at: Option<DateTime<Utc>>,
}

/// Predicted engagement for a notification, produced by the scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementPrediction {
    /// All rates and confidence are percentages in [0, 100].
    pub open_rate: f32,
    pub click_rate: f32,
    pub conversion_rate: f32,
    pub confidence: f32,
    pub recommended_channels: Vec<Channel>,
    /// Hour of day (0..24) the scorer recommends sending at.
    pub recommended_hour: u32,
}

/// A notification after the personalization stage: content/schedule/channel
/// decisions layered over the base record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedNotification {
    pub base: Notification,
    /// Content override produced by a `ModifyContent` rule action.
    pub personalized_content: Option<String>,
    /// When a `ModifySchedule` action deferred delivery.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub target_segments: Vec<String>,
    pub context: UserContext,
    pub experiment_id: Option<Uuid>,
    pub variant: Option<String>,
    pub prediction: Option<EngagementPrediction>,
    pub strategy: Option<DeliveryStrategy>,
    pub fallback_channels: Vec<Channel>,
}

impl EnhancedNotification {
    pub fn from_base(base: Notification) -> Self {
        Self {
            base,
            personalized_content: None,
            scheduled_at: None,
            target_segments: Vec::new(),
            context: UserContext::default(),
            experiment_id: None,
            variant: None,
            prediction: None,
            strategy: None,
            fallback_channels: Vec::new(),
        }
    }

    /// The content that will actually be rendered.
    pub fn effective_content(&self) -> &str {
        self.personalized_content.as_deref().unwrap_or(&self.base.content)
    }
}
