//! User profile and behavior summary
//!
//! `UserProfile` combines stored preferences with a `UserBehavior` summary
//! derived from the last 30 days of notification and event history. Profiles
//! are computed lazily and cached with a TTL; writes to preferences must
//! invalidate the cached entry before the next read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::notification::{Channel, NotificationKind};

/// Quiet-hours window on a 24h clock. May wrap midnight (e.g. 22..8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl QuietHours {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            // Wraps midnight: e.g. 22..8
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Per-kind delivery preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindPreference {
    pub enabled: bool,
    pub channels: Vec<Channel>,
}

impl Default for KindPreference {
    fn default() -> Self {
        Self { enabled: true, channels: vec![Channel::InApp, Channel::Push] }
    }
}

/// A user's stored notification preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreferences {
    /// Global kill switch. Off ⇒ nothing is sent, ever.
    pub enabled: bool,
    pub quiet_hours: Option<QuietHours>,
    pub kinds: HashMap<NotificationKind, KindPreference>,
    /// Senders whose notifications are always suppressed.
    pub muted_users: Vec<String>,
    /// Senders whose notifications bypass behavioral filtering.
    pub priority_users: Vec<String>,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            quiet_hours: None,
            kinds: HashMap::new(),
            muted_users: Vec::new(),
            priority_users: Vec::new(),
        }
    }
}

impl NotificationPreferences {
    pub fn kind_enabled(&self, kind: NotificationKind) -> bool {
        self.kinds.get(&kind).map(|p| p.enabled).unwrap_or(true)
    }

    pub fn is_muted(&self, sender_id: &str) -> bool {
        self.muted_users.iter().any(|u| u == sender_id)
    }

    pub fn is_priority(&self, sender_id: &str) -> bool {
        self.priority_users.iter().any(|u| u == sender_id)
    }
}

/// Coarse activity bucket derived from 30-day volume and engagement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// Per-channel open/click/dismiss rates, percentages in [0, 100].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResponsePattern {
    pub open_rate: f32,
    pub click_rate: f32,
    pub dismiss_rate: f32,
}

/// Statistical summary of a user's historical notification engagement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBehavior {
    /// opened / sent × 100, in [0, 100].
    pub engagement_rate: f32,
    /// Channels ranked by open rate, best first. Never empty.
    pub preferred_channels: Vec<Channel>,
    /// Top hour buckets (0..24) ranked by weighted view/click score, best first.
    pub optimal_hours: Vec<u32>,
    pub response_patterns: HashMap<Channel, ResponsePattern>,
    /// Per-kind open rate, percentages in [0, 100].
    pub kind_response_rates: HashMap<NotificationKind, f32>,
    pub activity: ActivityLevel,
    pub last_active: Option<DateTime<Utc>>,
    pub session_count: u32,
}

impl Default for UserBehavior {
    /// The no-history default: two channels and two send windows,
    /// so downstream stages always have something to rank.
    fn default() -> Self {
        Self {
            engagement_rate: 50.0,
            preferred_channels: vec![Channel::InApp, Channel::Push],
            optimal_hours: vec![12, 19],
            response_patterns: HashMap::new(),
            kind_response_rates: HashMap::new(),
            activity: ActivityLevel::Medium,
            last_active: None,
            session_count: 0,
        }
    }
}

impl UserBehavior {
    pub fn response_for(&self, channel: Channel) -> ResponsePattern {
        self.response_patterns.get(&channel).copied().unwrap_or_default()
    }
}

/// The full per-user profile fed to every decision stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub preferences: NotificationPreferences,
    pub behavior: UserBehavior,
    pub segments: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// A profile with default preferences and no-history behavior.
    pub fn fresh(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            preferences: NotificationPreferences::default(),
            behavior: UserBehavior::default(),
            segments: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}
