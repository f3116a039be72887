//! Intelligent delivery gate
//!
//! Three sequential admission filters (basic, behavioral, contextual); the
//! first denial short-circuits. A full pass yields a weighted confidence
//! and up to two alternative channel suggestions.

use serde::{Deserialize, Serialize};

use pulse_core::{
    clamp_score, ActivityLevel, AppState, Channel, EnhancedNotification, NotificationKind,
    Priority, UserContext, UserProfile,
};

const LOW_ENGAGEMENT: f32 = 20.0;
const MIN_KIND_RESPONSE: f32 = 10.0;
const ALT_CHANNEL_MIN_PERFORMANCE: f32 = 50.0;

/// Verdict of a single filter stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterDecision {
    pub should_send: bool,
    pub reason: Option<String>,
    pub confidence: f32,
}

impl FilterDecision {
    fn pass() -> Self {
        Self { should_send: true, reason: None, confidence: 100.0 }
    }

    fn deny(reason: impl Into<String>, confidence: f32) -> Self {
        Self { should_send: false, reason: Some(reason.into()), confidence }
    }
}

/// The gate's final decision for one notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub should_send: bool,
    pub reason: Option<String>,
    pub confidence: f32,
    /// Better-performing channels worth enabling, at most two.
    pub suggested_channels: Vec<Channel>,
}

impl GateDecision {
    /// The conservative default when no profile is available.
    pub fn deny_no_profile(user_id: &str) -> Self {
        Self {
            should_send: false,
            reason: Some(format!("No behavior profile for user {user_id}")),
            confidence: 100.0,
            suggested_channels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryGate;

impl DeliveryGate {
    pub fn new() -> Self {
        Self
    }

    /// Run all three filters. `hour` is the recipient-local hour of day.
    pub fn check(
        &self,
        notification: &EnhancedNotification,
        profile: &UserProfile,
        context: &UserContext,
        hour: u32,
    ) -> GateDecision {
        for filter in [basic_filter, behavioral_filter, contextual_filter] {
            let decision = filter(notification, profile, context, hour);
            if !decision.should_send {
                tracing::debug!(
                    "Gate denied {}: {}",
                    notification.base.id,
                    decision.reason.as_deref().unwrap_or("unknown")
                );
                return GateDecision {
                    should_send: false,
                    reason: decision.reason,
                    confidence: decision.confidence,
                    suggested_channels: Vec::new(),
                };
            }
        }

        GateDecision {
            should_send: true,
            reason: None,
            confidence: pass_confidence(notification, profile, hour),
            suggested_channels: suggest_channels(notification, profile),
        }
    }
}

// ============================================================================
// Filter stages
// ============================================================================

fn basic_filter(
    notification: &EnhancedNotification,
    profile: &UserProfile,
    _context: &UserContext,
    hour: u32,
) -> FilterDecision {
    let prefs = &profile.preferences;
    let base = &notification.base;

    if !prefs.enabled {
        return FilterDecision::deny("Notifications disabled by user", 100.0);
    }
    if !prefs.kind_enabled(base.kind) {
        return FilterDecision::deny(format!("{:?} notifications disabled", base.kind), 100.0);
    }
    if let Some(quiet) = prefs.quiet_hours {
        if quiet.contains(hour) && base.priority != Priority::Urgent {
            return FilterDecision::deny("Quiet hours active", 95.0);
        }
    }
    if let Some(sender) = base.sender_id.as_deref() {
        if prefs.is_muted(sender) {
            return FilterDecision::deny("Sender is muted", 100.0);
        }
    }
    FilterDecision::pass()
}

fn behavioral_filter(
    notification: &EnhancedNotification,
    profile: &UserProfile,
    _context: &UserContext,
    _hour: u32,
) -> FilterDecision {
    let base = &notification.base;
    let behavior = &profile.behavior;

    // Priority senders bypass behavioral suppression.
    if base
        .sender_id
        .as_deref()
        .map(|s| profile.preferences.is_priority(s))
        .unwrap_or(false)
    {
        return FilterDecision::pass();
    }

    if behavior.activity == ActivityLevel::Low && base.priority == Priority::Low {
        return FilterDecision::deny("Low-activity user, low-priority notification", 75.0);
    }
    if behavior.engagement_rate < LOW_ENGAGEMENT && base.kind != NotificationKind::System {
        return FilterDecision::deny("Engagement rate below threshold", 75.0);
    }
    if let Some(&rate) = behavior.kind_response_rates.get(&base.kind) {
        if rate < MIN_KIND_RESPONSE {
            return FilterDecision::deny(
                format!("User rarely responds to {:?} notifications", base.kind),
                70.0,
            );
        }
    }
    FilterDecision::pass()
}

fn contextual_filter(
    notification: &EnhancedNotification,
    profile: &UserProfile,
    context: &UserContext,
    hour: u32,
) -> FilterDecision {
    let base = &notification.base;
    let behavior = &profile.behavior;

    // Urgent traffic ignores context entirely.
    if base.priority == Priority::Urgent {
        return FilterDecision::pass();
    }

    if context.app_state == AppState::Background {
        return FilterDecision::deny("App in background", 60.0);
    }
    if !behavior.optimal_hours.is_empty() && !behavior.optimal_hours.contains(&hour) {
        return FilterDecision::deny("Outside user's optimal hours", 60.0);
    }
    if !base.channels.enabled().any(|c| context.device.supports(c)) {
        return FilterDecision::deny("No enabled channel compatible with device", 80.0);
    }
    FilterDecision::pass()
}

// ============================================================================
// Confidence and channel suggestions
// ============================================================================

/// Weighted confidence for a full pass: engagement 0.3, per-kind performance
/// 0.25, per-channel performance 0.25, timing 0.2. Clamped to [0, 100].
fn pass_confidence(notification: &EnhancedNotification, profile: &UserProfile, hour: u32) -> f32 {
    let behavior = &profile.behavior;
    let base = &notification.base;

    let kind_score = behavior.kind_response_rates.get(&base.kind).copied().unwrap_or(50.0);

    let enabled: Vec<Channel> = base.channels.enabled().collect();
    let channel_score = if enabled.is_empty() {
        0.0
    } else {
        enabled.iter().map(|c| behavior.response_for(*c).open_rate).sum::<f32>()
            / enabled.len() as f32
    };

    let timing_score = if behavior.optimal_hours.contains(&hour) { 100.0 } else { 40.0 };

    clamp_score(
        behavior.engagement_rate * 0.3
            + kind_score * 0.25
            + channel_score * 0.25
            + timing_score * 0.2,
    )
}

/// Up to two preferred channels that are not yet enabled and historically
/// perform well.
fn suggest_channels(notification: &EnhancedNotification, profile: &UserProfile) -> Vec<Channel> {
    profile
        .behavior
        .preferred_channels
        .iter()
        .copied()
        .filter(|c| !notification.base.channels.is_enabled(*c))
        .filter(|c| profile.behavior.response_for(*c).open_rate > ALT_CHANNEL_MIN_PERFORMANCE)
        .take(2)
        .collect()
}
