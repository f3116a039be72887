//! Predictive engagement scorer
//!
//! Estimates open/click/conversion rates and recommends channels and
//! timing. All outputs are percentages clamped to [0, 100]; the prediction
//! confidence grows with history depth, recency, and pattern consistency.

use chrono::{Timelike, Utc};

use pulse_core::{
    clamp_score, Channel, DeviceKind, EngagementPrediction, Notification, NotificationKind,
    Priority, UserBehavior, UserContext, UserProfile,
};

const BASE_CONVERSION_RATE: f32 = 5.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct PredictiveScorer;

impl PredictiveScorer {
    pub fn new() -> Self {
        Self
    }

    /// Full prediction for one notification against a profile.
    pub fn predict(
        &self,
        notification: &Notification,
        profile: &UserProfile,
        context: &UserContext,
    ) -> EngagementPrediction {
        let behavior = &profile.behavior;
        EngagementPrediction {
            open_rate: self.predict_open_rate(notification, profile),
            click_rate: self.predict_click_rate(notification, behavior),
            conversion_rate: self.predict_conversion_rate(notification),
            confidence: self.confidence(behavior),
            recommended_channels: self.optimal_channels(notification.kind, behavior, context),
            recommended_hour: self.optimal_hour(Utc::now().hour(), behavior),
        }
    }

    /// Engagement baseline plus kind, priority and sender adjustments.
    pub fn predict_open_rate(&self, notification: &Notification, profile: &UserProfile) -> f32 {
        let sender_adjust = match notification.sender_id.as_deref() {
            Some(s) if profile.preferences.is_priority(s) => 10.0,
            Some(_) => 5.0,
            None => 0.0,
        };
        clamp_score(
            profile.behavior.engagement_rate
                + kind_adjustment(notification.kind)
                + priority_adjustment(notification.priority)
                + sender_adjust,
        )
    }

    /// Average per-channel click rate plus content-relevance (0–20) and
    /// call-to-action (0–15) bonuses.
    pub fn predict_click_rate(&self, notification: &Notification, behavior: &UserBehavior) -> f32 {
        let patterns = &behavior.response_patterns;
        let avg_click = if patterns.is_empty() {
            10.0
        } else {
            patterns.values().map(|p| p.click_rate).sum::<f32>() / patterns.len() as f32
        };

        let relevance_bonus = if notification.sender_id.is_some() { 15.0 } else { 5.0 };
        let cta_bonus = if notification.action_url.is_some() { 12.0 } else { 4.0 };

        clamp_score(avg_click + relevance_bonus + cta_bonus)
    }

    /// Base conversion scaled by kind and urgency multipliers.
    pub fn predict_conversion_rate(&self, notification: &Notification) -> f32 {
        clamp_score(
            BASE_CONVERSION_RATE
                * kind_multiplier(notification.kind)
                * urgency_multiplier(notification.priority),
        )
    }

    /// Preferred channels re-ranked by performance (0.5), kind relevance
    /// (0.3) and device availability (0.2); top three.
    pub fn optimal_channels(
        &self,
        kind: NotificationKind,
        behavior: &UserBehavior,
        context: &UserContext,
    ) -> Vec<Channel> {
        let mut ranked: Vec<(Channel, f32)> = behavior
            .preferred_channels
            .iter()
            .map(|&c| {
                let performance = behavior.response_for(c).open_rate;
                let relevance = channel_relevance(kind, c);
                let availability = if context.device.supports(c) { 100.0 } else { 0.0 };
                (c, performance * 0.5 + relevance * 0.3 + availability * 0.2)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.into_iter().take(3).map(|(c, _)| c).collect()
    }

    /// The current hour if it is optimal, else the next later optimal hour,
    /// else the best-ranked optimal hour, else noon.
    pub fn optimal_hour(&self, current_hour: u32, behavior: &UserBehavior) -> u32 {
        let hours = &behavior.optimal_hours;
        if hours.contains(&current_hour) {
            return current_hour;
        }
        hours
            .iter()
            .copied()
            .filter(|&h| h > current_hour)
            .min()
            .or_else(|| hours.first().copied())
            .unwrap_or(12)
    }

    /// 50 + history depth (≤30) + recency (≤20) + consistency (≤20).
    pub fn confidence(&self, behavior: &UserBehavior) -> f32 {
        let depth = (behavior.session_count as f32 / 10.0).min(30.0);

        let recency = match behavior.last_active {
            Some(t) => {
                let days = (Utc::now() - t).num_days() as f32;
                (20.0 - days).max(0.0)
            }
            None => 0.0,
        };

        clamp_score(50.0 + depth + recency + consistency(behavior) * 20.0)
    }
}

fn kind_adjustment(kind: NotificationKind) -> f32 {
    match kind {
        NotificationKind::Like => 5.0,
        NotificationKind::Comment => 10.0,
        NotificationKind::Follow => 8.0,
        NotificationKind::FriendRequest => 12.0,
        NotificationKind::Mention => 15.0,
        NotificationKind::Tag => 10.0,
        NotificationKind::Share => 7.0,
        NotificationKind::System => -10.0,
        NotificationKind::Achievement => 12.0,
        NotificationKind::Milestone => 15.0,
    }
}

fn priority_adjustment(priority: Priority) -> f32 {
    match priority {
        Priority::Low => -5.0,
        Priority::Normal => 0.0,
        Priority::High => 5.0,
        Priority::Urgent => 15.0,
    }
}

fn kind_multiplier(kind: NotificationKind) -> f32 {
    match kind {
        NotificationKind::FriendRequest => 2.0,
        NotificationKind::Mention => 1.5,
        NotificationKind::Milestone => 1.5,
        NotificationKind::Achievement => 1.4,
        NotificationKind::Comment => 1.2,
        NotificationKind::Follow => 1.1,
        NotificationKind::Tag => 1.0,
        NotificationKind::Share => 1.0,
        NotificationKind::Like => 0.8,
        NotificationKind::System => 0.5,
    }
}

fn urgency_multiplier(priority: Priority) -> f32 {
    match priority {
        Priority::Low => 0.8,
        Priority::Normal => 1.0,
        Priority::High => 1.2,
        Priority::Urgent => 1.5,
    }
}

/// How well a channel suits a notification kind, 0–100.
fn channel_relevance(kind: NotificationKind, channel: Channel) -> f32 {
    match (kind, channel) {
        (NotificationKind::System, Channel::Email) => 90.0,
        (NotificationKind::System, _) => 50.0,
        (NotificationKind::FriendRequest, Channel::Push) => 90.0,
        (NotificationKind::Mention, Channel::Push) => 85.0,
        (NotificationKind::Like | NotificationKind::Comment, Channel::InApp) => 85.0,
        (_, Channel::InApp) => 70.0,
        (_, Channel::Push) => 75.0,
        (_, Channel::Email) => 40.0,
        (_, Channel::Sms) => 25.0,
        (_, Channel::Webhook) => 20.0,
    }
}

/// Stability of per-channel open rates, in [0, 1]. Few data points score a
/// neutral 0.5.
fn consistency(behavior: &UserBehavior) -> f32 {
    let rates: Vec<f32> =
        behavior.response_patterns.values().map(|p| p.open_rate).collect();
    if rates.len() < 2 {
        return 0.5;
    }
    let max = rates.iter().cloned().fold(f32::MIN, f32::max);
    let min = rates.iter().cloned().fold(f32::MAX, f32::min);
    (1.0 - (max - min) / 100.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use pulse_core::ResponsePattern;

    fn profile() -> UserProfile {
        let mut p = UserProfile::fresh("u1");
        p.behavior.engagement_rate = 40.0;
        p.behavior.optimal_hours = vec![9, 12, 19];
        p
    }

    #[test]
    fn open_rate_reflects_kind_and_priority() {
        let scorer = PredictiveScorer::new();
        let p = profile();

        let mention = Notification::new("u1", NotificationKind::Mention, "hi")
            .with_priority(Priority::Urgent);
        let system =
            Notification::new("u1", NotificationKind::System, "hi").with_priority(Priority::Low);

        assert!(
            scorer.predict_open_rate(&mention, &p) > scorer.predict_open_rate(&system, &p)
        );
    }

    #[test]
    fn cta_presence_raises_click_rate() {
        let scorer = PredictiveScorer::new();
        let behavior = UserBehavior::default();
        let plain = Notification::new("u1", NotificationKind::Share, "see this");
        let with_cta = plain.clone().with_action_url("https://example.com/p/1");

        assert!(
            scorer.predict_click_rate(&with_cta, &behavior)
                > scorer.predict_click_rate(&plain, &behavior)
        );
    }

    #[test]
    fn optimal_hour_selection() {
        let scorer = PredictiveScorer::new();
        let p = profile();
        // Current hour optimal → keep it.
        assert_eq!(scorer.optimal_hour(12, &p.behavior), 12);
        // Next later optimal hour.
        assert_eq!(scorer.optimal_hour(14, &p.behavior), 19);
        // Past all → wrap to first.
        assert_eq!(scorer.optimal_hour(21, &p.behavior), 9);
        // No data → noon.
        let mut empty = p.behavior.clone();
        empty.optimal_hours.clear();
        assert_eq!(scorer.optimal_hour(21, &empty), 12);
    }

    #[test]
    fn unavailable_channels_rank_last() {
        let scorer = PredictiveScorer::new();
        let mut behavior = UserBehavior::default();
        behavior.preferred_channels = vec![Channel::Push, Channel::InApp];
        behavior
            .response_patterns
            .insert(Channel::Push, ResponsePattern { open_rate: 80.0, ..Default::default() });
        behavior
            .response_patterns
            .insert(Channel::InApp, ResponsePattern { open_rate: 60.0, ..Default::default() });

        // Web devices cannot receive push.
        let web = UserContext { device: DeviceKind::Web, ..Default::default() };
        let ranked = scorer.optimal_channels(NotificationKind::Like, &behavior, &web);
        assert_eq!(ranked[0], Channel::InApp);
    }

    proptest! {
        /// Every scorer output stays in [0, 100] for arbitrary behavior inputs.
        #[test]
        fn outputs_bounded(
            engagement in -50.0f32..200.0,
            sessions in 0u32..100_000,
            open in 0.0f32..150.0,
            click in 0.0f32..150.0,
        ) {
            let scorer = PredictiveScorer::new();
            let mut p = profile();
            p.behavior.engagement_rate = engagement;
            p.behavior.session_count = sessions;
            p.behavior.response_patterns.insert(
                Channel::Push,
                ResponsePattern { open_rate: open, click_rate: click, dismiss_rate: 0.0 },
            );

            let n = Notification::new("u1", NotificationKind::Mention, "hi")
                .with_priority(Priority::Urgent)
                .with_action_url("https://example.com");
            let pred = scorer.predict(&n, &p, &UserContext::default());

            for v in [pred.open_rate, pred.click_rate, pred.conversion_rate, pred.confidence] {
                prop_assert!((0.0..=100.0).contains(&v));
            }
            prop_assert!(pred.recommended_channels.len() <= 3);
            prop_assert!(pred.recommended_hour < 24);
        }
    }
}
