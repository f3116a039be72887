//! Behavior profile builder
//!
//! Aggregates the last 30 days of notification and event history into a
//! `UserBehavior` summary. Pure aggregation over whatever the stores return:
//! recomputing on unchanged input yields the identical summary.

use chrono::{Duration, Timelike, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use pulse_core::{
    clamp_score, ActivityLevel, Channel, EventKind, EventStore, Notification, NotificationEvent,
    NotificationKind, NotificationStore, PulseError, ResponsePattern, UserBehavior,
};

/// Weight of a view against a click when ranking hour buckets.
const VIEW_WEIGHT: f32 = 0.7;
const CLICK_WEIGHT: f32 = 1.0;

pub struct ProfileBuilder {
    notifications: Arc<dyn NotificationStore>,
    events: Arc<dyn EventStore>,
    lookback_days: i64,
}

impl ProfileBuilder {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        events: Arc<dyn EventStore>,
        lookback_days: i64,
    ) -> Self {
        Self { notifications, events, lookback_days }
    }

    /// Build a behavior summary from history. Returns the no-history default
    /// when the user has no recorded sends.
    pub async fn build(&self, user_id: &str) -> Result<UserBehavior, PulseError> {
        let since = Utc::now() - Duration::days(self.lookback_days);
        let history = self.notifications.for_user_since(user_id, since).await?;
        let events = self.events.for_user_since(user_id, since).await?;

        let sent = count_kind(&events, EventKind::Sent);
        if sent == 0 {
            tracing::debug!("No send history for {}, using default behavior", user_id);
            return Ok(UserBehavior::default());
        }

        let opened = count_kind(&events, EventKind::Opened);
        let engagement_rate = clamp_score(opened as f32 / sent as f32 * 100.0);

        let response_patterns = response_patterns(&events);
        let preferred_channels = rank_channels(&response_patterns);
        let optimal_hours = rank_hours(&events);
        let kind_response_rates = kind_response_rates(&history, &events);

        let activity = if sent < 10 || engagement_rate < 20.0 {
            ActivityLevel::Low
        } else if sent < 50 || engagement_rate < 60.0 {
            ActivityLevel::Medium
        } else {
            ActivityLevel::High
        };

        let last_active = events
            .iter()
            .filter(|e| {
                matches!(e.kind, EventKind::Opened | EventKind::Clicked | EventKind::Converted)
            })
            .map(|e| e.occurred_at)
            .max();

        let session_count = session_count(&events);

        Ok(UserBehavior {
            engagement_rate,
            preferred_channels,
            optimal_hours,
            response_patterns,
            kind_response_rates,
            activity,
            last_active,
            session_count,
        })
    }
}

fn count_kind(events: &[NotificationEvent], kind: EventKind) -> u32 {
    events.iter().filter(|e| e.kind == kind).count() as u32
}

/// Per-channel open/click/dismiss rates against sends on that channel.
fn response_patterns(events: &[NotificationEvent]) -> HashMap<Channel, ResponsePattern> {
    let mut sent: HashMap<Channel, u32> = HashMap::new();
    let mut opened: HashMap<Channel, u32> = HashMap::new();
    let mut clicked: HashMap<Channel, u32> = HashMap::new();
    let mut dismissed: HashMap<Channel, u32> = HashMap::new();

    for event in events {
        let Some(channel) = event.channel else { continue };
        match event.kind {
            EventKind::Sent => *sent.entry(channel).or_default() += 1,
            EventKind::Opened => *opened.entry(channel).or_default() += 1,
            EventKind::Clicked => *clicked.entry(channel).or_default() += 1,
            EventKind::Dismissed => *dismissed.entry(channel).or_default() += 1,
            _ => {}
        }
    }

    let mut patterns = HashMap::new();
    for (channel, &s) in &sent {
        if s == 0 {
            continue;
        }
        let rate = |m: &HashMap<Channel, u32>| {
            clamp_score(m.get(channel).copied().unwrap_or(0) as f32 / s as f32 * 100.0)
        };
        patterns.insert(
            *channel,
            ResponsePattern {
                open_rate: rate(&opened),
                click_rate: rate(&clicked),
                dismiss_rate: rate(&dismissed),
            },
        );
    }
    patterns
}

/// Channels ranked by open rate descending. Falls back to the default pair
/// so the list is never empty.
fn rank_channels(patterns: &HashMap<Channel, ResponsePattern>) -> Vec<Channel> {
    let mut ranked: Vec<(Channel, f32)> =
        patterns.iter().map(|(c, p)| (*c, p.open_rate)).collect();
    if ranked.is_empty() {
        return vec![Channel::InApp, Channel::Push];
    }
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.into_iter().map(|(c, _)| c).collect()
}

/// Top-3 hour buckets by weighted view/click score, best first. Ties break
/// toward the earlier hour so recomputation is deterministic.
fn rank_hours(events: &[NotificationEvent]) -> Vec<u32> {
    let mut scores: HashMap<u32, f32> = HashMap::new();
    for event in events {
        let hour = event.occurred_at.hour();
        match event.kind {
            EventKind::Opened => *scores.entry(hour).or_default() += VIEW_WEIGHT,
            EventKind::Clicked => *scores.entry(hour).or_default() += CLICK_WEIGHT,
            _ => {}
        }
    }
    if scores.is_empty() {
        return vec![12, 19];
    }
    let mut ranked: Vec<(u32, f32)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0))
    });
    ranked.into_iter().take(3).map(|(h, _)| h).collect()
}

/// Per-kind open rates, joined through the notification the event refers to.
fn kind_response_rates(
    history: &[Notification],
    events: &[NotificationEvent],
) -> HashMap<NotificationKind, f32> {
    let kind_of: HashMap<_, _> = history.iter().map(|n| (n.id, n.kind)).collect();

    let mut sent: HashMap<NotificationKind, u32> = HashMap::new();
    let mut opened: HashMap<NotificationKind, u32> = HashMap::new();
    for event in events {
        let Some(&kind) = kind_of.get(&event.notification_id) else { continue };
        match event.kind {
            EventKind::Sent => *sent.entry(kind).or_default() += 1,
            EventKind::Opened => *opened.entry(kind).or_default() += 1,
            _ => {}
        }
    }

    sent.into_iter()
        .filter(|(_, s)| *s > 0)
        .map(|(kind, s)| {
            let o = opened.get(&kind).copied().unwrap_or(0);
            (kind, clamp_score(o as f32 / s as f32 * 100.0))
        })
        .collect()
}

/// Distinct (day, hour) buckets with engagement, a rough session proxy.
fn session_count(events: &[NotificationEvent]) -> u32 {
    let mut buckets = std::collections::HashSet::new();
    for event in events {
        if matches!(event.kind, EventKind::Opened | EventKind::Clicked) {
            buckets.insert((event.occurred_at.date_naive(), event.occurred_at.hour()));
        }
    }
    buckets.len() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pulse_core::NotificationEvent;
    use uuid::Uuid;

    fn event_at(kind: EventKind, channel: Channel, hour: u32) -> NotificationEvent {
        let mut e = NotificationEvent::new(Uuid::new_v4(), "u1", kind).on_channel(channel);
        e.occurred_at = Utc.with_ymd_and_hms(2026, 8, 20, hour, 15, 0).unwrap();
        e
    }

    #[test]
    fn channels_ranked_by_open_rate() {
        let events = vec![
            event_at(EventKind::Sent, Channel::Push, 9),
            event_at(EventKind::Sent, Channel::Push, 9),
            event_at(EventKind::Opened, Channel::Push, 9),
            event_at(EventKind::Sent, Channel::Email, 9),
            event_at(EventKind::Opened, Channel::Email, 9),
        ];
        let patterns = response_patterns(&events);
        // Email 100% open beats Push 50%.
        assert_eq!(rank_channels(&patterns)[0], Channel::Email);
    }

    #[test]
    fn hour_ranking_weights_clicks_over_views() {
        let events = vec![
            event_at(EventKind::Opened, Channel::Push, 9),
            event_at(EventKind::Opened, Channel::Push, 9),
            event_at(EventKind::Clicked, Channel::Push, 20),
            event_at(EventKind::Clicked, Channel::Push, 20),
        ];
        let hours = rank_hours(&events);
        // 20h scores 2.0, 9h scores 1.4; the higher score ranks first.
        assert_eq!(hours, vec![20, 9]);
    }

    #[test]
    fn best_scoring_hour_comes_first() {
        let events = vec![
            event_at(EventKind::Opened, Channel::Push, 8),
            event_at(EventKind::Clicked, Channel::Push, 22),
            event_at(EventKind::Clicked, Channel::Push, 22),
            event_at(EventKind::Opened, Channel::Push, 14),
            event_at(EventKind::Opened, Channel::Push, 14),
            event_at(EventKind::Opened, Channel::Push, 14),
        ];
        // 22h = 2.0, 14h = 2.1, 8h = 0.7: score order, not clock order.
        assert_eq!(rank_hours(&events), vec![14, 22, 8]);
    }

    #[test]
    fn empty_history_defaults() {
        assert_eq!(rank_hours(&[]), vec![12, 19]);
        assert_eq!(rank_channels(&HashMap::new()), vec![Channel::InApp, Channel::Push]);
    }
}
