//! Analytics aggregation
//!
//! Rolls raw events up into per-period reports: totals, kind and channel
//! breakdowns, hourly performance, segment reach and experiment results.
//! A store failure degrades to an empty report, never an error.

use chrono::{Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use pulse_core::{
    clamp_score, Channel, EventKind, EventStore, Notification, NotificationEvent,
    NotificationKind, NotificationStore, PreferenceStore,
};
use std::sync::Arc;

/// Reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    pub fn lookback(&self) -> Duration {
        match self {
            Period::Day => Duration::days(1),
            Period::Week => Duration::days(7),
            Period::Month => Duration::days(30),
            Period::Year => Duration::days(365),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EventTotals {
    pub sent: u32,
    pub delivered: u32,
    pub opened: u32,
    pub clicked: u32,
    pub converted: u32,
    pub dismissed: u32,
    pub bounced: u32,
    pub failed: u32,
}

impl EventTotals {
    pub fn open_rate(&self) -> f32 {
        rate(self.opened, self.sent)
    }

    pub fn conversion_rate(&self) -> f32 {
        rate(self.converted, self.sent)
    }

    pub fn bounce_rate(&self) -> f32 {
        rate(self.bounced, self.sent)
    }
}

/// Rolling per-channel aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelPerformance {
    pub channel: Channel,
    pub sent: u32,
    pub delivered: u32,
    pub opened: u32,
    pub clicked: u32,
    pub avg_delivery_ms: Option<i64>,
    pub bounce_rate: f32,
    pub complaint_rate: f32,
}

impl ChannelPerformance {
    pub fn open_rate(&self) -> f32 {
        rate(self.opened, self.sent)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HourlyBucket {
    pub hour: u32,
    pub views: u32,
    pub clicks: u32,
    /// views×0.7 + clicks×1.0, the same weighting the profile builder uses.
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentPerformance {
    pub segment: String,
    pub reach: u32,
    pub engagement_rate: f32,
    pub conversion_rate: f32,
}

/// Per-variant experiment aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub experiment_id: String,
    pub variant: String,
    pub sample_size: u32,
    pub conversion_rate: f32,
    pub confidence: f32,
    pub winner: bool,
    pub improvement_pct: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub user_id: String,
    pub period: Period,
    pub totals: EventTotals,
    pub by_kind: HashMap<NotificationKind, EventTotals>,
    pub by_channel: Vec<ChannelPerformance>,
    pub hourly: Vec<HourlyBucket>,
    pub optimal_send_hour: Option<u32>,
    pub segments: Vec<SegmentPerformance>,
    pub experiments: Vec<ExperimentResult>,
}

impl AnalyticsReport {
    pub fn empty(user_id: &str, period: Period) -> Self {
        Self {
            user_id: user_id.to_string(),
            period,
            totals: EventTotals::default(),
            by_kind: HashMap::new(),
            by_channel: Vec::new(),
            hourly: Vec::new(),
            optimal_send_hour: None,
            segments: Vec::new(),
            experiments: Vec::new(),
        }
    }
}

pub struct AnalyticsAggregator {
    notifications: Arc<dyn NotificationStore>,
    events: Arc<dyn EventStore>,
    preferences: Arc<dyn PreferenceStore>,
}

impl AnalyticsAggregator {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        events: Arc<dyn EventStore>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self { notifications, events, preferences }
    }

    /// Compute the full report for a user and period. Degrades to an empty
    /// report on store failure.
    pub async fn report(&self, user_id: &str, period: Period) -> AnalyticsReport {
        let since = Utc::now() - period.lookback();

        let events = match self.events.for_user_since(user_id, since).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("Analytics degraded to empty report for {}: {}", user_id, e);
                return AnalyticsReport::empty(user_id, period);
            }
        };
        let history = self.notifications.for_user_since(user_id, since).await.unwrap_or_default();
        let segments = self.preferences.segments(user_id).await.unwrap_or_default();

        let totals = totals(&events);
        let hourly = hourly_buckets(&events);
        let optimal_send_hour = hourly
            .iter()
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
            .map(|b| b.hour);

        AnalyticsReport {
            user_id: user_id.to_string(),
            period,
            totals,
            by_kind: by_kind(&history, &events),
            by_channel: by_channel(&events),
            hourly,
            optimal_send_hour,
            segments: segment_performance(&segments, &totals),
            experiments: experiments(&events),
        }
    }
}

fn rate(part: u32, whole: u32) -> f32 {
    if whole == 0 {
        0.0
    } else {
        clamp_score(part as f32 / whole as f32 * 100.0)
    }
}

fn bump(totals: &mut EventTotals, kind: EventKind) {
    match kind {
        EventKind::Sent => totals.sent += 1,
        EventKind::Delivered => totals.delivered += 1,
        EventKind::Opened => totals.opened += 1,
        EventKind::Clicked => totals.clicked += 1,
        EventKind::Converted => totals.converted += 1,
        EventKind::Dismissed => totals.dismissed += 1,
        EventKind::Bounced => totals.bounced += 1,
        EventKind::Failed => totals.failed += 1,
    }
}

fn totals(events: &[NotificationEvent]) -> EventTotals {
    let mut t = EventTotals::default();
    for event in events {
        bump(&mut t, event.kind);
    }
    t
}

fn by_kind(
    history: &[Notification],
    events: &[NotificationEvent],
) -> HashMap<NotificationKind, EventTotals> {
    let kind_of: HashMap<Uuid, NotificationKind> =
        history.iter().map(|n| (n.id, n.kind)).collect();
    let mut out: HashMap<NotificationKind, EventTotals> = HashMap::new();
    for event in events {
        if let Some(&kind) = kind_of.get(&event.notification_id) {
            bump(out.entry(kind).or_default(), event.kind);
        }
    }
    out
}

fn by_channel(events: &[NotificationEvent]) -> Vec<ChannelPerformance> {
    let mut sent_at: HashMap<(Uuid, Channel), chrono::DateTime<Utc>> = HashMap::new();
    let mut per: HashMap<Channel, EventTotals> = HashMap::new();
    let mut delivery_ms: HashMap<Channel, Vec<i64>> = HashMap::new();
    let mut complaints: HashMap<Channel, u32> = HashMap::new();

    for event in events {
        let Some(channel) = event.channel else { continue };
        bump(per.entry(channel).or_default(), event.kind);
        match event.kind {
            EventKind::Sent => {
                sent_at.insert((event.notification_id, channel), event.occurred_at);
            }
            EventKind::Delivered => {
                if let Some(sent) = sent_at.get(&(event.notification_id, channel)) {
                    delivery_ms
                        .entry(channel)
                        .or_default()
                        .push((event.occurred_at - *sent).num_milliseconds());
                }
            }
            _ => {}
        }
        if event.metadata.get("complaint").and_then(|v| v.as_bool()).unwrap_or(false) {
            *complaints.entry(channel).or_default() += 1;
        }
    }

    let mut out: Vec<ChannelPerformance> = per
        .into_iter()
        .map(|(channel, t)| {
            let times = delivery_ms.get(&channel);
            let avg_delivery_ms = times
                .filter(|v| !v.is_empty())
                .map(|v| v.iter().sum::<i64>() / v.len() as i64);
            ChannelPerformance {
                channel,
                sent: t.sent,
                delivered: t.delivered,
                opened: t.opened,
                clicked: t.clicked,
                avg_delivery_ms,
                bounce_rate: t.bounce_rate(),
                complaint_rate: rate(complaints.get(&channel).copied().unwrap_or(0), t.sent),
            }
        })
        .collect();
    out.sort_by_key(|c| c.channel);
    out
}

fn hourly_buckets(events: &[NotificationEvent]) -> Vec<HourlyBucket> {
    let mut views: HashMap<u32, u32> = HashMap::new();
    let mut clicks: HashMap<u32, u32> = HashMap::new();
    for event in events {
        let hour = event.occurred_at.hour();
        match event.kind {
            EventKind::Opened => *views.entry(hour).or_default() += 1,
            EventKind::Clicked => *clicks.entry(hour).or_default() += 1,
            _ => {}
        }
    }
    let mut hours: Vec<u32> = views.keys().chain(clicks.keys()).copied().collect();
    hours.sort_unstable();
    hours.dedup();
    hours
        .into_iter()
        .map(|hour| {
            let v = views.get(&hour).copied().unwrap_or(0);
            let c = clicks.get(&hour).copied().unwrap_or(0);
            HourlyBucket { hour, views: v, clicks: c, score: v as f32 * 0.7 + c as f32 }
        })
        .collect()
}

fn segment_performance(segments: &[String], totals: &EventTotals) -> Vec<SegmentPerformance> {
    segments
        .iter()
        .map(|segment| SegmentPerformance {
            segment: segment.clone(),
            reach: totals.sent,
            engagement_rate: totals.open_rate(),
            conversion_rate: totals.conversion_rate(),
        })
        .collect()
}

/// Per-variant rollup from events tagged with experiment metadata.
fn experiments(events: &[NotificationEvent]) -> Vec<ExperimentResult> {
    #[derive(Default)]
    struct Acc {
        sample: u32,
        conversions: u32,
    }
    let mut acc: HashMap<(String, String), Acc> = HashMap::new();

    for event in events {
        let Some(exp) = event.metadata.get("experiment").and_then(|v| v.as_str()) else {
            continue;
        };
        let variant =
            event.metadata.get("variant").and_then(|v| v.as_str()).unwrap_or("control");
        let entry = acc.entry((exp.to_string(), variant.to_string())).or_default();
        match event.kind {
            EventKind::Delivered => entry.sample += 1,
            EventKind::Converted => entry.conversions += 1,
            _ => {}
        }
    }

    let mut results: Vec<ExperimentResult> = acc
        .into_iter()
        .map(|((experiment_id, variant), a)| ExperimentResult {
            experiment_id,
            variant,
            sample_size: a.sample,
            conversion_rate: rate(a.conversions, a.sample),
            confidence: clamp_score(50.0 + (a.sample as f32 / 10.0).min(45.0)),
            winner: false,
            improvement_pct: 0.0,
        })
        .collect();

    // Flag the winning variant per experiment and its improvement over the
    // runner-up.
    let mut by_experiment: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, r) in results.iter().enumerate() {
        by_experiment.entry(r.experiment_id.clone()).or_default().push(i);
    }
    for indices in by_experiment.values() {
        if indices.len() < 2 {
            continue;
        }
        let mut sorted = indices.clone();
        sorted.sort_by(|&a, &b| {
            results[b]
                .conversion_rate
                .partial_cmp(&results[a].conversion_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let best = sorted[0];
        let second = results[sorted[1]].conversion_rate;
        results[best].winner = true;
        results[best].improvement_pct = if second > 0.0 {
            (results[best].conversion_rate - second) / second * 100.0
        } else {
            0.0
        };
    }
    results.sort_by(|a, b| (&a.experiment_id, &a.variant).cmp(&(&b.experiment_id, &b.variant)));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(kind: EventKind, channel: Channel, hour: u32) -> NotificationEvent {
        let mut e = NotificationEvent::new(Uuid::new_v4(), "u1", kind).on_channel(channel);
        e.occurred_at = Utc.with_ymd_and_hms(2026, 8, 20, hour, 0, 0).unwrap();
        e
    }

    #[test]
    fn totals_and_rates() {
        let events = vec![
            event(EventKind::Sent, Channel::Push, 9),
            event(EventKind::Sent, Channel::Push, 9),
            event(EventKind::Opened, Channel::Push, 10),
            event(EventKind::Bounced, Channel::Push, 10),
        ];
        let t = totals(&events);
        assert_eq!(t.sent, 2);
        assert_eq!(t.open_rate(), 50.0);
        assert_eq!(t.bounce_rate(), 50.0);
    }

    #[test]
    fn hourly_scores_derive_optimal_hour() {
        let events = vec![
            event(EventKind::Opened, Channel::Push, 9),
            event(EventKind::Clicked, Channel::Push, 20),
            event(EventKind::Clicked, Channel::Push, 20),
        ];
        let buckets = hourly_buckets(&events);
        let best = buckets
            .iter()
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap())
            .unwrap();
        assert_eq!(best.hour, 20);
        assert_eq!(best.score, 2.0);
    }

    #[test]
    fn delivery_latency_joins_sent_and_delivered() {
        let id = Uuid::new_v4();
        let mut sent = NotificationEvent::new(id, "u1", EventKind::Sent).on_channel(Channel::Email);
        sent.occurred_at = Utc.with_ymd_and_hms(2026, 8, 20, 9, 0, 0).unwrap();
        let mut delivered =
            NotificationEvent::new(id, "u1", EventKind::Delivered).on_channel(Channel::Email);
        delivered.occurred_at = Utc.with_ymd_and_hms(2026, 8, 20, 9, 0, 2).unwrap();

        let channels = by_channel(&[sent, delivered]);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].avg_delivery_ms, Some(2000));
    }

    #[test]
    fn experiment_winner_and_improvement() {
        let mk = |variant: &str, kind: EventKind| {
            NotificationEvent::new(Uuid::new_v4(), "u1", kind).with_metadata(serde_json::json!({
                "experiment": "subject-line",
                "variant": variant,
            }))
        };
        let mut events = Vec::new();
        for _ in 0..10 {
            events.push(mk("a", EventKind::Delivered));
            events.push(mk("b", EventKind::Delivered));
        }
        events.push(mk("a", EventKind::Converted));
        events.push(mk("a", EventKind::Converted));
        events.push(mk("b", EventKind::Converted));

        let results = experiments(&events);
        assert_eq!(results.len(), 2);
        let a = results.iter().find(|r| r.variant == "a").unwrap();
        let b = results.iter().find(|r| r.variant == "b").unwrap();
        assert!(a.winner);
        assert!(!b.winner);
        assert!(a.improvement_pct > 99.0);
    }
}
