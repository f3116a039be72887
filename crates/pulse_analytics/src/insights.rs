//! Performance insights, recommendations and report export.

use serde::{Deserialize, Serialize};

use pulse_core::{EventKind, EventStore, NotificationStore, PulseError};
use std::sync::Arc;

use crate::aggregate::{AnalyticsReport, Period};

/// Fixed thresholds the recommendation generator applies.
const ENGAGEMENT_SCHEDULING_THRESHOLD: f32 = 50.0;
const ENGAGEMENT_CONTENT_THRESHOLD: f32 = 30.0;
const CONVERSION_CTA_THRESHOLD: f32 = 5.0;
const CHANNEL_GAP_THRESHOLD: f32 = 20.0;
const BOUNCE_HYGIENE_THRESHOLD: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trend {
    pub metric: String,
    pub direction: TrendDirection,
    pub change_pct: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelComparison {
    pub channel: pulse_core::Channel,
    pub open_rate: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopContent {
    pub notification_id: uuid::Uuid,
    pub content: String,
    pub clicks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceInsights {
    pub trends: Vec<Trend>,
    pub recommendations: Vec<String>,
    pub comparisons: Vec<ChannelComparison>,
    pub top_content: Vec<TopContent>,
}

/// Apply the fixed recommendation thresholds to a report.
pub fn recommendations(report: &AnalyticsReport) -> Vec<String> {
    let mut out = Vec::new();
    let engagement = report.totals.open_rate();

    if engagement < ENGAGEMENT_SCHEDULING_THRESHOLD {
        out.push(
            "Schedule notifications at the user's optimal hours to lift engagement".to_string(),
        );
    }
    if engagement < ENGAGEMENT_CONTENT_THRESHOLD {
        out.push("Improve notification content: engagement is critically low".to_string());
    }
    if report.totals.conversion_rate() < CONVERSION_CTA_THRESHOLD {
        out.push("Add stronger calls-to-action to raise conversions".to_string());
    }

    let mut rates: Vec<(pulse_core::Channel, f32)> =
        report.by_channel.iter().map(|c| (c.channel, c.open_rate())).collect();
    rates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    if rates.len() >= 2 && rates[0].1 - rates[rates.len() - 1].1 > CHANNEL_GAP_THRESHOLD {
        out.push(format!(
            "Reallocate volume toward {:?}: it outperforms {:?} by more than {} points",
            rates[0].0,
            rates[rates.len() - 1].0,
            CHANNEL_GAP_THRESHOLD
        ));
    }
    if report.totals.bounce_rate() > BOUNCE_HYGIENE_THRESHOLD {
        out.push("Review delivery list hygiene: bounce rate is above 10%".to_string());
    }
    out
}

pub struct InsightsBuilder {
    notifications: Arc<dyn NotificationStore>,
    events: Arc<dyn EventStore>,
}

impl InsightsBuilder {
    pub fn new(notifications: Arc<dyn NotificationStore>, events: Arc<dyn EventStore>) -> Self {
        Self { notifications, events }
    }

    /// Trends, recommendations, channel comparisons and top content for a
    /// user, derived from a month-long report plus event history.
    pub async fn build(
        &self,
        user_id: &str,
        report: &AnalyticsReport,
    ) -> Result<PerformanceInsights, PulseError> {
        let since = chrono::Utc::now() - Period::Month.lookback();
        let events = self.events.for_user_since(user_id, since).await.unwrap_or_default();

        // Split the window in half and compare open rates.
        let midpoint = chrono::Utc::now() - Period::Month.lookback() / 2;
        let (older, newer): (Vec<_>, Vec<_>) =
            events.iter().partition(|e| e.occurred_at < midpoint);
        let open_rate = |evts: &[&pulse_core::NotificationEvent]| -> f32 {
            let sent = evts.iter().filter(|e| e.kind == EventKind::Sent).count() as f32;
            let opened = evts.iter().filter(|e| e.kind == EventKind::Opened).count() as f32;
            if sent == 0.0 {
                0.0
            } else {
                opened / sent * 100.0
            }
        };
        let before = open_rate(&older);
        let after = open_rate(&newer);
        let change = after - before;
        let trends = vec![Trend {
            metric: "open_rate".to_string(),
            direction: if change > 1.0 {
                TrendDirection::Up
            } else if change < -1.0 {
                TrendDirection::Down
            } else {
                TrendDirection::Flat
            },
            change_pct: change,
        }];

        let mut comparisons: Vec<ChannelComparison> = report
            .by_channel
            .iter()
            .map(|c| ChannelComparison { channel: c.channel, open_rate: c.open_rate() })
            .collect();
        comparisons
            .sort_by(|a, b| b.open_rate.partial_cmp(&a.open_rate).unwrap_or(std::cmp::Ordering::Equal));

        let top_content = self.top_content(user_id, &events).await;

        Ok(PerformanceInsights {
            trends,
            recommendations: recommendations(report),
            comparisons,
            top_content,
        })
    }

    /// Most-clicked notifications with their content, top three.
    async fn top_content(
        &self,
        user_id: &str,
        events: &[pulse_core::NotificationEvent],
    ) -> Vec<TopContent> {
        let mut clicks: std::collections::HashMap<uuid::Uuid, u32> =
            std::collections::HashMap::new();
        for event in events.iter().filter(|e| e.kind == EventKind::Clicked) {
            *clicks.entry(event.notification_id).or_default() += 1;
        }
        let since = chrono::Utc::now() - Period::Month.lookback();
        let history = self.notifications.for_user_since(user_id, since).await.unwrap_or_default();

        let mut ranked: Vec<TopContent> = history
            .iter()
            .filter_map(|n| {
                clicks.get(&n.id).map(|&c| TopContent {
                    notification_id: n.id,
                    content: n.content.clone(),
                    clicks: c,
                })
            })
            .collect();
        ranked.sort_by(|a, b| b.clicks.cmp(&a.clicks));
        ranked.truncate(3);
        ranked
    }
}

// ============================================================================
// Export
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Serialize a report for external consumption.
pub fn export(report: &AnalyticsReport, format: ExportFormat) -> Result<String, PulseError> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(report)
            .map_err(|e| PulseError::InvalidInput(format!("report serialization failed: {e}"))),
        ExportFormat::Csv => Ok(to_csv(report)),
    }
}

/// Delimited-table form: one summary row plus one row per channel.
fn to_csv(report: &AnalyticsReport) -> String {
    let mut out = String::new();
    out.push_str("section,key,sent,delivered,opened,clicked,bounce_rate\n");
    let t = &report.totals;
    out.push_str(&format!(
        "totals,all,{},{},{},{},{:.1}\n",
        t.sent,
        t.delivered,
        t.opened,
        t.clicked,
        t.bounce_rate()
    ));
    for c in &report.by_channel {
        out.push_str(&format!(
            "channel,{:?},{},{},{},{},{:.1}\n",
            c.channel, c.sent, c.delivered, c.opened, c.clicked, c.bounce_rate
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{ChannelPerformance, EventTotals};
    use pulse_core::Channel;

    fn report_with(totals: EventTotals, channels: Vec<ChannelPerformance>) -> AnalyticsReport {
        let mut r = AnalyticsReport::empty("u1", Period::Month);
        r.totals = totals;
        r.by_channel = channels;
        r
    }

    fn channel(channel: Channel, sent: u32, opened: u32) -> ChannelPerformance {
        ChannelPerformance {
            channel,
            sent,
            delivered: sent,
            opened,
            clicked: 0,
            avg_delivery_ms: None,
            bounce_rate: 0.0,
            complaint_rate: 0.0,
        }
    }

    #[test]
    fn low_engagement_triggers_scheduling_and_content_advice() {
        let r = report_with(EventTotals { sent: 100, opened: 10, ..Default::default() }, vec![]);
        let recs = recommendations(&r);
        assert!(recs.iter().any(|r| r.contains("optimal hours")));
        assert!(recs.iter().any(|r| r.contains("Improve notification content")));
    }

    #[test]
    fn channel_gap_triggers_reallocation() {
        let r = report_with(
            EventTotals { sent: 100, opened: 60, converted: 10, ..Default::default() },
            vec![channel(Channel::Push, 50, 40), channel(Channel::Email, 50, 10)],
        );
        let recs = recommendations(&r);
        assert!(recs.iter().any(|r| r.contains("Reallocate volume toward Push")));
    }

    #[test]
    fn bounce_rate_triggers_hygiene_review() {
        let r = report_with(
            EventTotals { sent: 100, opened: 60, converted: 10, bounced: 15, ..Default::default() },
            vec![],
        );
        let recs = recommendations(&r);
        assert!(recs.iter().any(|r| r.contains("hygiene")));
    }

    #[test]
    fn healthy_report_has_no_recommendations() {
        let r = report_with(
            EventTotals { sent: 100, opened: 60, converted: 10, ..Default::default() },
            vec![],
        );
        assert!(recommendations(&r).is_empty());
    }

    #[test]
    fn csv_export_has_totals_and_channel_rows() {
        let r = report_with(
            EventTotals { sent: 10, delivered: 9, opened: 5, ..Default::default() },
            vec![channel(Channel::Push, 10, 5)],
        );
        let csv = export(&r, ExportFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("totals,all,10,9,5"));
        assert!(lines[2].starts_with("channel,Push,10"));
    }

    #[test]
    fn json_export_round_trips() {
        let r = report_with(EventTotals { sent: 1, ..Default::default() }, vec![]);
        let json = export(&r, ExportFormat::Json).unwrap();
        let back: AnalyticsReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.totals.sent, 1);
    }
}
