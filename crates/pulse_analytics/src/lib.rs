//! Event tracking and rolling analytics, the feedback half of the loop.

pub mod aggregate;
pub mod insights;
pub mod retention;
pub mod tracker;

pub use aggregate::{
    AnalyticsAggregator, AnalyticsReport, ChannelPerformance, EventTotals, ExperimentResult,
    HourlyBucket, Period, SegmentPerformance,
};
pub use insights::{
    export, recommendations, ChannelComparison, ExportFormat, InsightsBuilder,
    PerformanceInsights, TopContent, Trend, TrendDirection,
};
pub use retention::RetentionSweeper;
pub use tracker::EventTracker;
