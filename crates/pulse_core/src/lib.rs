pub mod config;
pub mod delivery;
pub mod error;
pub mod event;
pub mod mem;
pub mod notification;
pub mod profile;
pub mod store;

pub use config::{
    AnalyticsConfig, DeliveryConfig, GroupingConfig, ProfileConfig, PulseConfig, TrackerConfig,
};
pub use delivery::{
    AttemptStatus, DeliveryAttempt, DeliveryStrategy, EscalationAction, EscalationRule,
    EscalationTrigger, SendOutcome,
};
pub use error::PulseError;
pub use event::{EventKind, NotificationEvent};
pub use mem::{MemoryEventStore, MemoryNotificationStore, MemoryPreferenceStore};
pub use notification::{
    AppState, Channel, ChannelSet, DeviceKind, EngagementPrediction, EnhancedNotification,
    Notification, NotificationKind, Priority, UserContext,
};
pub use profile::{
    ActivityLevel, KindPreference, NotificationPreferences, QuietHours, ResponsePattern,
    UserBehavior, UserProfile,
};
pub use store::{ChannelSender, EventStore, NotificationStore, PreferenceStore};

/// Clamp a score or confidence value to the canonical [0, 100] range.
///
/// Every rate/confidence the pipeline emits goes through this.
pub fn clamp_score(value: f32) -> f32 {
    value.clamp(0.0, 100.0)
}
