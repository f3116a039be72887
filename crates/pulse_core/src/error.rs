//! Error types shared across the pipeline
//!
//! The decision path never surfaces these to a notification producer:
//! missing profiles become conservative deny decisions, bad rules are
//! skipped, and store failures fall back to cached data or defaults.

use thiserror::Error;

use crate::notification::Channel;

#[derive(Debug, Error)]
pub enum PulseError {
    #[error("no behavior profile available for user {0}")]
    ProfileUnavailable(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("rule {rule_id} evaluation failed: {detail}")]
    RuleEvaluation { rule_id: i64, detail: String },

    #[error("channel {channel:?} send failed: {detail}")]
    ChannelFailure { channel: Channel, detail: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
