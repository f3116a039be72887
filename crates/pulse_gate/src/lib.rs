//! Admission control and engagement prediction for outbound notifications.

pub mod gate;
pub mod scorer;

pub use gate::{DeliveryGate, FilterDecision, GateDecision};
pub use scorer::PredictiveScorer;
