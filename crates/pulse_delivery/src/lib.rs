//! Delivery execution: strategies, retries, escalation timers.

pub mod orchestrator;

pub use orchestrator::{DeliveryOrchestrator, DeliveryOutcome, EventSink};
