//! Personalization rule engine
//!
//! Rules follow a condition → actions pattern: an explicit boolean
//! expression tree gates an ordered action list that can rewrite content,
//! narrow channels, defer scheduling, raise priority, or suppress delivery.

pub mod cache;
pub mod engine;
pub mod model;

pub use cache::{MemoryRuleStore, RuleCache, RuleManager, RuleStore};
pub use engine::{evaluate, next_optimal_time, RuleContext, RuleEngine};
pub use model::{
    CompareOp, FieldValue, PersonalizationRule, ProfileField, RuleAction, RuleCondition, RuleValue,
};
