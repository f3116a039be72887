//! Personalization rule data model
//!
//! Conditions form an explicit boolean expression tree (`All`/`Any`/`Not`
//! nodes over typed comparisons), so mixed AND/OR rules have one
//! unambiguous meaning. Field access goes through the `ProfileField`
//! accessor enum rather than string paths.

use serde::{Deserialize, Serialize};

use pulse_core::{ActivityLevel, Channel, NotificationKind, Priority};

/// A condition/action rule targeting one notification kind.
///
/// Higher priority rules are evaluated first; effects of all matching
/// rules accumulate, except `Skip`, which is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalizationRule {
    pub id: i64,
    pub name: String,
    pub kind: NotificationKind,
    pub condition: RuleCondition,
    pub actions: Vec<RuleAction>,
    pub priority: i32,
    pub active: bool,
}

/// Boolean expression tree over profile/notification fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Always true.
    Always,
    /// All children must hold (short-circuits false).
    All { conditions: Vec<RuleCondition> },
    /// Any child must hold (short-circuits true).
    Any { conditions: Vec<RuleCondition> },
    /// Negation.
    Not { condition: Box<RuleCondition> },
    /// Leaf comparison of a typed field against a literal.
    Compare { field: ProfileField, op: CompareOp, value: RuleValue },
}

/// Typed accessors into the evaluation context. Replaces dot-path strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    EngagementRate,
    ActivityLevel,
    SessionCount,
    Segments,
    PreferredChannels,
    NotificationPriority,
    SenderIsPriority,
    HourOfDay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    In,
    Between,
}

/// A literal a condition compares against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
    Range { min: f64, max: f64 },
}

/// A field read at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

/// Actions execute sequentially on a working copy of the notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// Replace content with a template; `{var}` placeholders are filled
    /// from the notification/profile context.
    ModifyContent { template: String },
    /// Intersect the requested channels with the user's preferred channels.
    ModifyChannels { channels: Vec<Channel> },
    /// Defer to the next occurrence of an optimal hour (next day if past).
    ModifySchedule,
    /// Overwrite priority.
    ModifyPriority { priority: Priority },
    /// Suppress delivery entirely when `when` holds (or unconditionally).
    /// Dominates every channel-enabling action from any rule.
    Skip { when: Option<RuleCondition> },
}

pub(crate) fn activity_name(level: ActivityLevel) -> &'static str {
    match level {
        ActivityLevel::Low => "low",
        ActivityLevel::Medium => "medium",
        ActivityLevel::High => "high",
    }
}

pub(crate) fn priority_name(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Normal => "normal",
        Priority::High => "high",
        Priority::Urgent => "urgent",
    }
}

pub(crate) fn channel_name(channel: Channel) -> &'static str {
    match channel {
        Channel::InApp => "in_app",
        Channel::Push => "push",
        Channel::Email => "email",
        Channel::Sms => "sms",
        Channel::Webhook => "webhook",
    }
}
