//! Rule evaluation and application
//!
//! `personalize` folds every matching rule's actions, in priority order,
//! over a working copy of the notification. A malformed comparison never
//! aborts the pipeline: the offending rule is logged and skipped.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use regex::Regex;
use std::sync::Arc;
use std::sync::OnceLock;

use pulse_core::{
    ChannelSet, EnhancedNotification, Notification, PulseError, UserProfile,
};

use crate::cache::RuleCache;
use crate::model::{
    activity_name, channel_name, priority_name, CompareOp, FieldValue, PersonalizationRule,
    ProfileField, RuleAction, RuleCondition, RuleValue,
};

/// Everything a condition may read.
pub struct RuleContext<'a> {
    pub profile: &'a UserProfile,
    pub notification: &'a Notification,
    pub hour: u32,
}

impl<'a> RuleContext<'a> {
    pub fn new(profile: &'a UserProfile, notification: &'a Notification) -> Self {
        Self { profile, notification, hour: Utc::now().hour() }
    }
}

pub struct RuleEngine {
    cache: Arc<RuleCache>,
}

impl RuleEngine {
    pub fn new(cache: Arc<RuleCache>) -> Self {
        Self { cache }
    }

    /// Run every active rule for the notification's kind against the
    /// profile, accumulating actions in priority order. A matched `Skip`
    /// zeroes all channels and stops further rules.
    pub fn personalize(
        &self,
        notification: Notification,
        profile: &UserProfile,
    ) -> EnhancedNotification {
        let rules = self.cache.for_kind(notification.kind);
        let mut enhanced = EnhancedNotification::from_base(notification);
        enhanced.target_segments = profile.segments.clone();
        enhanced.fallback_channels = profile.behavior.preferred_channels.clone();

        for rule in rules.iter() {
            let ctx = RuleContext::new(profile, &enhanced.base);
            match evaluate(&rule.condition, &ctx) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!("Rule '{}' skipped: {}", rule.name, e);
                    continue;
                }
            }
            tracing::debug!("Rule '{}' matched for {}", rule.name, enhanced.base.id);
            if apply_actions(rule, &mut enhanced, profile) {
                // Skip is terminal.
                break;
            }
        }
        enhanced
    }
}

// ============================================================================
// Condition evaluation
// ============================================================================

/// Evaluate a condition tree. `All` short-circuits false, `Any` true.
pub fn evaluate(cond: &RuleCondition, ctx: &RuleContext) -> Result<bool, PulseError> {
    match cond {
        RuleCondition::Always => Ok(true),
        RuleCondition::All { conditions } => {
            for c in conditions {
                if !evaluate(c, ctx)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        RuleCondition::Any { conditions } => {
            for c in conditions {
                if evaluate(c, ctx)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        RuleCondition::Not { condition } => Ok(!evaluate(condition, ctx)?),
        RuleCondition::Compare { field, op, value } => compare(read_field(*field, ctx), *op, value),
    }
}

fn read_field(field: ProfileField, ctx: &RuleContext) -> FieldValue {
    let behavior = &ctx.profile.behavior;
    match field {
        ProfileField::EngagementRate => FieldValue::Number(behavior.engagement_rate as f64),
        ProfileField::ActivityLevel => FieldValue::Text(activity_name(behavior.activity).into()),
        ProfileField::SessionCount => FieldValue::Number(behavior.session_count as f64),
        ProfileField::Segments => FieldValue::List(ctx.profile.segments.clone()),
        ProfileField::PreferredChannels => FieldValue::List(
            behavior.preferred_channels.iter().map(|c| channel_name(*c).to_string()).collect(),
        ),
        ProfileField::NotificationPriority => {
            FieldValue::Text(priority_name(ctx.notification.priority).into())
        }
        ProfileField::SenderIsPriority => FieldValue::Flag(
            ctx.notification
                .sender_id
                .as_deref()
                .map(|s| ctx.profile.preferences.is_priority(s))
                .unwrap_or(false),
        ),
        ProfileField::HourOfDay => FieldValue::Number(ctx.hour as f64),
    }
}

fn compare(field: FieldValue, op: CompareOp, value: &RuleValue) -> Result<bool, PulseError> {
    let mismatch = |detail: &str| PulseError::RuleEvaluation {
        rule_id: 0,
        detail: format!("type mismatch: {detail}"),
    };

    match (op, &field, value) {
        (CompareOp::Equals, FieldValue::Number(f), RuleValue::Number(v)) => Ok(f == v),
        (CompareOp::Equals, FieldValue::Text(f), RuleValue::Text(v)) => Ok(f == v),
        (CompareOp::Equals, FieldValue::Flag(f), RuleValue::Flag(v)) => Ok(f == v),
        (CompareOp::NotEquals, FieldValue::Number(f), RuleValue::Number(v)) => Ok(f != v),
        (CompareOp::NotEquals, FieldValue::Text(f), RuleValue::Text(v)) => Ok(f != v),
        (CompareOp::NotEquals, FieldValue::Flag(f), RuleValue::Flag(v)) => Ok(f != v),
        (CompareOp::GreaterThan, FieldValue::Number(f), RuleValue::Number(v)) => Ok(f > v),
        (CompareOp::LessThan, FieldValue::Number(f), RuleValue::Number(v)) => Ok(f < v),
        (CompareOp::Contains, FieldValue::List(f), RuleValue::Text(v)) => {
            Ok(f.iter().any(|s| s == v))
        }
        (CompareOp::Contains, FieldValue::Text(f), RuleValue::Text(v)) => Ok(f.contains(v)),
        (CompareOp::In, FieldValue::Text(f), RuleValue::List(v)) => {
            Ok(v.iter().any(|s| s == f))
        }
        (CompareOp::Between, FieldValue::Number(f), RuleValue::Range { min, max }) => {
            Ok(*f >= *min && *f <= *max)
        }
        (op, field, value) => Err(mismatch(&format!("{op:?} on {field:?} vs {value:?}"))),
    }
}

// ============================================================================
// Action application
// ============================================================================

/// Apply a matched rule's actions. Returns true if a `Skip` fired.
fn apply_actions(
    rule: &PersonalizationRule,
    enhanced: &mut EnhancedNotification,
    profile: &UserProfile,
) -> bool {
    for action in &rule.actions {
        match action {
            RuleAction::ModifyContent { template } => {
                enhanced.personalized_content = Some(substitute(template, enhanced, profile));
            }
            RuleAction::ModifyChannels { channels } => {
                let mut set = ChannelSet::of(channels);
                set.intersect(&profile.behavior.preferred_channels);
                enhanced.base.channels = set;
            }
            RuleAction::ModifySchedule => {
                enhanced.scheduled_at =
                    next_optimal_time(Utc::now(), &profile.behavior.optimal_hours);
            }
            RuleAction::ModifyPriority { priority } => {
                enhanced.base.priority = *priority;
            }
            RuleAction::Skip { when } => {
                let ctx = RuleContext::new(profile, &enhanced.base);
                let fires = match when {
                    None => true,
                    Some(cond) => evaluate(cond, &ctx).unwrap_or_else(|e| {
                        tracing::warn!("Skip condition in '{}' unreadable: {}", rule.name, e);
                        false
                    }),
                };
                if fires {
                    enhanced.base.channels.clear();
                    return true;
                }
            }
        }
    }
    false
}

/// Fill `{var}` placeholders from the notification/profile context.
/// Unknown variables are left in place.
fn substitute(template: &str, enhanced: &EnhancedNotification, profile: &UserProfile) -> String {
    static VAR: OnceLock<Regex> = OnceLock::new();
    let re = VAR.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("valid template regex"));

    re.replace_all(template, |caps: &regex::Captures| match &caps[1] {
        "user_name" => profile.user_id.clone(),
        "sender_name" => {
            enhanced.base.sender_id.clone().unwrap_or_else(|| "someone".to_string())
        }
        "content" => enhanced.base.content.clone(),
        "engagement_rate" => format!("{:.0}", profile.behavior.engagement_rate),
        _ => caps[0].to_string(),
    })
    .into_owned()
}

/// Next occurrence of an optimal hour, rolling to the following day when
/// every optimal hour today has already passed.
pub fn next_optimal_time(now: DateTime<Utc>, optimal_hours: &[u32]) -> Option<DateTime<Utc>> {
    let mut hours: Vec<u32> = optimal_hours.iter().copied().filter(|h| *h < 24).collect();
    if hours.is_empty() {
        return None;
    }
    hours.sort_unstable();

    let today = now.date_naive();
    for &h in &hours {
        if h > now.hour() {
            let t = today.and_hms_opt(h, 0, 0)?;
            return Utc.from_local_datetime(&t).single();
        }
    }
    let t = (today + Duration::days(1)).and_hms_opt(hours[0], 0, 0)?;
    Utc.from_local_datetime(&t).single()
}
