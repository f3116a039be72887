//! Integration tests for multi-rule accumulation and skip dominance.

use std::sync::Arc;

use pulse_core::{ActivityLevel, Channel, NotificationKind, Priority, Notification, UserProfile};
use pulse_rules::{
    CompareOp, MemoryRuleStore, PersonalizationRule, ProfileField, RuleAction, RuleCache,
    RuleCondition, RuleEngine, RuleStore, RuleValue,
};

fn profile() -> UserProfile {
    let mut p = UserProfile::fresh("alice");
    p.behavior.engagement_rate = 70.0;
    p.behavior.activity = ActivityLevel::High;
    p.behavior.preferred_channels = vec![Channel::Push, Channel::Email];
    p
}

fn rule(id: i64, priority: i32, actions: Vec<RuleAction>) -> PersonalizationRule {
    PersonalizationRule {
        id,
        name: format!("rule-{id}"),
        kind: NotificationKind::Like,
        condition: RuleCondition::Always,
        actions,
        priority,
        active: true,
    }
}

async fn engine_with(rules: Vec<PersonalizationRule>) -> RuleEngine {
    let store = Arc::new(MemoryRuleStore::new());
    for r in rules {
        store.upsert(&r).await.unwrap();
    }
    let cache = RuleCache::load(store).await.unwrap();
    RuleEngine::new(cache)
}

#[tokio::test]
async fn effects_of_both_matching_rules_accumulate() {
    let engine = engine_with(vec![
        rule(1, 100, vec![RuleAction::ModifyPriority { priority: Priority::High }]),
        rule(2, 10, vec![RuleAction::ModifyContent { template: "{sender_name} liked it".into() }]),
    ])
    .await;

    let n = Notification::new("alice", NotificationKind::Like, "liked").with_sender("bob");
    let out = engine.personalize(n, &profile());

    assert_eq!(out.base.priority, Priority::High);
    assert_eq!(out.effective_content(), "bob liked it");
    assert!(out.base.channels.any_enabled());
}

#[tokio::test]
async fn skip_dominates_lower_priority_enabling_rules() {
    let engine = engine_with(vec![
        rule(1, 100, vec![RuleAction::Skip { when: None }]),
        rule(2, 10, vec![RuleAction::ModifyChannels { channels: vec![Channel::Push] }]),
    ])
    .await;

    let n = Notification::new("alice", NotificationKind::Like, "liked");
    let out = engine.personalize(n, &profile());

    assert!(!out.base.channels.any_enabled());
}

#[tokio::test]
async fn conditional_skip_only_fires_when_condition_holds() {
    let skip_low_engagement = RuleAction::Skip {
        when: Some(RuleCondition::Compare {
            field: ProfileField::EngagementRate,
            op: CompareOp::LessThan,
            value: RuleValue::Number(20.0),
        }),
    };
    let engine = engine_with(vec![rule(1, 100, vec![skip_low_engagement])]).await;

    // Engagement 70 ⇒ skip does not fire.
    let n = Notification::new("alice", NotificationKind::Like, "liked");
    let out = engine.personalize(n, &profile());
    assert!(out.base.channels.any_enabled());

    // Engagement 5 ⇒ skip fires.
    let mut low = profile();
    low.behavior.engagement_rate = 5.0;
    let n = Notification::new("alice", NotificationKind::Like, "liked");
    let out = engine.personalize(n, &low);
    assert!(!out.base.channels.any_enabled());
}

#[tokio::test]
async fn modify_channels_intersects_with_preferred() {
    // Sms requested but not preferred ⇒ dropped; Push survives.
    let engine = engine_with(vec![rule(
        1,
        50,
        vec![RuleAction::ModifyChannels { channels: vec![Channel::Push, Channel::Sms] }],
    )])
    .await;

    let n = Notification::new("alice", NotificationKind::Like, "liked");
    let out = engine.personalize(n, &profile());

    assert!(out.base.channels.is_enabled(Channel::Push));
    assert!(!out.base.channels.is_enabled(Channel::Sms));
}

#[tokio::test]
async fn inactive_and_other_kind_rules_do_not_apply() {
    let mut follow_rule =
        rule(1, 50, vec![RuleAction::ModifyPriority { priority: Priority::Urgent }]);
    follow_rule.kind = NotificationKind::Follow;
    let mut inactive = rule(2, 50, vec![RuleAction::Skip { when: None }]);
    inactive.active = false;

    let engine = engine_with(vec![follow_rule, inactive]).await;
    let n = Notification::new("alice", NotificationKind::Like, "liked");
    let out = engine.personalize(n, &profile());

    assert_eq!(out.base.priority, Priority::Normal);
    assert!(out.base.channels.any_enabled());
}
