//! Rule store and hot-swapped rule cache
//!
//! Rules load once into an immutable snapshot (grouped by kind, sorted by
//! priority descending) that readers share lock-free via `ArcSwap`. Every
//! management write refreshes the snapshot before returning.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use pulse_core::{NotificationKind, PulseError};

use crate::model::PersonalizationRule;

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn all_active(&self) -> Result<Vec<PersonalizationRule>, PulseError>;
    async fn upsert(&self, rule: &PersonalizationRule) -> Result<(), PulseError>;
    async fn delete(&self, id: i64) -> Result<(), PulseError>;
}

type RulesByKind = HashMap<NotificationKind, Vec<PersonalizationRule>>;

pub struct RuleCache {
    store: Arc<dyn RuleStore>,
    snapshot: ArcSwap<RulesByKind>,
}

impl RuleCache {
    /// Build a cache and load the initial snapshot.
    pub async fn load(store: Arc<dyn RuleStore>) -> Result<Arc<Self>, PulseError> {
        let cache = Arc::new(Self { store, snapshot: ArcSwap::from_pointee(HashMap::new()) });
        cache.refresh().await?;
        Ok(cache)
    }

    /// Reload active rules from the store and swap the snapshot.
    pub async fn refresh(&self) -> Result<usize, PulseError> {
        let rules = self.store.all_active().await?;
        let count = rules.len();

        let mut grouped: RulesByKind = HashMap::new();
        for rule in rules {
            grouped.entry(rule.kind).or_default().push(rule);
        }
        for list in grouped.values_mut() {
            list.sort_by(|a, b| b.priority.cmp(&a.priority));
        }

        self.snapshot.store(Arc::new(grouped));
        tracing::info!("Loaded {} personalization rules", count);
        Ok(count)
    }

    /// Rules for a kind, priority-descending. Lock-free read.
    pub fn for_kind(&self, kind: NotificationKind) -> Vec<PersonalizationRule> {
        self.snapshot.load().get(&kind).cloned().unwrap_or_default()
    }
}

/// Management interface: writes go to the store, then the cache snapshot
/// refreshes immediately so the next evaluation sees the change.
pub struct RuleManager {
    store: Arc<dyn RuleStore>,
    cache: Arc<RuleCache>,
}

impl RuleManager {
    pub fn new(store: Arc<dyn RuleStore>, cache: Arc<RuleCache>) -> Self {
        Self { store, cache }
    }

    pub async fn upsert(&self, rule: PersonalizationRule) -> Result<(), PulseError> {
        self.store.upsert(&rule).await?;
        self.cache.refresh().await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), PulseError> {
        self.store.delete(id).await?;
        self.cache.refresh().await?;
        Ok(())
    }
}

/// In-memory rule store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryRuleStore {
    rules: RwLock<HashMap<i64, PersonalizationRule>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn all_active(&self) -> Result<Vec<PersonalizationRule>, PulseError> {
        Ok(self.rules.read().await.values().filter(|r| r.active).cloned().collect())
    }

    async fn upsert(&self, rule: &PersonalizationRule) -> Result<(), PulseError> {
        self.rules.write().await.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), PulseError> {
        self.rules.write().await.remove(&id);
        Ok(())
    }
}
