//! Generic expiring cache
//!
//! Replaces ad-hoc TTL bookkeeping with one abstraction: entries live for a
//! fixed TTL and are never served past it. Writers that change the source of
//! truth call `invalidate` before the next read.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry<V> {
    value: V,
    inserted: Instant,
}

pub struct ExpiringCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    ttl: Duration,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self { entries: RwLock::new(HashMap::new()), ttl }
    }

    /// Fetch a live entry. Expired entries are dropped on access.
    pub async fn get(&self, key: &K) -> Option<V> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(e) if e.inserted.elapsed() < self.ttl => return Some(e.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Entry exists but is past TTL.
        self.entries.write().await.remove(key);
        None
    }

    pub async fn insert(&self, key: K, value: V) {
        self.entries
            .write()
            .await
            .insert(key, Entry { value, inserted: Instant::now() });
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    /// Drop every expired entry. Called opportunistically by housekeeping.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.inserted.elapsed() < self.ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hit_within_ttl() {
        let cache = ExpiringCache::new(Duration::from_secs(60));
        cache.insert("k", 42u32).await;
        assert_eq!(cache.get(&"k").await, Some(42));
    }

    #[tokio::test]
    async fn expired_entry_is_never_served() {
        let cache = ExpiringCache::new(Duration::from_millis(10));
        cache.insert("k", 1u32).await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(cache.get(&"k").await, None);
        // The expired entry was dropped, not just hidden.
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn invalidate_removes_before_next_read() {
        let cache = ExpiringCache::new(Duration::from_secs(60));
        cache.insert("k", 1u32).await;
        cache.invalidate(&"k").await;
        assert_eq!(cache.get(&"k").await, None);
    }

    #[tokio::test]
    async fn purge_counts_expired() {
        let cache = ExpiringCache::new(Duration::from_millis(10));
        cache.insert("a", 1u32).await;
        cache.insert("b", 2u32).await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(cache.purge_expired().await, 2);
    }
}
