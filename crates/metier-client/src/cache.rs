//! Process-wide query cache with TTL freshness.
//!
//! One [`QueryCache`] is constructed per process/session and owned by the
//! [`QueryClient`](crate::query::QueryClient); nothing here is a module-level
//! global. Entries are idempotent re-reads of external state, so concurrent
//! writers are last-write-wins per key. Growth is bounded by the periodic
//! [`purge_stale`](QueryCache::purge_stale) sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// How long a cached result stays servable without a remote read.
pub const QUERY_TTL: Duration = Duration::from_secs(30);

/// A cached read result.
#[derive(Debug, Clone)]
struct CacheEntry {
    rows: Vec<Value>,
    fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Keyed cache of query results.
///
/// Keys are the deterministic signature of (resource, projection, filter),
/// computed by [`QuerySpec::key`](crate::query::QuerySpec::key).
#[derive(Clone)]
pub struct QueryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_ttl(QUERY_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Return the cached rows for `key` if the entry is still fresh.
    pub async fn get_fresh(&self, key: &str) -> Option<Vec<Value>> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| {
                debug!(key, "query served from cache");
                entry.rows.clone()
            })
    }

    /// Store rows under `key`, stamped now. Last write wins.
    pub async fn put(&self, key: &str, rows: Vec<Value>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                rows,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drop the entry for `key`, if any.
    pub async fn invalidate(&self, key: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }

    /// Evict every stale entry; returns how many were dropped.
    pub async fn purge_stale(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(self.ttl));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "purged stale query cache entries");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn entry_goes_stale_after_ttl() {
        let cache = QueryCache::new();
        cache.put("k", vec![json!({"id": 1})]).await;

        assert!(cache.get_fresh("k").await.is_some());

        tokio::time::advance(QUERY_TTL + Duration::from_millis(1)).await;
        assert!(cache.get_fresh("k").await.is_none());
        // Staleness does not evict; the sweep does.
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.purge_stale().await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn invalidate_drops_only_the_matching_key() {
        let cache = QueryCache::new();
        cache.put("a", vec![]).await;
        cache.put("b", vec![]).await;
        cache.invalidate("a").await;
        assert!(cache.get_fresh("a").await.is_none());
        assert!(cache.get_fresh("b").await.is_some());
    }
}
