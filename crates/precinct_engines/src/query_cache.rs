#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use precinct_contracts::api::QueryKey;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const SESSION_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Reads are only refetched once stale or invalidated. The cache has no focus hook and never
/// retries; retries belong to the mutation wrapper alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPolicy {
    pub stale_after: Duration,
}

impl QueryPolicy {
    pub fn session_v1() -> Self {
        Self {
            stale_after: SESSION_STALE_AFTER,
        }
    }
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self::session_v1()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    fetched_at: Instant,
    invalidated: bool,
}

/// Explicit query store shared by the session view and the forms that invalidate it.
#[derive(Debug, Default)]
pub struct QueryCache {
    policy: QueryPolicy,
    entries: Mutex<BTreeMap<QueryKey, CacheEntry>>,
}

impl QueryCache {
    pub fn new(policy: QueryPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn put<T: Serialize>(&self, key: &QueryKey, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                warn!(%key, error = %err, "query value not cacheable");
                return;
            }
        };
        self.entries().insert(
            key.clone(),
            CacheEntry {
                value,
                fetched_at: Instant::now(),
                invalidated: false,
            },
        );
    }

    /// Cached value if present, not invalidated and younger than `stale_after`.
    pub fn get_fresh<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let entries = self.entries();
        let entry = entries.get(key)?;
        if entry.invalidated || entry.fetched_at.elapsed() >= self.policy.stale_after {
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    /// Marks the named queries stale so their next read refetches. Returns how many were cached.
    pub fn invalidate(&self, keys: &[QueryKey]) -> usize {
        let mut entries = self.entries();
        let mut hit = 0;
        for key in keys {
            if let Some(entry) = entries.get_mut(key) {
                entry.invalidated = true;
                hit += 1;
            }
        }
        if !keys.is_empty() {
            debug!(requested = keys.len(), hit, "queries invalidated");
        }
        hit
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<QueryKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn at_query_cache_01_values_go_stale_after_five_minutes() {
        let cache = QueryCache::new(QueryPolicy::session_v1());
        let key = QueryKey::session();
        cache.put(&key, &Some(7u32));
        assert_eq!(cache.get_fresh::<Option<u32>>(&key), Some(Some(7)));

        tokio::time::advance(SESSION_STALE_AFTER - Duration::from_millis(1)).await;
        assert_eq!(cache.get_fresh::<Option<u32>>(&key), Some(Some(7)));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get_fresh::<Option<u32>>(&key), None);
    }

    #[tokio::test]
    async fn at_query_cache_02_invalidate_is_selective() {
        let cache = QueryCache::default();
        cache.put(&QueryKey::session(), &1u8);
        cache.put(&QueryKey::discord_status(), &2u8);

        let hit = cache.invalidate(&[QueryKey::session(), QueryKey::new("/api/unknown")]);
        assert_eq!(hit, 1);
        assert_eq!(cache.get_fresh::<u8>(&QueryKey::session()), None);
        assert_eq!(cache.get_fresh::<u8>(&QueryKey::discord_status()), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn at_query_cache_03_put_after_invalidate_is_fresh_again() {
        let cache = QueryCache::default();
        cache.put(&QueryKey::session(), &1u8);
        cache.invalidate(&[QueryKey::session()]);
        cache.put(&QueryKey::session(), &3u8);
        assert_eq!(cache.get_fresh::<u8>(&QueryKey::session()), Some(3));
    }
}
