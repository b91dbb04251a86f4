//! In-process backend.
//!
//! Entries live in an `IndexMap` behind a read-write lock, so iteration
//! follows insertion order. Expired entries are hidden on read and removed
//! by an optional background sweep.

use async_trait::async_trait;
use bytes::Bytes;
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::info;

use super::spawn_sweeper;
use crate::cache::{Cache, Visitor};
use crate::config::MemorySettings;
use crate::entry::Entry;
use crate::error::CacheResult;
use crate::key::KeyComposer;
use crate::stats::{CacheStats, StatsSnapshot};

/// Shared state of an in-process cache. The sweeper only holds a `Weak`
/// reference to it.
#[derive(Debug)]
struct Store {
    entries: RwLock<IndexMap<String, Entry>>,
    stats: CacheStats,
}

impl Store {
    fn read_lock(&self) -> RwLockReadGuard<'_, IndexMap<String, Entry>> {
        // A panic while holding the lock cannot leave an entry half-written,
        // so the map is still usable after poisoning.
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, IndexMap<String, Entry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Remove `key` only if it is still expired.
    fn remove_expired(&self, key: &str) {
        let mut entries = self.write_lock();
        if entries.get(key).is_some_and(|entry| entry.is_expired()) {
            entries.shift_remove(key);
            self.stats.record_expirations(1);
        }
    }

    /// Remove all expired entries, returning how many were dropped.
    fn cleanup_expired(&self) -> usize {
        let mut entries = self.write_lock();
        let initial_len = entries.len();
        let now = Instant::now();

        entries.retain(|_, entry| !entry.is_expired_at(now));

        let removed = initial_len - entries.len();
        self.stats.record_expirations(removed as u64);
        removed
    }
}

/// Cache backed by an expiring map inside this process.
///
/// `get_and_delete` runs in one critical section and is therefore atomic.
#[derive(Debug)]
pub struct MemoryCache {
    store: Arc<Store>,
    keys: KeyComposer,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryCache {
    /// Create an in-process cache.
    ///
    /// If a sweep interval is configured and a Tokio runtime is available,
    /// a background task removes expired entries on that interval.
    pub fn new(settings: MemorySettings, keys: KeyComposer) -> Self {
        let store = Arc::new(Store {
            entries: RwLock::new(IndexMap::new()),
            stats: CacheStats::new(),
        });

        let sweeper = settings.sweep_interval().and_then(|interval| {
            spawn_sweeper(Arc::downgrade(&store), interval, Store::cleanup_expired)
        });

        info!(
            sweep_interval_secs = settings.sweep_interval_seconds,
            sweeping = sweeper.is_some(),
            "opened in-process cache"
        );

        Self {
            store,
            keys,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Number of entries held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.store.read_lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove expired entries now instead of waiting for the sweep.
    ///
    /// Returns the number of entries that were removed.
    pub fn cleanup_expired(&self) -> usize {
        self.store.cleanup_expired()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let entry = Entry::new(value, ttl, Instant::now());
        let key = self.keys.compose(namespace, key);

        self.store.write_lock().insert(key, entry);
        self.store.stats.record_set();
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> CacheResult<Option<Bytes>> {
        let key = self.keys.compose(namespace, key);
        let lookup = {
            let entries = self.store.read_lock();
            entries
                .get(&key)
                .map(|entry| (!entry.is_expired()).then(|| entry.value().clone()))
        };

        let value = match lookup {
            Some(Some(value)) => Some(value),
            Some(None) => {
                // Expired: needs the write lock to drop it.
                self.store.remove_expired(&key);
                None
            }
            None => None,
        };

        self.store.stats.record_read(value.is_some());
        Ok(value)
    }

    async fn get_and_delete(&self, namespace: &str, key: &str) -> CacheResult<Option<Bytes>> {
        let key = self.keys.compose(namespace, key);
        let removed = self.store.write_lock().shift_remove(&key);

        let value = match removed {
            Some(entry) if entry.is_expired() => {
                self.store.stats.record_expirations(1);
                None
            }
            Some(entry) => {
                self.store.stats.record_delete();
                Some(entry.value)
            }
            None => None,
        };

        self.store.stats.record_read(value.is_some());
        Ok(value)
    }

    async fn exists(&self, namespace: &str, key: &str) -> CacheResult<bool> {
        let key = self.keys.compose(namespace, key);
        let entries = self.store.read_lock();
        Ok(entries.get(&key).is_some_and(|entry| !entry.is_expired()))
    }

    async fn delete(&self, namespace: &str, key: &str) -> CacheResult<()> {
        let key = self.keys.compose(namespace, key);
        if self.store.write_lock().shift_remove(&key).is_some() {
            self.store.stats.record_delete();
        }
        Ok(())
    }

    async fn iterate(&self, namespace: &str, visit: &mut Visitor<'_>) -> CacheResult<()> {
        let prefix = self.keys.prefix(namespace);

        // Snapshot under the read lock so the visitor may call back into the cache.
        let matching: Vec<(String, Bytes)> = {
            let entries = self.store.read_lock();
            let now = Instant::now();
            entries
                .iter()
                .filter(|(key, entry)| key.starts_with(&prefix) && !entry.is_expired_at(now))
                .map(|(key, entry)| (key[prefix.len()..].to_string(), entry.value().clone()))
                .collect()
        };

        for (key, value) in &matching {
            if !visit(key, value) {
                break;
            }
        }
        Ok(())
    }

    async fn close(&self) -> CacheResult<()> {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        self.store.write_lock().clear();
        info!("closed in-process cache");
        Ok(())
    }

    fn stats(&self) -> StatsSnapshot {
        self.store.stats.snapshot()
    }
}

impl Drop for MemoryCache {
    fn drop(&mut self) {
        if let Some(sweeper) = self
            .sweeper
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            sweeper.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> MemoryCache {
        MemoryCache::new(
            MemorySettings::new().sweep_interval_seconds(0),
            KeyComposer::default(),
        )
    }

    #[tokio::test]
    async fn test_basic_set_get() {
        let cache = cache();

        cache.set("ns", "key1", Bytes::from("value1"), None).await.unwrap();
        let result = cache.get("ns", "key1").await.unwrap();

        assert_eq!(result, Some(Bytes::from("value1")));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let cache = cache();
        assert!(cache.get("ns", "nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let cache = cache();

        cache.set("ns", "key1", Bytes::from("value1"), None).await.unwrap();
        cache.set("ns", "key1", Bytes::from("value2"), None).await.unwrap();

        assert_eq!(cache.get("ns", "key1").await.unwrap(), Some(Bytes::from("value2")));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let cache = cache();
        cache.delete("ns", "nonexistent").await.unwrap();
        assert_eq!(cache.stats().deletes, 0);
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let cache = cache();

        cache
            .set("ns", "key1", Bytes::from("value1"), Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!cache.exists("ns", "key1").await.unwrap());
        assert!(cache.get("ns", "key1").await.unwrap().is_none());
        // The read dropped the expired entry.
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_get_and_delete_is_single_step() {
        let cache = cache();

        cache.set("ns", "k", Bytes::from("v"), None).await.unwrap();
        assert_eq!(cache.get_and_delete("ns", "k").await.unwrap(), Some(Bytes::from("v")));
        assert_eq!(cache.get_and_delete("ns", "k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_get_and_delete_expired() {
        let cache = cache();

        cache
            .set("ns", "k", Bytes::from("v"), Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(cache.get_and_delete("ns", "k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_iterate_follows_insertion_order() {
        let cache = cache();
        for key in ["c", "a", "b"] {
            cache.set("n", key, Bytes::from(key), None).await.unwrap();
        }
        cache.set("other", "z", Bytes::from("z"), None).await.unwrap();

        let mut keys = Vec::new();
        cache
            .iterate("n", &mut |key: &str, _: &Bytes| {
                keys.push(key.to_string());
                true
            })
            .await
            .unwrap();

        assert_eq!(keys, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_visitor_may_delete_during_iteration() {
        let cache = cache();
        cache.set("n", "a", Bytes::from("1"), None).await.unwrap();
        cache.set("n", "b", Bytes::from("2"), None).await.unwrap();

        let mut visited = Vec::new();
        cache
            .iterate("n", &mut |key: &str, _: &Bytes| {
                visited.push(key.to_string());
                // Mutating through the store would deadlock if the lock were held.
                cache.store.write_lock().shift_remove(&format!("n:{}", key));
                true
            })
            .await
            .unwrap();

        assert_eq!(visited, vec!["a", "b"]);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let cache = cache();

        cache
            .set("ns", "short", Bytes::from("1"), Some(Duration::from_millis(1)))
            .await
            .unwrap();
        cache.set("ns", "long", Bytes::from("2"), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_background_sweep() {
        let cache = MemoryCache::new(
            MemorySettings::new().sweep_interval_seconds(1),
            KeyComposer::default(),
        );

        cache
            .set("ns", "k", Bytes::from("v"), Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);

        // One sweep period plus slack; no read touches the key meanwhile.
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_close_flushes_and_is_repeatable() {
        let cache = MemoryCache::new(MemorySettings::new(), KeyComposer::default());
        cache.set("ns", "k", Bytes::from("v"), None).await.unwrap();

        cache.close().await.unwrap();
        assert!(cache.is_empty());
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_tracking() {
        let cache = cache();

        cache.set("ns", "key1", Bytes::from("value1"), None).await.unwrap();
        let _ = cache.get("ns", "key1").await.unwrap();
        let _ = cache.get("ns", "missing").await.unwrap();
        cache.delete("ns", "key1").await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.deletes, 1);
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_expire() {
        let cache = cache();
        cache
            .set("ns", "k", Bytes::from("v"), Some(Duration::from_secs(u64::MAX)))
            .await
            .unwrap();

        assert_eq!(cache.get("ns", "k").await.unwrap(), Some(Bytes::from("v")));
        assert_eq!(cache.cleanup_expired(), 0);
    }
}
