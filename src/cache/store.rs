//! Bounded in-process cachestore with expiry and LRU eviction

use crate::cache::{config::TtlStoreConfig, entry::CacheEntry, stats::CacheStats, Cachestore};
use crate::error::{CacheError, CacheResult, Result, StoreError};
use crate::key::Key;
use crate::property::{self, PropertyList};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Cachestore holding serialized property lists in process memory
///
/// Entries expire after the configured lifetime (with jitter) and the least
/// recently used ones are evicted once `max_entries` or `max_total_bytes` is
/// reached. Values larger than `max_value_bytes` are refused and reported
/// with `CacheError::SizeExceeded`.
pub struct TtlStore {
    config: TtlStoreConfig,
    shelf: Arc<RwLock<Shelf>>,
}

#[derive(Default)]
struct Shelf {
    entries: HashMap<String, CacheEntry>,
    /// Eviction order, front is evicted first
    order: VecDeque<String>,
    bytes: usize,
    stats: CacheStats,
}

impl Shelf {
    fn take(&mut self, cache_key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(cache_key)?;
        self.order.retain(|k| k != cache_key);
        self.bytes = self.bytes.saturating_sub(entry.footprint(cache_key));
        Some(entry)
    }

    fn touch(&mut self, cache_key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == cache_key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    fn evict_oldest(&mut self) -> bool {
        match self.order.pop_front() {
            Some(cache_key) => {
                debug!("Evicting cache entry: {}", cache_key);
                if let Some(entry) = self.entries.remove(&cache_key) {
                    self.bytes = self.bytes.saturating_sub(entry.footprint(&cache_key));
                }
                self.stats.evicted += 1;
                true
            }
            None => false,
        }
    }

    /// Insert `entry`, evicting until it fits. Returns false when the entry
    /// is larger than the whole store.
    fn admit(&mut self, cache_key: String, entry: CacheEntry, config: &TtlStoreConfig) -> bool {
        self.take(&cache_key);

        let needed = entry.footprint(&cache_key);
        if needed > config.max_total_bytes {
            return false;
        }

        while self.entries.len() >= config.max_entries && self.evict_oldest() {}
        while self.bytes + needed > config.max_total_bytes {
            if !self.evict_oldest() {
                warn!("Cache byte limit reached with nothing left to evict");
                return false;
            }
        }

        self.bytes += needed;
        self.entries.insert(cache_key.clone(), entry);
        self.order.push_back(cache_key);
        true
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            bytes: self.bytes,
            ..self.stats
        }
    }
}

impl TtlStore {
    /// Build a store; an invalid configuration is a `ConfigError`
    pub fn new(config: TtlStoreConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| StoreError::ConfigError(format!("invalid TTL store config: {}", e)))?;

        info!(
            "TTL cachestore: ttl={:?}, max_entries={}, max_total_bytes={}",
            config.ttl, config.max_entries, config.max_total_bytes
        );

        Ok(Self {
            config,
            shelf: Arc::new(RwLock::new(Shelf::default())),
        })
    }

    pub fn config(&self) -> &TtlStoreConfig {
        &self.config
    }

    /// Cache key for an entity key: prefix plus encoded key
    pub fn cache_key(&self, key: &Key) -> String {
        format!("{}{}", self.config.key_prefix, key.encode())
    }

    /// Whether `key` holds an unexpired entry; does not count as a read
    pub async fn contains_key(&self, key: &Key) -> bool {
        let shelf = self.shelf.read().await;
        shelf
            .entries
            .get(&self.cache_key(key))
            .is_some_and(|e| !e.is_expired())
    }

    pub async fn clear(&self) {
        let mut shelf = self.shelf.write().await;
        let count = shelf.entries.len();

        shelf.entries.clear();
        shelf.order.clear();
        shelf.bytes = 0;
        shelf.stats.invalidated += count as u64;

        info!("Cleared {} cache entries", count);
    }

    /// Drop every expired entry, returning how many went
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut shelf = self.shelf.write().await;

        let stale: Vec<String> = shelf
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(cache_key, _)| cache_key.clone())
            .collect();
        for cache_key in &stale {
            shelf.take(cache_key);
        }
        shelf.stats.expired += stale.len() as u64;

        if !stale.is_empty() {
            debug!("Removed {} expired cache entries", stale.len());
        }
        stale.len()
    }

    pub async fn stats(&self) -> CacheStats {
        self.shelf.read().await.snapshot()
    }

    pub async fn size_bytes(&self) -> usize {
        self.shelf.read().await.bytes
    }

    pub async fn len(&self) -> usize {
        self.shelf.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Cachestore for TtlStore {
    async fn get_entities(&self, keys: &[Key]) -> CacheResult<HashMap<Key, PropertyList>> {
        let now = Utc::now();
        let mut shelf = self.shelf.write().await;
        let mut found = HashMap::with_capacity(keys.len());

        for key in keys {
            let cache_key = self.cache_key(key);
            let expired = match shelf.entries.get(&cache_key) {
                Some(entry) => entry.is_expired_at(now),
                None => {
                    shelf.stats.misses += 1;
                    continue;
                }
            };
            if expired {
                debug!("Cache entry expired: {}", key);
                shelf.take(&cache_key);
                shelf.stats.expired += 1;
                shelf.stats.misses += 1;
                continue;
            }

            let bytes = match shelf.entries.get_mut(&cache_key) {
                Some(entry) => {
                    entry.record_read();
                    entry.bytes.clone()
                }
                None => continue,
            };

            let props = property::from_bytes(&bytes).map_err(|e| CacheError::Encoding(e.to_string()))?;
            if self.config.refresh_on_read {
                shelf.touch(&cache_key);
            }
            shelf.stats.hits += 1;
            found.insert(key.clone(), props);
        }

        debug!("Cache lookup: {} of {} keys found", found.len(), keys.len());
        Ok(found)
    }

    async fn set_entities(&self, entities: HashMap<Key, PropertyList>) -> CacheResult<()> {
        let mut encoded = Vec::with_capacity(entities.len());
        for (key, props) in entities {
            let bytes = property::to_bytes(&props).map_err(|e| CacheError::Encoding(e.to_string()))?;
            encoded.push((key, bytes));
        }

        let mut shelf = self.shelf.write().await;
        let mut refused = Vec::new();

        for (key, bytes) in encoded {
            let admitted = bytes.len() <= self.config.max_value_bytes
                && shelf.admit(
                    self.cache_key(&key),
                    CacheEntry::new(bytes, self.config.entry_ttl()),
                    &self.config,
                );
            if !admitted {
                debug!("Refusing oversized cache entry: {}", key);
                shelf.stats.oversize += 1;
                refused.push(key);
            }
        }

        if refused.is_empty() {
            Ok(())
        } else {
            Err(CacheError::SizeExceeded {
                keys: refused,
                limit: self.config.max_value_bytes,
            })
        }
    }

    async fn delete_entities(&self, keys: &[Key]) -> CacheResult<()> {
        let mut shelf = self.shelf.write().await;
        for key in keys {
            if shelf.take(&self.cache_key(key)).is_some() {
                shelf.stats.invalidated += 1;
            }
        }
        Ok(())
    }
}

/// Sweep expired entries every `sweep_interval`; spawn it to enable
pub async fn start_auto_cleanup(cache: Arc<TtlStore>) {
    let interval = cache.config.sweep_interval;
    info!("Starting cache sweep every {:?}", interval);

    loop {
        tokio::time::sleep(interval).await;
        cache.cleanup_expired().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;
    use std::time::Duration;

    fn props(value: &str) -> PropertyList {
        vec![Property::new("Value", value)]
    }

    fn one(key: &Key, value: &str) -> HashMap<Key, PropertyList> {
        HashMap::from([(key.clone(), props(value))])
    }

    fn short_lived(ttl: Duration) -> TtlStore {
        TtlStore::new(TtlStoreConfig::builder().ttl(ttl).ttl_jitter(0.0).build()).unwrap()
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = TtlStore::new(TtlStoreConfig::default()).unwrap();
        let key = Key::name("Kind", "a");

        cache.set_entities(one(&key, "x")).await.unwrap();
        let found = cache.get_entities(&[key.clone(), Key::name("Kind", "b")]).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found.get(&key), Some(&props("x")));
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = short_lived(Duration::from_millis(100));
        let key = Key::name("Kind", "a");

        cache.set_entities(one(&key, "x")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cache.get_entities(&[key]).await.unwrap().is_empty());
        let stats = cache.stats().await;
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn test_read_refreshes_eviction_order() {
        let cache = TtlStore::new(TtlStoreConfig::builder().max_entries(2).build()).unwrap();
        let (a, b, c) = (Key::name("Kind", "a"), Key::name("Kind", "b"), Key::name("Kind", "c"));

        cache.set_entities(one(&a, "1")).await.unwrap();
        cache.set_entities(one(&b, "2")).await.unwrap();
        cache.get_entities(&[a.clone()]).await.unwrap();
        cache.set_entities(one(&c, "3")).await.unwrap();

        assert!(cache.contains_key(&a).await);
        assert!(!cache.contains_key(&b).await);
        assert!(cache.contains_key(&c).await);
        assert_eq!(cache.stats().await.evicted, 1);
    }

    #[tokio::test]
    async fn test_write_order_eviction_without_refresh() {
        let config = TtlStoreConfig::builder().max_entries(2).refresh_on_read(false).build();
        let cache = TtlStore::new(config).unwrap();
        let (a, b, c) = (Key::name("Kind", "a"), Key::name("Kind", "b"), Key::name("Kind", "c"));

        cache.set_entities(one(&a, "1")).await.unwrap();
        cache.set_entities(one(&b, "2")).await.unwrap();
        cache.get_entities(&[a.clone()]).await.unwrap();
        cache.set_entities(one(&c, "3")).await.unwrap();

        assert!(!cache.contains_key(&a).await);
        assert!(cache.contains_key(&b).await);
    }

    #[tokio::test]
    async fn test_oversized_value_is_refused_alone() {
        let cache = TtlStore::new(TtlStoreConfig::builder().max_value_bytes(128).build()).unwrap();
        let small = Key::name("Kind", "small");
        let big = Key::name("Kind", "big");

        let err = cache
            .set_entities(HashMap::from([
                (small.clone(), props("x")),
                (big.clone(), props(&"y".repeat(1024))),
            ]))
            .await
            .unwrap_err();

        assert!(err.is_size_exceeded());
        assert_eq!(err, CacheError::SizeExceeded { keys: vec![big.clone()], limit: 128 });
        assert!(cache.contains_key(&small).await);
        assert!(!cache.contains_key(&big).await);
        assert_eq!(cache.stats().await.oversize, 1);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_byte_count() {
        let cache = TtlStore::new(TtlStoreConfig::default()).unwrap();
        let key = Key::name("Kind", "a");

        cache.set_entities(one(&key, "x")).await.unwrap();
        let before = cache.size_bytes().await;
        cache.set_entities(one(&key, "y")).await.unwrap();

        assert_eq!(cache.size_bytes().await, before);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = TtlStore::new(TtlStoreConfig::default()).unwrap();
        let (a, b) = (Key::name("Kind", "a"), Key::name("Kind", "b"));
        cache.set_entities(one(&a, "1")).await.unwrap();
        cache.set_entities(one(&b, "2")).await.unwrap();

        cache.delete_entities(&[a.clone(), Key::name("Kind", "absent")]).await.unwrap();
        assert!(!cache.contains_key(&a).await);
        assert_eq!(cache.stats().await.invalidated, 1);

        cache.clear().await;
        assert!(cache.is_empty().await);
        assert_eq!(cache.size_bytes().await, 0);
        assert_eq!(cache.stats().await.invalidated, 2);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let cache = short_lived(Duration::from_millis(50));
        cache.set_entities(one(&Key::name("Kind", "a"), "1")).await.unwrap();
        cache.set_entities(one(&Key::name("Kind", "b"), "2")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(cache.cleanup_expired().await, 2);
        assert_eq!(cache.len().await, 0);
        assert_eq!(cache.stats().await.expired, 2);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = TtlStoreConfig::builder().ttl_jitter(-0.5).build();
        assert!(matches!(TtlStore::new(config), Err(StoreError::ConfigError(_))));

        let config = TtlStoreConfig::builder().max_entries(0).build();
        assert!(TtlStore::new(config).is_err());
    }

    #[test]
    fn test_cache_key_uses_prefix() {
        let cache = TtlStore::new(TtlStoreConfig::default()).unwrap();
        let key = Key::name("Kind", "a");
        assert_eq!(cache.cache_key(&key), format!("DatastoreCache:{}", key.encode()));
    }
}
