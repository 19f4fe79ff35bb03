//! In-process map cachestore

use crate::cache::Cachestore;
use crate::error::{CacheError, CacheResult};
use crate::key::Key;
use crate::property::{encoded_size, PropertyList};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Call counters of a [`MemoryStore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    pub get_calls: u64,
    pub set_calls: u64,
    pub delete_calls: u64,
}

/// Map-backed cachestore guarded by a lock.
///
/// Safe to share between tasks. Mostly useful for tests and single-process
/// deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Key, PropertyList>>,
    size_limit: Option<usize>,
    unavailable: AtomicBool,
    get_calls: AtomicU64,
    set_calls: AtomicU64,
    delete_calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject values whose serialized size exceeds `limit` bytes
    pub fn with_size_limit(limit: usize) -> Self {
        Self {
            size_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Make every call fail with `CacheError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn contains_key(&self, key: &Key) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// Stored keys, sorted
    pub async fn keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub fn stats(&self) -> MemoryStoreStats {
        MemoryStoreStats {
            get_calls: self.get_calls.load(Ordering::SeqCst),
            set_calls: self.set_calls.load(Ordering::SeqCst),
            delete_calls: self.delete_calls.load(Ordering::SeqCst),
        }
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("memory store marked unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Cachestore for MemoryStore {
    async fn get_entities(&self, keys: &[Key]) -> CacheResult<HashMap<Key, PropertyList>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .filter_map(|k| entries.get(k).map(|props| (k.clone(), props.clone())))
            .collect())
    }

    async fn set_entities(&self, entities: HashMap<Key, PropertyList>) -> CacheResult<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let mut rejected = Vec::new();
        let mut entries = self.entries.write().await;
        for (key, props) in entities {
            match self.size_limit {
                Some(limit) if encoded_size(&props) > limit => {
                    debug!("Rejecting oversized cache entry: {}", key);
                    rejected.push(key);
                }
                _ => {
                    entries.insert(key, props);
                }
            }
        }
        match (rejected.is_empty(), self.size_limit) {
            (false, Some(limit)) => Err(CacheError::SizeExceeded { keys: rejected, limit }),
            _ => Ok(()),
        }
    }

    async fn delete_entities(&self, keys: &[Key]) -> CacheResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}
