//! In-process backing store
//!
//! Holds entities in an ordered map. Every call is counted and faults can be
//! injected per key or for the whole store, which makes it the backend of
//! choice for tests that assert on round trips.

use crate::aggregation::{aggregate_entities, AggregateValue, AggregationQuery};
use crate::datastore::{DatastoreClient, KeyIterator, SnapshotIterator};
use crate::error::{MultiError, Result, StoreError};
use crate::key::{allocate_id, Key};
use crate::mutation::Mutation;
use crate::property::PropertyList;
use crate::query::{evaluate, Query};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Snapshot of call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatastoreStats {
    pub get_multi_calls: u64,
    pub put_multi_calls: u64,
    pub delete_multi_calls: u64,
    pub mutate_calls: u64,
    pub query_calls: u64,
    pub aggregation_calls: u64,
    /// Total keys requested through `get_multi`
    pub keys_fetched: u64,
}

#[derive(Debug, Default)]
struct Counters {
    get_multi: AtomicU64,
    put_multi: AtomicU64,
    delete_multi: AtomicU64,
    mutate: AtomicU64,
    query: AtomicU64,
    aggregation: AtomicU64,
    keys_fetched: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// Ordered in-memory entity store with call counters and fault injection
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    entities: RwLock<BTreeMap<Key, PropertyList>>,
    failing: RwLock<HashSet<Key>>,
    unavailable: AtomicBool,
    counters: Counters,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation touching `key` fail with a query error
    pub async fn fail_key(&self, key: Key) {
        self.failing.write().await.insert(key);
    }

    pub async fn clear_faults(&self) {
        self.failing.write().await.clear();
        self.unavailable.store(false, Ordering::SeqCst);
    }

    /// Make every call fail with a connection error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn stats(&self) -> DatastoreStats {
        let c = &self.counters;
        DatastoreStats {
            get_multi_calls: c.get_multi.load(Ordering::SeqCst),
            put_multi_calls: c.put_multi.load(Ordering::SeqCst),
            delete_multi_calls: c.delete_multi.load(Ordering::SeqCst),
            mutate_calls: c.mutate.load(Ordering::SeqCst),
            query_calls: c.query.load(Ordering::SeqCst),
            aggregation_calls: c.aggregation.load(Ordering::SeqCst),
            keys_fetched: c.keys_fetched.load(Ordering::SeqCst),
        }
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    /// Stored properties of a key, bypassing counters and faults
    pub async fn raw_get(&self, key: &Key) -> Option<PropertyList> {
        self.entities.read().await.get(key).cloned()
    }

    /// Store properties directly, bypassing counters and faults
    pub async fn raw_put(&self, key: Key, properties: PropertyList) {
        self.entities.write().await.insert(key, properties);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::ConnectionError("memory datastore marked unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn injected(key: &Key) -> StoreError {
        StoreError::QueryError(format!("injected fault for {}", key))
    }

    /// Positional check that no key is marked failing
    async fn check_keys<'a, I>(&self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Key>,
    {
        let failing = self.failing.read().await;
        let errors: Vec<Option<StoreError>> = keys
            .into_iter()
            .map(|k| failing.contains(k).then(|| Self::injected(k)))
            .collect();
        if errors.iter().any(Option::is_some) {
            Err(MultiError::new(errors).into())
        } else {
            Ok(())
        }
    }
}

fn complete(key: Key) -> Key {
    if key.is_complete() {
        key
    } else {
        key.completed(allocate_id())
    }
}

fn apply(entities: &mut BTreeMap<Key, PropertyList>, mutation: Mutation) -> Result<Key> {
    match mutation {
        Mutation::Delete(key) => {
            if !key.is_complete() {
                return Err(StoreError::InvalidKey(format!("cannot delete incomplete key {}", key)));
            }
            entities.remove(&key);
            Ok(key)
        }
        Mutation::Insert(key, props) => {
            let key = complete(key);
            if entities.contains_key(&key) {
                return Err(StoreError::AlreadyExists(key.to_string()));
            }
            entities.insert(key.clone(), props);
            Ok(key)
        }
        Mutation::Update(key, props) => {
            if !entities.contains_key(&key) {
                return Err(StoreError::NoSuchEntity);
            }
            entities.insert(key.clone(), props);
            Ok(key)
        }
        Mutation::Upsert(key, props) => {
            let key = complete(key);
            entities.insert(key.clone(), props);
            Ok(key)
        }
    }
}

#[async_trait]
impl DatastoreClient for MemoryDatastore {
    async fn get_multi(&self, keys: &[Key]) -> Result<Vec<Result<PropertyList>>> {
        bump(&self.counters.get_multi);
        self.counters.keys_fetched.fetch_add(keys.len() as u64, Ordering::SeqCst);
        self.check_available()?;

        let entities = self.entities.read().await;
        let failing = self.failing.read().await;
        debug!("Datastore get_multi: {} keys", keys.len());

        Ok(keys
            .iter()
            .map(|key| {
                if failing.contains(key) {
                    Err(Self::injected(key))
                } else if !key.is_complete() {
                    Err(StoreError::InvalidKey(format!("cannot get incomplete key {}", key)))
                } else {
                    entities.get(key).cloned().ok_or(StoreError::NoSuchEntity)
                }
            })
            .collect())
    }

    async fn put_multi(&self, entities: Vec<(Key, PropertyList)>) -> Result<Vec<Key>> {
        bump(&self.counters.put_multi);
        self.check_available()?;
        self.check_keys(entities.iter().map(|(k, _)| k)).await?;

        let mut stored = self.entities.write().await;
        let keys = entities
            .into_iter()
            .map(|(key, props)| {
                let key = complete(key);
                stored.insert(key.clone(), props);
                key
            })
            .collect();
        Ok(keys)
    }

    async fn delete_multi(&self, keys: &[Key]) -> Result<()> {
        bump(&self.counters.delete_multi);
        self.check_available()?;
        self.check_keys(keys).await?;

        let mut stored = self.entities.write().await;
        for key in keys {
            stored.remove(key);
        }
        Ok(())
    }

    async fn mutate(&self, mutations: Vec<Mutation>) -> Result<Vec<Key>> {
        bump(&self.counters.mutate);
        self.check_available()?;
        self.check_keys(mutations.iter().map(Mutation::key)).await?;

        let mut stored = self.entities.write().await;
        // Apply to a copy so that a rejected mutation leaves the store unchanged
        let mut staged = stored.clone();
        let count = mutations.len();
        let mut keys = Vec::with_capacity(count);
        for (i, mutation) in mutations.into_iter().enumerate() {
            match apply(&mut staged, mutation) {
                Ok(key) => keys.push(key),
                Err(e) => {
                    let mut errors: Vec<Option<StoreError>> = (0..count).map(|_| None).collect();
                    errors[i] = Some(e);
                    return Err(MultiError::new(errors).into());
                }
            }
        }
        *stored = staged;
        Ok(keys)
    }

    async fn run_keys(&self, query: &Query) -> Result<Box<dyn KeyIterator>> {
        bump(&self.counters.query);
        self.check_available()?;

        let entities = self.entities.read().await;
        let results = evaluate(query, entities.iter())?
            .into_iter()
            .map(|hit| (hit.key.clone(), hit.cursor()))
            .collect();
        Ok(Box::new(SnapshotIterator::new(
            query.start.clone().unwrap_or_default(),
            results,
        )))
    }

    async fn run_aggregation(&self, query: &AggregationQuery) -> Result<HashMap<String, AggregateValue>> {
        bump(&self.counters.aggregation);
        self.check_available()?;

        let entities = self.entities.read().await;
        let hits = evaluate(&query.query, entities.iter())?;
        Ok(aggregate_entities(&query.aggregates, hits.iter().map(|h| h.properties)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;

    fn props(value: &str) -> PropertyList {
        vec![Property::new("Value", value)]
    }

    #[tokio::test]
    async fn test_get_multi_is_positional() {
        let ds = MemoryDatastore::new();
        let a = Key::name("Kind", "a");
        let b = Key::name("Kind", "b");
        let c = Key::name("Kind", "c");
        ds.raw_put(a.clone(), props("x")).await;
        ds.raw_put(c.clone(), props("z")).await;
        ds.fail_key(c.clone()).await;

        let results = ds.get_multi(&[a, b, c]).await.unwrap();
        assert_eq!(results[0].as_ref().unwrap(), &props("x"));
        assert!(results[1].as_ref().unwrap_err().is_not_found());
        assert!(matches!(results[2], Err(StoreError::QueryError(_))));
        assert_eq!(ds.stats().get_multi_calls, 1);
        assert_eq!(ds.stats().keys_fetched, 3);
    }

    #[tokio::test]
    async fn test_put_completes_incomplete_keys() {
        let ds = MemoryDatastore::new();
        let keys = ds
            .put_multi(vec![(Key::incomplete("Kind"), props("x"))])
            .await
            .unwrap();
        assert!(keys[0].is_complete());
        assert_eq!(ds.raw_get(&keys[0]).await, Some(props("x")));
    }

    #[tokio::test]
    async fn test_mutate_is_atomic() {
        let ds = MemoryDatastore::new();
        let a = Key::name("Kind", "a");
        let b = Key::name("Kind", "b");
        ds.raw_put(a.clone(), props("v1")).await;

        let err = ds
            .mutate(vec![
                Mutation::Upsert(b.clone(), props("new")),
                Mutation::Insert(a.clone(), props("dup")),
            ])
            .await
            .unwrap_err();

        match err {
            StoreError::MultiError(merr) => {
                assert!(merr.get(0).is_none());
                assert!(matches!(merr.get(1), Some(StoreError::AlreadyExists(_))));
            }
            other => panic!("expected multi error, got {:?}", other),
        }
        assert_eq!(ds.raw_get(&a).await, Some(props("v1")));
        assert_eq!(ds.raw_get(&b).await, None);
    }

    #[tokio::test]
    async fn test_unavailable_fails_calls() {
        let ds = MemoryDatastore::new();
        ds.set_unavailable(true);
        let err = ds.get_multi(&[Key::name("Kind", "a")]).await.unwrap_err();
        assert!(matches!(err, StoreError::ConnectionError(_)));
        ds.clear_faults().await;
        assert!(ds.get_multi(&[Key::name("Kind", "a")]).await.is_ok());
    }
}
