//! Multi-key read-through reconciliation
//!
//! One batch read makes at most one cache round trip and one backing store
//! round trip:
//!
//! 1. Look up every distinct requested key in the cache. A cache fault is
//!    logged and treated as a full miss.
//! 2. Fetch the distinct keys the cache did not satisfy with one `get_multi`.
//! 3. Place every outcome at each input position holding its key, then
//!    hydrate. A codec failure aborts the read before anything is cached.
//! 4. Write the freshly fetched property lists (never the cache hits, never
//!    not-found results) to the cache in one `set`.

use crate::batch::BatchResult;
use crate::entity::Entity;
use crate::error::{Result, StoreError};
use crate::key::Key;
use crate::property::PropertyList;
use crate::store::EntityStore;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Distinct keys in first-appearance order, and the input positions of each
fn index_positions(keys: &[Key]) -> (Vec<&Key>, HashMap<&Key, Vec<usize>>) {
    let mut unique = Vec::with_capacity(keys.len());
    let mut positions: HashMap<&Key, Vec<usize>> = HashMap::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
        let slots = positions.entry(key).or_default();
        if slots.is_empty() {
            unique.push(key);
        }
        slots.push(i);
    }
    (unique, positions)
}

/// Read `keys` through the cache, returning one outcome per input position
pub(crate) async fn fetch_many<E: Entity>(store: &EntityStore, keys: &[Key]) -> Result<BatchResult<E>> {
    if keys.is_empty() {
        return Ok(BatchResult::new(Vec::new()));
    }

    let (unique, positions) = index_positions(keys);
    let lookup: Vec<Key> = unique.iter().map(|k| (*k).clone()).collect();

    let cached = match store.call_cache(store.cachestore().get_entities(&lookup)).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!("Cache get failed for {} keys, reading from datastore: {}", lookup.len(), e);
            HashMap::new()
        }
    };

    let misses: Vec<Key> = lookup.into_iter().filter(|k| !cached.contains_key(k)).collect();
    debug!(
        "Reconciling {} keys ({} distinct): {} cache hits, {} misses",
        keys.len(),
        unique.len(),
        unique.len() - misses.len(),
        misses.len()
    );

    let fetched = if misses.is_empty() {
        Vec::new()
    } else {
        let results = store
            .call_store("get_multi", store.client().get_multi(&misses))
            .await?;
        if results.len() != misses.len() {
            return Err(StoreError::Other(format!(
                "datastore returned {} results for {} keys",
                results.len(),
                misses.len()
            )));
        }
        misses.into_iter().zip(results).collect()
    };

    let mut slots: Vec<Option<Result<E>>> = (0..keys.len()).map(|_| None).collect();

    for (key, props) in &cached {
        if let Some(indexes) = positions.get(key) {
            for &i in indexes {
                slots[i] = Some(Ok(E::load(props)?));
            }
        }
    }

    let mut fresh: HashMap<Key, PropertyList> = HashMap::new();
    for (key, result) in fetched {
        let indexes = match positions.get(&key) {
            Some(indexes) => indexes,
            None => continue,
        };
        match result {
            Ok(props) => {
                for &i in indexes {
                    slots[i] = Some(Ok(E::load(&props)?));
                }
                fresh.insert(key, props);
            }
            Err(e) => {
                if let Some((&last, rest)) = indexes.split_last() {
                    for &i in rest {
                        slots[i] = Some(Err(e.replicate()));
                    }
                    slots[last] = Some(Err(e));
                }
            }
        }
    }

    if !fresh.is_empty() {
        let count = fresh.len();
        match store.call_cache(store.cachestore().set_entities(fresh)).await {
            Ok(()) => debug!("Cached {} fetched entities", count),
            Err(e) if e.is_size_exceeded() => {
                warn!("Some fetched entities were not cached: {}", e)
            }
            Err(e) => warn!("Cache set failed for {} entities: {}", count, e),
        }
    }

    let items = slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(StoreError::Other("unresolved batch position".to_string()))))
        .collect();
    Ok(BatchResult::new(items))
}
