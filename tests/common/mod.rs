//! Shared fixtures for integration tests

#![allow(dead_code)]

use entitystore::{
    Cachestore, DatastoreClient, Entity, EntityBase, EntityStore, Key, MemoryDatastore, MemoryStore, StoreConfig,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const KIND: &str = "TestEntity";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestEntity {
    #[serde(flatten)]
    pub base: EntityBase,
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Value")]
    pub value: i64,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,
}

impl TestEntity {
    pub fn new(id: &str, value: i64) -> Self {
        Self {
            id: id.to_string(),
            value,
            ..Default::default()
        }
    }
}

impl Entity for TestEntity {
    fn key(&self) -> Key {
        Key::name(KIND, self.id.clone())
    }

    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntityBase {
        &mut self.base
    }

    fn current_schema_version(&self) -> i64 {
        2
    }
}

pub fn key(id: &str) -> Key {
    Key::name(KIND, id)
}

/// Store over counted in-memory backends
pub struct Harness {
    pub datastore: Arc<MemoryDatastore>,
    pub cache: Arc<MemoryStore>,
    pub store: EntityStore,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_cache(MemoryStore::new())
    }

    pub fn with_cache(cache: MemoryStore) -> Self {
        let datastore = Arc::new(MemoryDatastore::new());
        let cache = Arc::new(cache);
        let config = StoreConfig::builder()
            .cachestore(cache.clone() as Arc<dyn Cachestore>)
            .operation_timeout(Duration::from_secs(5))
            .build();
        let store = EntityStore::new(datastore.clone() as Arc<dyn DatastoreClient>, config)
            .expect("valid config");
        Self {
            datastore,
            cache,
            store,
        }
    }

    /// Write entities straight into the datastore, leaving the cache and counters alone
    pub async fn seed(&self, entities: &[TestEntity]) {
        for entity in entities {
            let props = entity.save().expect("save");
            self.datastore.raw_put(entity.key(), props).await;
        }
    }
}
