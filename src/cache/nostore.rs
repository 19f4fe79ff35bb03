//! Cachestore that caches nothing

use crate::cache::Cachestore;
use crate::error::CacheResult;
use crate::key::Key;
use crate::property::PropertyList;
use async_trait::async_trait;
use std::collections::HashMap;

/// No-op cachestore, used when caching is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct Nostore;

#[async_trait]
impl Cachestore for Nostore {
    async fn get_entities(&self, _keys: &[Key]) -> CacheResult<HashMap<Key, PropertyList>> {
        Ok(HashMap::new())
    }

    async fn set_entities(&self, _entities: HashMap<Key, PropertyList>) -> CacheResult<()> {
        Ok(())
    }

    async fn delete_entities(&self, _keys: &[Key]) -> CacheResult<()> {
        Ok(())
    }
}
