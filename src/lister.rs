//! Cursor-paginated listing over a key-only query

use crate::entity::Entity;
use crate::error::Result;
use crate::key::Key;
use crate::query::{Cursor, Query};
use crate::store::EntityStore;
use std::marker::PhantomData;
use tracing::debug;

type KeyFilter = Box<dyn Fn(&Key) -> bool + Send + Sync>;

/// Pages through the entities a query yields.
///
/// The optional key filter skips keys without counting them against the page
/// limit. The returned cursor is empty when there is no further page.
pub struct EntityLister<'a, E> {
    store: &'a EntityStore,
    query: Query,
    filter: Option<KeyFilter>,
    _entity: PhantomData<fn() -> E>,
}

impl<'a, E: Entity> EntityLister<'a, E> {
    pub fn new(store: &'a EntityStore, query: Query) -> Self {
        Self {
            store,
            query,
            filter: None,
            _entity: PhantomData,
        }
    }

    /// Only list keys for which `filter` returns true
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Key) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Up to `limit` matching keys after `cursor`, and the cursor of the next page
    pub async fn get_key_list(&self, limit: usize, cursor: &str) -> Result<(Vec<Key>, String)> {
        let start = Cursor::decode(cursor)?;
        if limit == 0 {
            return Ok((Vec::new(), String::new()));
        }

        let mut iter = self.store.run(self.query.clone().start(start)).await?;
        let mut keys = Vec::new();

        while let Some(key) = iter.next().await? {
            if let Some(filter) = &self.filter {
                if !filter(&key) {
                    continue;
                }
            }
            keys.push(key);
            if keys.len() == limit {
                let position = iter.cursor()?;
                let next = if iter.next().await?.is_some() {
                    position.encode()
                } else {
                    String::new()
                };
                debug!("Listed {} keys, more: {}", keys.len(), !next.is_empty());
                return Ok((keys, next));
            }
        }

        debug!("Listed {} keys, end of results", keys.len());
        Ok((keys, String::new()))
    }

    /// Up to `limit` matching entities after `cursor`, and the cursor of the next page.
    /// Entities deleted between the query and the fetch are skipped.
    pub async fn get_list(&self, limit: usize, cursor: &str) -> Result<(Vec<E>, String)> {
        let (keys, next) = self.get_key_list(limit, cursor).await?;
        if keys.is_empty() {
            return Ok((Vec::new(), String::new()));
        }

        let batch = self.store.get_multi::<E>(&keys).await?;
        let mut entities = Vec::with_capacity(batch.len());
        for item in batch {
            match item {
                Ok(entity) => entities.push(entity),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok((entities, next))
    }
}
