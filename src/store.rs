//! The `EntityStore` handle
//!
//! Reads go through the reconciliation engine (cache first, one batched
//! backing store fetch for the misses). Writes go to the backing store first
//! and invalidate the affected cache entries only after the write succeeded.

use crate::aggregation::{AggregateKind, AggregateValue, AggregationQuery};
use crate::batch::BatchResult;
use crate::cache::Cachestore;
use crate::config::{Neo4jOptions, StoreConfig};
use crate::datastore::{DatastoreClient, KeyIterator, Neo4jDatastore};
use crate::entity::{prepare_for_put, Entity};
use crate::error::{is_problem, CacheError, CacheResult, Result, StoreError};
use crate::key::Key;
use crate::mutation::Mutation;
use crate::property::PropertyList;
use crate::query::Query;
use crate::reconcile::fetch_many;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, debug_span, error, warn, Instrument, Span};

/// Handle over a backing store and an optional cache.
///
/// Cloning is cheap; clones share the client, the cache and the span.
#[derive(Clone)]
pub struct EntityStore {
    client: Arc<dyn DatastoreClient>,
    cache: Arc<dyn Cachestore>,
    config: StoreConfig,
    span: Span,
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore").field("config", &self.config).finish()
    }
}

impl EntityStore {
    /// Create a store over an existing backing store client
    pub fn new(client: Arc<dyn DatastoreClient>, config: StoreConfig) -> Result<Self> {
        config.validate().map_err(StoreError::ConfigError)?;

        let cache = config.cachestore_or_default();
        let span = config.span_or_default();
        Ok(Self {
            client,
            cache,
            config,
            span,
        })
    }

    /// Connect to Neo4j and create a store over it
    pub async fn connect_neo4j(options: &Neo4jOptions, config: StoreConfig) -> Result<Self> {
        config.validate().map_err(StoreError::ConfigError)?;
        let client = Neo4jDatastore::connect(options, &config.database_id).await?;
        Self::new(Arc::new(client), config)
    }

    pub fn client(&self) -> &Arc<dyn DatastoreClient> {
        &self.client
    }

    pub fn cachestore(&self) -> &Arc<dyn Cachestore> {
        &self.cache
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Span that store operations are recorded under
    pub fn span(&self) -> &Span {
        &self.span
    }

    fn op_span(&self, op: &'static str) -> Span {
        debug_span!(parent: &self.span, "op", op)
    }

    /// Run a backing store call under the operation timeout
    pub(crate) async fn call_store<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let result = match self.config.operation_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::TimeoutError {
                    timeout_ms: limit.as_millis() as u64,
                    context: op.to_string(),
                }),
            },
            None => fut.await,
        };

        if let Err(e) = &result {
            if is_problem(e) {
                error!("Datastore {} failed: {}", op, e);
            }
        }
        result
    }

    /// Run a cache call under the operation timeout
    pub(crate) async fn call_cache<T, F>(&self, fut: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        match self.config.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .unwrap_or_else(|_| Err(CacheError::Timeout {
                    timeout_ms: limit.as_millis() as u64,
                })),
            None => fut.await,
        }
    }

    /// Drop cache entries after a successful write; failures are logged only
    async fn invalidate(&self, keys: &[Key]) {
        if keys.is_empty() {
            return;
        }
        match self.call_cache(self.cache.delete_entities(keys)).await {
            Ok(()) => debug!("Invalidated {} cache entries", keys.len()),
            Err(e) => warn!("Cache invalidation failed for {} keys: {}", keys.len(), e),
        }
    }

    // ---- reads ----

    /// Fetch entities by key, one outcome per input position
    pub async fn get_multi<E: Entity>(&self, keys: &[Key]) -> Result<BatchResult<E>> {
        fetch_many(self, keys).instrument(self.op_span("get_multi")).await
    }

    /// Fetch one entity; `None` if it does not exist
    pub async fn get<E: Entity>(&self, key: &Key) -> Result<Option<E>> {
        let batch = self.get_multi::<E>(std::slice::from_ref(key)).await?;
        match batch.into_items().into_iter().next() {
            Some(Ok(entity)) => Ok(Some(entity)),
            Some(Err(e)) if e.is_not_found() => Ok(None),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Load `entity` in place from its key; false if it does not exist
    pub async fn get_entity<E: Entity>(&self, entity: &mut E) -> Result<bool> {
        match self.get::<E>(&entity.key()).await? {
            Some(loaded) => {
                *entity = loaded;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Load every entity in place. Positions that failed are left unchanged
    /// and reported through a positional `MultiError`.
    pub async fn get_entity_multi<E: Entity>(&self, entities: &mut [E]) -> Result<()> {
        let keys: Vec<Key> = entities.iter().map(Entity::key).collect();
        let (loaded, errors) = self.get_multi::<E>(&keys).await?.into_parts();
        for (slot, value) in entities.iter_mut().zip(loaded) {
            if let Some(value) = value {
                *slot = value;
            }
        }
        match errors {
            Some(merr) => Err(merr.into()),
            None => Ok(()),
        }
    }

    // ---- writes ----

    async fn write_entities(&self, entities: Vec<(Key, PropertyList)>) -> Result<Vec<Key>> {
        let keys = self
            .call_store("put_multi", self.client.put_multi(entities))
            .await?;
        self.invalidate(&keys).await;
        Ok(keys)
    }

    /// Store `entity` under `key`, returning the stored key
    pub async fn put<E: Entity>(&self, key: Key, entity: &E) -> Result<Key> {
        let props = entity.save()?;
        let keys = self
            .write_entities(vec![(key, props)])
            .instrument(self.op_span("put"))
            .await?;
        keys.into_iter()
            .next()
            .ok_or_else(|| StoreError::Other("datastore returned no key for put".to_string()))
    }

    /// Store entities under the matching keys in one call
    pub async fn put_multi<E: Entity>(&self, keys: &[Key], entities: &[E]) -> Result<Vec<Key>> {
        if keys.len() != entities.len() {
            return Err(StoreError::Other(format!(
                "put_multi: {} keys for {} entities",
                keys.len(),
                entities.len()
            )));
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let batch = keys
            .iter()
            .cloned()
            .zip(entities)
            .map(|(key, entity)| Ok((key, entity.save()?)))
            .collect::<Result<Vec<_>>>()?;
        self.write_entities(batch)
            .instrument(self.op_span("put_multi"))
            .await
    }

    /// Stamp bookkeeping fields and store the entity under its own key
    pub async fn put_entity<E: Entity>(&self, entity: &mut E) -> Result<Key> {
        prepare_for_put(entity)?;
        self.put(entity.key(), &*entity).await
    }

    /// Stamp and store every entity in one call
    pub async fn put_entity_multi<E: Entity>(&self, entities: &mut [E]) -> Result<Vec<Key>> {
        for entity in entities.iter_mut() {
            prepare_for_put(entity)?;
        }
        let keys: Vec<Key> = entities.iter().map(Entity::key).collect();
        self.put_multi(&keys, entities).await
    }

    pub async fn delete(&self, key: &Key) -> Result<()> {
        self.delete_multi(std::slice::from_ref(key)).await
    }

    pub async fn delete_multi(&self, keys: &[Key]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        async {
            self.call_store("delete_multi", self.client.delete_multi(keys))
                .await?;
            self.invalidate(keys).await;
            Ok::<_, StoreError>(())
        }
        .instrument(self.op_span("delete_multi"))
        .await
    }

    pub async fn delete_entity<E: Entity>(&self, entity: &E) -> Result<()> {
        self.delete(&entity.key()).await
    }

    pub async fn delete_entity_multi<E: Entity>(&self, entities: &[E]) -> Result<()> {
        let keys: Vec<Key> = entities.iter().map(Entity::key).collect();
        self.delete_multi(&keys).await
    }

    /// Apply mutations as one atomic batch, returning the affected keys in order
    pub async fn mutate(&self, mutations: Vec<Mutation>) -> Result<Vec<Key>> {
        if mutations.is_empty() {
            return Ok(Vec::new());
        }
        async {
            debug!("Submitting {} mutations", mutations.len());
            let keys = self
                .call_store("mutate", self.client.mutate(mutations))
                .await?;
            self.invalidate(&keys).await;
            Ok::<_, StoreError>(keys)
        }
        .instrument(self.op_span("mutate"))
        .await
    }

    /// Delete every entity of a kind, returning how many were deleted
    pub async fn delete_all(&self, kind: &str) -> Result<usize> {
        let keys = self.all_keys(Query::new(kind)).await?;
        for chunk in keys.chunks(self.config.delete_batch_size) {
            self.delete_multi(chunk).await?;
        }
        debug!("Deleted {} entities of kind {}", keys.len(), kind);
        Ok(keys.len())
    }

    /// Remove cache entries for keys, surfacing cache errors
    pub async fn delete_cache_by_keys(&self, keys: &[Key]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.call_cache(self.cache.delete_entities(keys))
            .await
            .map_err(StoreError::from)
    }

    /// Remove cache entries for entities, surfacing cache errors
    pub async fn delete_cache_by_entities<E: Entity>(&self, entities: &[E]) -> Result<()> {
        let keys: Vec<Key> = entities.iter().map(Entity::key).collect();
        self.delete_cache_by_keys(&keys).await
    }

    // ---- queries ----

    /// Run a key-only query
    pub async fn run(&self, query: Query) -> Result<Box<dyn KeyIterator>> {
        let query = query.keys_only();
        self.call_store("run_keys", self.client.run_keys(&query))
            .instrument(self.op_span("run"))
            .await
    }

    /// Every key a query yields
    pub async fn all_keys(&self, query: Query) -> Result<Vec<Key>> {
        let mut iter = self.run(query).await?;
        let mut keys = Vec::new();
        while let Some(key) = iter.next().await? {
            keys.push(key);
        }
        Ok(keys)
    }

    /// Every entity a query yields; entities deleted since the query ran are skipped
    pub async fn get_all<E: Entity>(&self, query: Query) -> Result<Vec<E>> {
        let keys = self.all_keys(query).await?;
        let batch = self.get_multi::<E>(&keys).await?;
        let mut entities = Vec::with_capacity(batch.len());
        for item in batch {
            match item {
                Ok(entity) => entities.push(entity),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(entities)
    }

    /// First entity a query yields
    pub async fn get_first<E: Entity>(&self, query: Query) -> Result<Option<E>> {
        let keys = self.all_keys(query.limit(1)).await?;
        match keys.first() {
            Some(key) => self.get(key).await,
            None => Ok(None),
        }
    }

    // ---- aggregations ----

    /// Evaluate an aggregation query in one round trip
    pub async fn run_aggregation(&self, query: AggregationQuery) -> Result<HashMap<String, AggregateValue>> {
        self.call_store("run_aggregation", self.client.run_aggregation(&query))
            .instrument(self.op_span("aggregation"))
            .await
    }

    async fn single_aggregate(&self, query: Query, alias: &str, kind: AggregateKind) -> Result<AggregateValue> {
        let values = self
            .run_aggregation(AggregationQuery::new(query).with(alias, kind))
            .await?;
        values
            .get(alias)
            .copied()
            .ok_or_else(|| StoreError::AggregationMissing(alias.to_string()))
    }

    /// Number of entities matching a query
    pub async fn count(&self, query: Query) -> Result<i64> {
        Ok(self.single_aggregate(query, "count", AggregateKind::Count).await?.as_i64())
    }

    /// Average of a numeric field; 0.0 when no entity has the field
    pub async fn avg(&self, query: Query, field: &str) -> Result<f64> {
        Ok(self
            .single_aggregate(query, "avg", AggregateKind::Avg(field.to_string()))
            .await?
            .as_f64())
    }

    pub async fn int_sum(&self, query: Query, field: &str) -> Result<i64> {
        Ok(self
            .single_aggregate(query, "sum", AggregateKind::Sum(field.to_string()))
            .await?
            .as_i64())
    }

    pub async fn float_sum(&self, query: Query, field: &str) -> Result<f64> {
        Ok(self
            .single_aggregate(query, "sum", AggregateKind::Sum(field.to_string()))
            .await?
            .as_f64())
    }
}
