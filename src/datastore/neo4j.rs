//! Neo4j backing store
//!
//! Each entity is one `:Entity` node:
//!
//! ```text
//! (:Entity {key: <encoded key>, kind: <kind>, ns: <namespace or "">, props: <JSON property list>})
//! ```
//!
//! `key` carries a uniqueness constraint created on connect. Queries select
//! the nodes of one kind and namespace and are ordered and windowed in
//! process, so results match the in-memory backend exactly.

use crate::aggregation::{aggregate_entities, AggregateValue, AggregationQuery};
use crate::config::Neo4jOptions;
use crate::datastore::{DatastoreClient, KeyIterator, SnapshotIterator};
use crate::error::{MultiError, Result, StoreError};
use crate::key::{allocate_id, Key};
use crate::mutation::Mutation;
use crate::property::PropertyList;
use crate::query::{evaluate, Query};
use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

const DEFAULT_DATABASE: &str = "neo4j";

/// Backing store on a Neo4j database, with connection pooling
pub struct Neo4jDatastore {
    graph: Graph,
    database: String,
}

/// Stored form of one entity
struct NodeRecord {
    key: String,
    kind: String,
    ns: String,
    props: String,
}

impl NodeRecord {
    fn new(key: &Key, properties: &PropertyList) -> Result<Self> {
        Ok(Self {
            key: key.encode(),
            kind: key.kind().to_string(),
            ns: key.namespace().unwrap_or_default().to_string(),
            props: serde_json::to_string(properties)?,
        })
    }
}

fn query_err(context: &str) -> impl Fn(neo4rs::Error) -> StoreError + '_ {
    move |e| StoreError::QueryError(format!("Failed to {}: {}", context, e))
}

impl Neo4jDatastore {
    /// Connect to Neo4j. An empty `database_id` selects the `neo4j` database.
    ///
    /// # Example
    /// ```no_run
    /// use entitystore::{Neo4jDatastore, Neo4jOptions};
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let options = Neo4jOptions::from_env()?;
    ///     let datastore = Neo4jDatastore::connect(&options, "").await?;
    ///     assert!(datastore.health_check().await?);
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(options: &Neo4jOptions, database_id: &str) -> Result<Self> {
        let database = if database_id.is_empty() {
            DEFAULT_DATABASE.to_string()
        } else {
            database_id.to_string()
        };

        info!("Connecting to Neo4j at {} (database: {})", options.uri, database);

        let config = ConfigBuilder::default()
            .uri(options.uri.as_str())
            .user(options.user.as_str())
            .password(options.password.as_str())
            .db(database.as_str())
            .fetch_size(options.fetch_size)
            .max_connections(options.max_connections)
            .build()
            .map_err(|e| StoreError::ConfigError(e.to_string()))?;

        let graph = Graph::connect(config)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        graph
            .run(query(
                "CREATE CONSTRAINT entity_key IF NOT EXISTS FOR (n:Entity) REQUIRE n.key IS UNIQUE",
            ))
            .await
            .map_err(query_err("create entity key constraint"))?;

        info!("Successfully connected to Neo4j");

        Ok(Self { graph, database })
    }

    /// Simple health check using RETURN 1
    pub async fn health_check(&self) -> Result<bool> {
        debug!("Executing simple health check (RETURN 1)");

        self.graph
            .run(query("RETURN 1"))
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        Ok(true)
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Underlying neo4rs graph, for custom queries
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Stored property lists by encoded key
    async fn fetch(&self, encoded_keys: Vec<String>) -> Result<HashMap<String, PropertyList>> {
        if encoded_keys.is_empty() {
            return Ok(HashMap::new());
        }

        let cypher = query("MATCH (n:Entity) WHERE n.key IN $keys RETURN n.key AS key, n.props AS props")
            .param("keys", encoded_keys);

        let mut result = self.graph.execute(cypher).await.map_err(query_err("get entities"))?;
        let mut found = HashMap::new();
        while let Some(row) = result.next().await.map_err(query_err("read entity rows"))? {
            let key: String = row.get("key").map_err(|e| StoreError::QueryError(e.to_string()))?;
            let props: String = row.get("props").map_err(|e| StoreError::QueryError(e.to_string()))?;
            found.insert(key, serde_json::from_str(&props)?);
        }
        Ok(found)
    }

    /// Every entity of the query's kind and namespace
    async fn scan(&self, q: &Query) -> Result<Vec<(Key, PropertyList)>> {
        let cypher = query("MATCH (n:Entity {kind: $kind, ns: $ns}) RETURN n.key AS key, n.props AS props")
            .param("kind", q.kind.clone())
            .param("ns", q.namespace.clone().unwrap_or_default());

        let mut result = self.graph.execute(cypher).await.map_err(query_err("run query"))?;
        let mut entities = Vec::new();
        while let Some(row) = result.next().await.map_err(query_err("read query rows"))? {
            let key: String = row.get("key").map_err(|e| StoreError::QueryError(e.to_string()))?;
            let props: String = row.get("props").map_err(|e| StoreError::QueryError(e.to_string()))?;
            entities.push((Key::decode(&key)?, serde_json::from_str(&props)?));
        }
        debug!("Scanned {} {} entities", entities.len(), q.kind);
        Ok(entities)
    }

    fn upsert_query(record: NodeRecord) -> neo4rs::Query {
        query("MERGE (n:Entity {key: $key}) SET n.kind = $kind, n.ns = $ns, n.props = $props")
            .param("key", record.key)
            .param("kind", record.kind)
            .param("ns", record.ns)
            .param("props", record.props)
    }
}

fn complete(key: Key) -> Key {
    if key.is_complete() {
        key
    } else {
        key.completed(allocate_id())
    }
}

#[async_trait]
impl DatastoreClient for Neo4jDatastore {
    async fn get_multi(&self, keys: &[Key]) -> Result<Vec<Result<PropertyList>>> {
        let encoded: Vec<String> = keys.iter().filter(|k| k.is_complete()).map(Key::encode).collect();
        let found = self.fetch(encoded).await?;
        debug!("Neo4j get_multi: {} of {} keys found", found.len(), keys.len());

        Ok(keys
            .iter()
            .map(|key| {
                if !key.is_complete() {
                    return Err(StoreError::InvalidKey(format!("cannot get incomplete key {}", key)));
                }
                found.get(&key.encode()).cloned().ok_or(StoreError::NoSuchEntity)
            })
            .collect())
    }

    async fn put_multi(&self, entities: Vec<(Key, PropertyList)>) -> Result<Vec<Key>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::with_capacity(entities.len());
        let (mut enc, mut kinds, mut nss, mut props) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
        for (key, properties) in entities {
            let key = complete(key);
            let record = NodeRecord::new(&key, &properties)?;
            enc.push(record.key);
            kinds.push(record.kind);
            nss.push(record.ns);
            props.push(record.props);
            keys.push(key);
        }

        let cypher = query(
            "UNWIND range(0, size($keys) - 1) AS i
             MERGE (n:Entity {key: $keys[i]})
             SET n.kind = $kinds[i], n.ns = $nss[i], n.props = $props[i]",
        )
        .param("keys", enc)
        .param("kinds", kinds)
        .param("nss", nss)
        .param("props", props);

        self.graph.run(cypher).await.map_err(query_err("put entities"))?;
        Ok(keys)
    }

    async fn delete_multi(&self, keys: &[Key]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let encoded: Vec<String> = keys.iter().map(Key::encode).collect();
        let cypher = query("MATCH (n:Entity) WHERE n.key IN $keys DETACH DELETE n").param("keys", encoded);
        self.graph.run(cypher).await.map_err(query_err("delete entities"))?;
        Ok(())
    }

    async fn mutate(&self, mutations: Vec<Mutation>) -> Result<Vec<Key>> {
        let mutations: Vec<Mutation> = mutations
            .into_iter()
            .map(|m| match m {
                Mutation::Insert(..) | Mutation::Upsert(..) if !m.key().is_complete() => {
                    let key = complete(m.key().clone());
                    m.with_key(key)
                }
                m => m,
            })
            .collect();

        // Preconditions are checked against the current state, then applied in one transaction
        let checked: Vec<String> = mutations.iter().map(|m| m.key().encode()).collect();
        let mut existing: HashSet<String> = self.fetch(checked).await?.into_keys().collect();

        let mut errors: Vec<Option<StoreError>> = Vec::with_capacity(mutations.len());
        let mut queries = Vec::with_capacity(mutations.len());
        for m in &mutations {
            let encoded = m.key().encode();
            let outcome = match m {
                Mutation::Delete(key) if !key.is_complete() => {
                    Err(StoreError::InvalidKey(format!("cannot delete incomplete key {}", key)))
                }
                Mutation::Delete(_) => {
                    existing.remove(&encoded);
                    Ok(query("MATCH (n:Entity {key: $key}) DETACH DELETE n").param("key", encoded))
                }
                Mutation::Insert(key, _) if existing.contains(&encoded) => {
                    Err(StoreError::AlreadyExists(key.to_string()))
                }
                Mutation::Update(_, _) if !existing.contains(&encoded) => Err(StoreError::NoSuchEntity),
                Mutation::Insert(key, props) | Mutation::Update(key, props) | Mutation::Upsert(key, props) => {
                    existing.insert(encoded);
                    NodeRecord::new(key, props).map(Self::upsert_query)
                }
            };
            match outcome {
                Ok(q) => {
                    queries.push(q);
                    errors.push(None);
                }
                Err(e) => errors.push(Some(e)),
            }
        }

        if errors.iter().any(Option::is_some) {
            return Err(MultiError::new(errors).into());
        }

        let mut txn = self.graph.start_txn().await.map_err(query_err("start transaction"))?;
        if let Err(e) = txn.run_queries(queries).await {
            if let Err(rb) = txn.rollback().await {
                warn!("Rollback after failed mutation batch also failed: {}", rb);
            }
            return Err(StoreError::QueryError(format!("Failed to apply mutations: {}", e)));
        }
        txn.commit().await.map_err(query_err("commit mutations"))?;

        Ok(mutations.into_iter().map(|m| m.key().clone()).collect())
    }

    async fn run_keys(&self, q: &Query) -> Result<Box<dyn KeyIterator>> {
        let entities = self.scan(q).await?;
        let results = evaluate(q, entities.iter().map(|(k, p)| (k, p)))?
            .into_iter()
            .map(|hit| (hit.key.clone(), hit.cursor()))
            .collect();
        Ok(Box::new(SnapshotIterator::new(q.start.clone().unwrap_or_default(), results)))
    }

    async fn run_aggregation(&self, q: &AggregationQuery) -> Result<HashMap<String, AggregateValue>> {
        let entities = self.scan(&q.query).await?;
        let hits = evaluate(&q.query, entities.iter().map(|(k, p)| (k, p)))?;
        Ok(aggregate_entities(&q.aggregates, hits.iter().map(|h| h.properties)))
    }
}
