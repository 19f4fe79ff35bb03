//! Backing store clients
//!
//! [`DatastoreClient`] is the authoritative persistent store behind an
//! `EntityStore`. Batch calls are positional: the outer `Result` fails only
//! when the call as a whole failed, and each slot of the inner vector carries
//! that item's outcome.

pub mod memory;
pub mod neo4j;

use crate::aggregation::{AggregateValue, AggregationQuery};
use crate::error::Result;
use crate::key::Key;
use crate::mutation::Mutation;
use crate::property::PropertyList;
use crate::query::{Cursor, Query};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};

pub use memory::{DatastoreStats, MemoryDatastore};
pub use neo4j::Neo4jDatastore;

/// Authoritative entity store
#[async_trait]
pub trait DatastoreClient: Send + Sync {
    /// Fetch entities. Slot `i` is `Err(StoreError::NoSuchEntity)` if `keys[i]` does not exist.
    async fn get_multi(&self, keys: &[Key]) -> Result<Vec<Result<PropertyList>>>;

    /// Write entities, returning their keys with ids allocated for incomplete keys
    async fn put_multi(&self, entities: Vec<(Key, PropertyList)>) -> Result<Vec<Key>>;

    /// Delete entities; missing keys are not an error
    async fn delete_multi(&self, keys: &[Key]) -> Result<()>;

    /// Apply all mutations atomically, returning the affected keys in input order.
    /// A rejected mutation fails the batch with a positional `MultiError`.
    async fn mutate(&self, mutations: Vec<Mutation>) -> Result<Vec<Key>>;

    /// Run a query, yielding keys in result order
    async fn run_keys(&self, query: &Query) -> Result<Box<dyn KeyIterator>>;

    /// Evaluate aggregates over the results of a query
    async fn run_aggregation(&self, query: &AggregationQuery) -> Result<HashMap<String, AggregateValue>>;
}

/// Key-only query result stream
#[async_trait]
pub trait KeyIterator: Send {
    /// Next key, or `None` when the results are exhausted
    async fn next(&mut self) -> Result<Option<Key>>;

    /// Position just after the last key returned by `next`
    fn cursor(&self) -> Result<Cursor>;
}

/// Iterator over a query result computed up front
pub(crate) struct SnapshotIterator {
    pending: VecDeque<(Key, Cursor)>,
    position: Cursor,
}

impl SnapshotIterator {
    pub fn new(start: Cursor, results: Vec<(Key, Cursor)>) -> Self {
        Self {
            pending: results.into(),
            position: start,
        }
    }
}

#[async_trait]
impl KeyIterator for SnapshotIterator {
    async fn next(&mut self) -> Result<Option<Key>> {
        match self.pending.pop_front() {
            Some((key, cursor)) => {
                self.position = cursor;
                Ok(Some(key))
            }
            None => Ok(None),
        }
    }

    fn cursor(&self) -> Result<Cursor> {
        Ok(self.position.clone())
    }
}
