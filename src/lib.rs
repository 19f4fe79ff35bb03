//! # entitystore
//!
//! Typed entity persistence over a backing store, with a read-through,
//! write-invalidate cache in front of it.
//!
//! ## Features
//!
//! - Batched reads: one cache round trip and one backing store round trip per call
//! - Positional batch results; not-found is told apart from real faults
//! - Writes commit to the backing store first, then invalidate the cache
//! - Pluggable caches: none, in-memory map, or a TTL/LRU byte store
//! - Neo4j and in-memory backing stores
//! - Cursor-paginated listing and count/sum/average aggregations
//!
//! ## Reading and Writing
//!
//! ```no_run
//! use entitystore::{Entity, EntityBase, EntityStore, Key, MemoryDatastore, StoreConfig, TtlStore, TtlStoreConfig};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct User {
//!     #[serde(flatten)]
//!     base: EntityBase,
//!     #[serde(rename = "Id")]
//!     id: String,
//!     #[serde(rename = "Name")]
//!     name: String,
//! }
//!
//! impl Entity for User {
//!     fn key(&self) -> Key {
//!         Key::name("User", self.id.clone())
//!     }
//!     fn base(&self) -> &EntityBase {
//!         &self.base
//!     }
//!     fn base_mut(&mut self) -> &mut EntityBase {
//!         &mut self.base
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = StoreConfig::builder()
//!         .cachestore(Arc::new(TtlStore::new(TtlStoreConfig::default())?))
//!         .build();
//!     let store = EntityStore::new(Arc::new(MemoryDatastore::new()), config)?;
//!
//!     let mut user = User { id: "u1".to_string(), name: "Ada".to_string(), ..Default::default() };
//!     store.put_entity(&mut user).await?;
//!
//!     let loaded: Option<User> = store.get(&Key::name("User", "u1")).await?;
//!     println!("Loaded: {:?}", loaded);
//!     Ok(())
//! }
//! ```
//!
//! ## Listing
//!
//! ```no_run
//! # use entitystore::{Entity, EntityBase, EntityLister, EntityStore, Key, Query};
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! # struct User { #[serde(flatten)] base: EntityBase, #[serde(rename = "Id")] id: String }
//! # impl Entity for User {
//! #     fn key(&self) -> Key { Key::name("User", self.id.clone()) }
//! #     fn base(&self) -> &EntityBase { &self.base }
//! #     fn base_mut(&mut self) -> &mut EntityBase { &mut self.base }
//! # }
//! # async fn list(store: &EntityStore) -> entitystore::Result<()> {
//! let lister = EntityLister::<User>::new(store, Query::new("User").order("Id"));
//! let mut cursor = String::new();
//! loop {
//!     let (users, next) = lister.get_list(50, &cursor).await?;
//!     println!("page of {}", users.len());
//!     if next.is_empty() {
//!         break;
//!     }
//!     cursor = next;
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregation;
pub mod batch;
pub mod cache;
pub mod codec;
pub mod config;
pub mod datastore;
pub mod entity;
pub mod error;
pub mod key;
pub mod lister;
pub mod logging;
pub mod mutation;
pub mod property;
pub mod query;
mod reconcile;
pub mod store;

// Re-export main types for convenience
pub use aggregation::{AggregateValue, Aggregation, AggregationQuery, AggregationResults};
pub use batch::BatchResult;
pub use cache::{
    CacheStats, Cachestore, MemoryStore, MemoryStoreStats, Nostore, TtlStore, TtlStoreConfig,
    TtlStoreConfigBuilder,
};
pub use config::{Neo4jOptions, StoreConfig, StoreConfigBuilder};
pub use datastore::{DatastoreClient, DatastoreStats, KeyIterator, MemoryDatastore, Neo4jDatastore};
pub use entity::{Entity, EntityBase};
pub use error::{is_problem, CacheError, CacheResult, MultiError, Result, StoreError};
pub use key::{Key, KeyId};
pub use lister::EntityLister;
pub use mutation::Mutation;
pub use property::{Property, PropertyList, Value};
pub use query::{Cursor, Operator, Query};
pub use store::EntityStore;
