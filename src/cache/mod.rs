//! # Entity Cache Layer
//!
//! The store reads through and invalidates on write against any
//! [`Cachestore`]. A cachestore maps entity keys to property lists.
//!
//! ## Implementations
//!
//! - [`Nostore`]: caching disabled; every lookup misses
//! - [`MemoryStore`]: plain lock-guarded map, optional per-value size limit
//! - [`TtlStore`]: bounded in-process store holding serialized bytes, with
//!   TTL expiry (plus jitter), LRU eviction and a per-value size limit
//!
//! ## Contract
//!
//! - `get_entities` returns only the keys that are present
//! - `set_entities` stores every entry within the size limit and reports the
//!   rest with [`CacheError::SizeExceeded`](crate::error::CacheError)
//! - `delete_entities` succeeds for keys that are not present
//!
//! ## Example
//!
//! ```rust
//! use entitystore::cache::{TtlStore, TtlStoreConfig};
//! use std::time::Duration;
//!
//! let config = TtlStoreConfig::builder()
//!     .ttl(Duration::from_secs(600))
//!     .max_entries(10_000)
//!     .build();
//! let cache = TtlStore::new(config).expect("valid TTL store config");
//! ```

pub mod config;
pub mod entry;
pub mod memory;
pub mod nostore;
pub mod stats;
pub mod store;

use crate::error::CacheResult;
use crate::key::Key;
use crate::property::PropertyList;
use async_trait::async_trait;
use std::collections::HashMap;

pub use config::{TtlStoreConfig, TtlStoreConfigBuilder};
pub use entry::CacheEntry;
pub use memory::{MemoryStore, MemoryStoreStats};
pub use nostore::Nostore;
pub use stats::CacheStats;
pub use store::{start_auto_cleanup, TtlStore};

/// Side store for entity property lists
#[async_trait]
pub trait Cachestore: Send + Sync {
    /// Look up entries; absent keys are omitted from the result
    async fn get_entities(&self, keys: &[Key]) -> CacheResult<HashMap<Key, PropertyList>>;

    /// Store entries
    async fn set_entities(&self, entities: HashMap<Key, PropertyList>) -> CacheResult<()>;

    /// Remove entries
    async fn delete_entities(&self, keys: &[Key]) -> CacheResult<()>;
}
