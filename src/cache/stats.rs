//! Counters reported by the TTL store

use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot of [`TtlStore`](crate::cache::TtlStore) activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Keys answered from the store
    pub hits: u64,
    /// Keys absent or expired at lookup
    pub misses: u64,
    /// Live entries
    pub entries: usize,
    /// Bytes held, keys included
    pub bytes: usize,
    /// Entries dropped to make room
    pub evicted: u64,
    /// Entries dropped because their lifetime ran out
    pub expired: u64,
    /// Entries removed by `delete_entities` or `clear`
    pub invalidated: u64,
    /// Values refused for exceeding `max_value_bytes`
    pub oversize: u64,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of lookups served from the store, 0.0 before any lookup
    pub fn hit_ratio(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            n => self.hits as f64 / n as f64,
        }
    }

    /// Entries that left the store without an explicit delete
    pub fn dropped(&self) -> u64 {
        self.evicted + self.expired
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} hits ({:.1}%), {} entries in {} bytes, {} evicted, {} expired, {} oversize",
            self.hits,
            self.lookups(),
            self.hit_ratio() * 100.0,
            self.entries,
            self.bytes,
            self.evicted,
            self.expired,
            self.oversize
        )
    }
}
