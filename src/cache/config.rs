//! Configuration for the TTL store

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest serialized property list accepted by default (950 KiB)
pub const DEFAULT_MAX_VALUE_BYTES: usize = 950 * 1024;

/// Prefix prepended to every cache key by default
pub const DEFAULT_KEY_PREFIX: &str = "DatastoreCache:";

/// Configuration for [`TtlStore`](crate::cache::TtlStore)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlStoreConfig {
    /// Lifetime of a cached property list before jitter
    pub ttl: Duration,

    /// Fraction of `ttl` (0.0 - 1.0) by which each entry's lifetime is
    /// randomly shortened or lengthened, so entities fetched in one batch
    /// do not all expire together
    pub ttl_jitter: f64,

    /// Entity count at which the least recently used entity is evicted
    pub max_entries: usize,

    /// Total bytes (keys plus serialized values) the store may hold
    pub max_total_bytes: usize,

    /// Largest serialized property list accepted.
    /// Larger values are refused with `CacheError::SizeExceeded`.
    pub max_value_bytes: usize,

    /// Prefix prepended to encoded entity keys
    pub key_prefix: String,

    /// Pause between sweeps of `start_auto_cleanup`
    pub sweep_interval: Duration,

    /// Move an entity to the back of the eviction queue when it is read.
    /// When false, eviction follows write order.
    pub refresh_on_read: bool,
}

impl Default for TtlStoreConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            ttl_jitter: 0.125,
            max_entries: 10_000,
            max_total_bytes: 100 * 1024 * 1024,
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            sweep_interval: Duration::from_secs(300),
            refresh_on_read: true,
        }
    }
}

impl TtlStoreConfig {
    pub fn builder() -> TtlStoreConfigBuilder {
        TtlStoreConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl.is_zero() {
            return Err("ttl must be greater than 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err("ttl_jitter must be between 0.0 and 1.0".to_string());
        }

        if self.max_entries == 0 {
            return Err("max_entries must be greater than 0".to_string());
        }

        if self.max_value_bytes == 0 || self.max_value_bytes > self.max_total_bytes {
            return Err("max_value_bytes must be between 1 and max_total_bytes".to_string());
        }

        if self.sweep_interval.is_zero() {
            return Err("sweep_interval must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Lifetime for a new entry: `ttl` moved by up to `ttl_jitter * ttl`
    /// in either direction, never below one second
    pub fn entry_ttl(&self) -> Duration {
        // Out-of-range jitter is clamped; NaN disables it.
        let jitter = if self.ttl_jitter.is_nan() {
            0.0
        } else {
            self.ttl_jitter.clamp(0.0, 1.0)
        };

        let base = self.ttl.as_secs_f64();
        let spread = base * jitter;
        if spread <= 0.0 {
            return self.ttl;
        }
        let offset = rand::thread_rng().gen_range(-spread..=spread);

        Duration::from_secs_f64((base + offset).max(1.0))
    }
}

/// Builder for [`TtlStoreConfig`]; unset fields keep their defaults
#[derive(Debug, Default)]
pub struct TtlStoreConfigBuilder {
    ttl: Option<Duration>,
    ttl_jitter: Option<f64>,
    max_entries: Option<usize>,
    max_total_bytes: Option<usize>,
    max_value_bytes: Option<usize>,
    key_prefix: Option<String>,
    sweep_interval: Option<Duration>,
    refresh_on_read: Option<bool>,
}

impl TtlStoreConfigBuilder {
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the jitter fraction (0.0 - 1.0); 0.0 gives every entry exactly `ttl`
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    pub fn max_entries(mut self, entries: usize) -> Self {
        self.max_entries = Some(entries);
        self
    }

    pub fn max_total_bytes(mut self, bytes: usize) -> Self {
        self.max_total_bytes = Some(bytes);
        self
    }

    pub fn max_value_bytes(mut self, bytes: usize) -> Self {
        self.max_value_bytes = Some(bytes);
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    pub fn refresh_on_read(mut self, refresh: bool) -> Self {
        self.refresh_on_read = Some(refresh);
        self
    }

    pub fn build(self) -> TtlStoreConfig {
        let d = TtlStoreConfig::default();

        TtlStoreConfig {
            ttl: self.ttl.unwrap_or(d.ttl),
            ttl_jitter: self.ttl_jitter.unwrap_or(d.ttl_jitter),
            max_entries: self.max_entries.unwrap_or(d.max_entries),
            max_total_bytes: self.max_total_bytes.unwrap_or(d.max_total_bytes),
            max_value_bytes: self.max_value_bytes.unwrap_or(d.max_value_bytes),
            key_prefix: self.key_prefix.unwrap_or(d.key_prefix),
            sweep_interval: self.sweep_interval.unwrap_or(d.sweep_interval),
            refresh_on_read: self.refresh_on_read.unwrap_or(d.refresh_on_read),
        }
    }
}

/// Presets by how often the cached entities change
impl TtlStoreConfig {
    /// Entities rewritten within minutes
    pub fn volatile() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            ttl_jitter: 0.2,
            max_entries: 5_000,
            max_total_bytes: 64 * 1024 * 1024,
            sweep_interval: Duration::from_secs(60),
            ..Default::default()
        }
    }

    /// Reference data refreshed about once a day
    pub fn stable() -> Self {
        Self {
            ttl: Duration::from_secs(23 * 3600),
            max_entries: 50_000,
            max_total_bytes: 512 * 1024 * 1024,
            sweep_interval: Duration::from_secs(1800),
            ..Default::default()
        }
    }

    /// Small footprint for tests and sidecars
    pub fn compact() -> Self {
        Self {
            ttl: Duration::from_secs(1800),
            max_entries: 1_000,
            max_total_bytes: 8 * 1024 * 1024,
            max_value_bytes: 256 * 1024,
            ..Default::default()
        }
    }
}
