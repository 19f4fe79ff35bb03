//! Entries held by the TTL store

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Serialized property list with its lifetime and read history
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub bytes: Vec<u8>,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_read: Option<DateTime<Utc>>,
    pub reads: u64,
}

impl CacheEntry {
    pub fn new(bytes: Vec<u8>, ttl: Duration) -> Self {
        let stored_at = Utc::now();
        let lifetime = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));

        Self {
            bytes,
            stored_at,
            expires_at: stored_at + lifetime,
            last_read: None,
            reads: 0,
        }
    }

    /// Bytes charged against the store's limit when held under `key`
    pub fn footprint(&self, key: &str) -> usize {
        key.len() + self.bytes.len()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Lifetime left, zero once expired
    pub fn remaining_ttl(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or_default()
    }

    pub fn record_read(&mut self) {
        self.last_read = Some(Utc::now());
        self.reads += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footprint_counts_key_and_value() {
        let entry = CacheEntry::new(b"value".to_vec(), Duration::from_secs(60));
        assert_eq!(entry.footprint("k"), 6);
        assert!(entry.last_read.is_none());
    }

    #[test]
    fn test_expiry_boundary() {
        let entry = CacheEntry::new(Vec::new(), Duration::from_secs(60));
        assert!(!entry.is_expired());
        assert!(!entry.is_expired_at(entry.expires_at - chrono::Duration::seconds(1)));
        assert!(entry.is_expired_at(entry.expires_at));
        assert!(entry.remaining_ttl() <= Duration::from_secs(60));
    }

    #[test]
    fn test_zero_ttl_is_expired() {
        let entry = CacheEntry::new(Vec::new(), Duration::ZERO);
        assert!(entry.is_expired());
        assert_eq!(entry.remaining_ttl(), Duration::ZERO);
    }

    #[test]
    fn test_record_read() {
        let mut entry = CacheEntry::new(Vec::new(), Duration::from_secs(60));
        entry.record_read();
        entry.record_read();
        assert_eq!(entry.reads, 2);
        assert!(entry.last_read.is_some());
    }
}
