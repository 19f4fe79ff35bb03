//! Error types for entity store operations
//!
//! `StoreError` covers every failure the store can surface to a caller.
//! Cache faults have their own `CacheError` type so that callers (and the
//! store itself) can tell a cache problem apart from a backing-store problem:
//! cache faults are never operation failures on the read and write paths.

use crate::key::Key;
use std::fmt;
use thiserror::Error;

/// Main error type for entity store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested entity does not exist in the backing store
    #[error("no such entity")]
    NoSuchEntity,

    /// An insert mutation targeted a key that already exists
    #[error("entity already exists: {0}")]
    AlreadyExists(String),

    /// Connection error - network or connection pool issues
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Query execution error
    #[error("Query error: {0}")]
    QueryError(String),

    /// Operation timeout
    #[error("Operation timed out after {timeout_ms}ms: {context}")]
    TimeoutError { timeout_ms: u64, context: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Entity could not be converted to or from a property list
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Malformed or incomplete key where a complete one is required
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// A cursor string could not be decoded
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// The aggregation response did not contain the named aggregate
    #[error("Aggregation result missing: {0}")]
    AggregationMissing(String),

    /// Cache failure surfaced by an explicit cache operation
    #[error("Cache error: {0}")]
    CacheError(#[from] CacheError),

    /// Positional per-item errors of a batch operation
    #[error("{0}")]
    MultiError(#[from] MultiError),

    /// Neo4rs driver error (wrapper)
    #[error("Neo4rs driver error: {0}")]
    DriverError(#[from] neo4rs::Error),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for entity store operations
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// True for the expected "entity does not exist" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NoSuchEntity)
    }

    /// Copy of this error for another batch position holding the same key.
    /// Errors without a `Clone` payload keep their message.
    pub(crate) fn replicate(&self) -> StoreError {
        match self {
            StoreError::NoSuchEntity => StoreError::NoSuchEntity,
            StoreError::AlreadyExists(s) => StoreError::AlreadyExists(s.clone()),
            StoreError::ConnectionError(s) => StoreError::ConnectionError(s.clone()),
            StoreError::QueryError(s) => StoreError::QueryError(s.clone()),
            StoreError::TimeoutError { timeout_ms, context } => StoreError::TimeoutError {
                timeout_ms: *timeout_ms,
                context: context.clone(),
            },
            StoreError::ConfigError(s) => StoreError::ConfigError(s.clone()),
            StoreError::SerializationError(s) => StoreError::SerializationError(s.clone()),
            StoreError::InvalidKey(s) => StoreError::InvalidKey(s.clone()),
            StoreError::InvalidCursor(s) => StoreError::InvalidCursor(s.clone()),
            StoreError::AggregationMissing(s) => StoreError::AggregationMissing(s.clone()),
            StoreError::CacheError(e) => StoreError::CacheError(e.clone()),
            StoreError::MultiError(e) => StoreError::Other(e.to_string()),
            StoreError::DriverError(e) => StoreError::QueryError(e.to_string()),
            StoreError::Other(s) => StoreError::Other(s.clone()),
        }
    }
}

impl From<String> for StoreError {
    fn from(s: String) -> Self {
        StoreError::Other(s)
    }
}

impl From<&str> for StoreError {
    fn from(s: &str) -> Self {
        StoreError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::SerializationError(e.to_string())
    }
}

/// Reports whether an error indicates a real problem.
///
/// `NoSuchEntity` is not a problem, and neither is a `MultiError` whose only
/// failures are `NoSuchEntity`. Everything else is.
pub fn is_problem(err: &StoreError) -> bool {
    match err {
        StoreError::NoSuchEntity => false,
        StoreError::MultiError(merr) => merr.is_problem(),
        _ => true,
    }
}

/// Errors raised by `Cachestore` implementations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// One or more entries were larger than the cache accepts.
    ///
    /// Entries of the same batch that were within the limit have been stored.
    #[error("cache size over: {} entries exceed {limit} bytes", .keys.len())]
    SizeExceeded { keys: Vec<Key>, limit: usize },

    /// The cache backend could not be reached or refused the request
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// A cached value could not be encoded or decoded
    #[error("cache encoding error: {0}")]
    Encoding(String),

    /// The cache call did not finish within the configured deadline
    #[error("cache call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl CacheError {
    /// True if this is the distinguished size-limit rejection
    pub fn is_size_exceeded(&self) -> bool {
        matches!(self, CacheError::SizeExceeded { .. })
    }
}

/// Result type alias for cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Positional errors of a batch call.
///
/// Slot `i` holds the error for input position `i`, or `None` if that
/// position succeeded.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<Option<StoreError>>,
}

impl MultiError {
    /// Create a multi-error from positional slots
    pub fn new(errors: Vec<Option<StoreError>>) -> Self {
        Self { errors }
    }

    /// Number of positions (not the number of failures)
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Error at a position, if that position failed
    pub fn get(&self, index: usize) -> Option<&StoreError> {
        self.errors.get(index).and_then(|e| e.as_ref())
    }

    /// Iterate positional slots
    pub fn iter(&self) -> impl Iterator<Item = Option<&StoreError>> {
        self.errors.iter().map(|e| e.as_ref())
    }

    /// Number of failed positions
    pub fn failure_count(&self) -> usize {
        self.errors.iter().filter(|e| e.is_some()).count()
    }

    /// True if any failure is something other than not-found
    pub fn is_problem(&self) -> bool {
        self.errors.iter().flatten().any(is_problem)
    }

    pub fn into_inner(self) -> Vec<Option<StoreError>> {
        self.errors
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut failures = self.errors.iter().enumerate().filter_map(|(i, e)| e.as_ref().map(|e| (i, e)));
        match failures.next() {
            None => write!(f, "(0 errors)"),
            Some((i, first)) => {
                let rest = self.failure_count() - 1;
                if rest == 0 {
                    write!(f, "position {}: {}", i, first)
                } else {
                    write!(f, "position {}: {} (and {} other errors)", i, first, rest)
                }
            }
        }
    }
}

impl std::error::Error for MultiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = StoreError::ConnectionError("Failed to connect".to_string());
        assert_eq!(error.to_string(), "Connection error: Failed to connect");

        let timeout_error = StoreError::TimeoutError {
            timeout_ms: 1500,
            context: "get_multi".to_string(),
        };
        assert!(timeout_error.to_string().contains("timed out after 1500ms"));

        assert_eq!(StoreError::NoSuchEntity.to_string(), "no such entity");
    }

    #[test]
    fn test_error_conversion() {
        let error: StoreError = "test error".into();
        assert!(matches!(error, StoreError::Other(_)));

        let error: StoreError = CacheError::Unavailable("down".to_string()).into();
        assert!(matches!(error, StoreError::CacheError(CacheError::Unavailable(_))));
    }

    #[test]
    fn test_is_problem() {
        assert!(!is_problem(&StoreError::NoSuchEntity));
        assert!(is_problem(&StoreError::QueryError("boom".to_string())));

        let only_missing = MultiError::new(vec![None, Some(StoreError::NoSuchEntity), None]);
        assert!(!only_missing.is_problem());
        assert!(!is_problem(&StoreError::MultiError(only_missing)));

        let mixed = MultiError::new(vec![
            Some(StoreError::NoSuchEntity),
            Some(StoreError::QueryError("boom".to_string())),
        ]);
        assert!(mixed.is_problem());
        assert!(is_problem(&StoreError::MultiError(mixed)));
    }

    #[test]
    fn test_multi_error_display() {
        let merr = MultiError::new(vec![None, Some(StoreError::NoSuchEntity), Some(StoreError::NoSuchEntity)]);
        assert_eq!(merr.failure_count(), 2);
        assert_eq!(merr.to_string(), "position 1: no such entity (and 1 other errors)");
        assert!(merr.get(0).is_none());
        assert!(merr.get(1).unwrap().is_not_found());
    }

    #[test]
    fn test_cache_size_exceeded_is_distinct() {
        let err = CacheError::SizeExceeded {
            keys: vec![Key::name("Kind", "a")],
            limit: 10,
        };
        assert!(err.is_size_exceeded());
        assert!(!CacheError::Unavailable("x".to_string()).is_size_exceeded());
        assert!(err.to_string().contains("1 entries exceed 10 bytes"));
    }
}
