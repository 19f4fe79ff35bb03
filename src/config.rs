//! Store configuration

use crate::cache::{Cachestore, Nostore};
use crate::error::{Result, StoreError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default number of keys per delete batch in `delete_all`
pub const DEFAULT_DELETE_BATCH_SIZE: usize = 500;

/// Default bound on every external call
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration of an `EntityStore`
#[derive(Clone)]
pub struct StoreConfig {
    /// Backing database; empty selects the default database
    pub database_id: String,

    /// Cache implementation; `None` disables caching
    pub cachestore: Option<Arc<dyn Cachestore>>,

    /// Span that store operations are recorded under; `None` creates
    /// an `entitystore` span tagged with the database id
    pub span: Option<tracing::Span>,

    /// Deadline for each cache or backing store call; `None` waits indefinitely
    pub operation_timeout: Option<Duration>,

    /// Keys deleted per backing store call in `delete_all`
    pub delete_batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_id: String::new(),
            cachestore: None,
            span: None,
            operation_timeout: Some(DEFAULT_OPERATION_TIMEOUT),
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("database_id", &self.database_id)
            .field("cachestore", &self.cachestore.as_ref().map(|_| "<cachestore>"))
            .field("span", &self.span)
            .field("operation_timeout", &self.operation_timeout)
            .field("delete_batch_size", &self.delete_batch_size)
            .finish()
    }
}

impl StoreConfig {
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.delete_batch_size == 0 {
            return Err("delete_batch_size must be greater than 0".to_string());
        }

        if self.operation_timeout == Some(Duration::ZERO) {
            return Err("operation_timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Configured cachestore, or a no-op store
    pub(crate) fn cachestore_or_default(&self) -> Arc<dyn Cachestore> {
        self.cachestore.clone().unwrap_or_else(|| Arc::new(Nostore))
    }

    /// Configured span, or a fresh `entitystore` span
    pub(crate) fn span_or_default(&self) -> tracing::Span {
        match &self.span {
            Some(span) => span.clone(),
            None => tracing::info_span!("entitystore", database = %self.database_id),
        }
    }
}

/// Builder for [`StoreConfig`]
#[derive(Default)]
pub struct StoreConfigBuilder {
    database_id: Option<String>,
    cachestore: Option<Arc<dyn Cachestore>>,
    span: Option<tracing::Span>,
    operation_timeout: Option<Option<Duration>>,
    delete_batch_size: Option<usize>,
}

impl StoreConfigBuilder {
    pub fn database_id(mut self, id: impl Into<String>) -> Self {
        self.database_id = Some(id.into());
        self
    }

    pub fn cachestore(mut self, cachestore: Arc<dyn Cachestore>) -> Self {
        self.cachestore = Some(cachestore);
        self
    }

    pub fn span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(Some(timeout));
        self
    }

    /// Let external calls run without a deadline
    pub fn no_timeout(mut self) -> Self {
        self.operation_timeout = Some(None);
        self
    }

    pub fn delete_batch_size(mut self, size: usize) -> Self {
        self.delete_batch_size = Some(size);
        self
    }

    pub fn build(self) -> StoreConfig {
        let defaults = StoreConfig::default();

        StoreConfig {
            database_id: self.database_id.unwrap_or(defaults.database_id),
            cachestore: self.cachestore,
            span: self.span,
            operation_timeout: self.operation_timeout.unwrap_or(defaults.operation_timeout),
            delete_batch_size: self.delete_batch_size.unwrap_or(defaults.delete_batch_size),
        }
    }
}

/// Connection options for the Neo4j backing store
#[derive(Clone)]
pub struct Neo4jOptions {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub fetch_size: usize,
    pub max_connections: usize,
}

impl Default for Neo4jOptions {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
            fetch_size: 500,
            max_connections: 16,
        }
    }
}

impl fmt::Debug for Neo4jOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Neo4jOptions")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("fetch_size", &self.fetch_size)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl Neo4jOptions {
    /// Read `NEO4J_URI`, `NEO4J_USER`, `NEO4J_PASSWORD`, `NEO4J_FETCH_SIZE` and
    /// `NEO4J_MAX_CONNECTIONS`, loading a `.env` file first if one exists.
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            uri: std::env::var("NEO4J_URI").unwrap_or(defaults.uri),
            user: std::env::var("NEO4J_USER").unwrap_or(defaults.user),
            password: std::env::var("NEO4J_PASSWORD").unwrap_or(defaults.password),
            fetch_size: env_usize("NEO4J_FETCH_SIZE", defaults.fetch_size)?,
            max_connections: env_usize("NEO4J_MAX_CONNECTIONS", defaults.max_connections)?,
        })
    }
}

fn env_usize(name: &str, default: usize) -> Result<usize> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| StoreError::ConfigError(format!("{} must be a positive integer: {}", name, e))),
        Err(_) => Ok(default),
    }
}
