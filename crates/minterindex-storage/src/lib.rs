//! minterindex-storage: pluggable [`ChainStore`] backends.
//!
//! Backends:
//! - [`memory`]: in-memory (dev/testing, no persistence)
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)
//! - [`postgres`]: PostgreSQL via `sqlx` (pooled, `NUMERIC` amounts)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use minterindex_core::error::IndexerError;
use minterindex_core::store::ChainStore;

pub use memory::InMemoryStorage;

/// Which backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Sqlite,
    Postgres,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Sqlite => write!(f, "sqlite"),
            Self::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    /// File path or `sqlite:` URL for SQLite, connection URL for Postgres.
    pub url: String,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            url: String::new(),
            max_connections: 10,
        }
    }
}

/// Open the configured backend, creating its schema if needed.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn ChainStore>, IndexerError> {
    match config.backend {
        Backend::Memory => Ok(Arc::new(InMemoryStorage::new())),
        Backend::Sqlite => open_sqlite(config).await,
        Backend::Postgres => open_postgres(config).await,
    }
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(config: &StorageConfig) -> Result<Arc<dyn ChainStore>, IndexerError> {
    if config.url.is_empty() {
        return Err(IndexerError::Config("storage.url is required for sqlite".into()));
    }
    let store = sqlite::SqliteStorage::open_with_pool_size(&config.url, config.max_connections).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(_config: &StorageConfig) -> Result<Arc<dyn ChainStore>, IndexerError> {
    Err(IndexerError::Config("built without the `sqlite` feature".into()))
}

#[cfg(feature = "postgres")]
async fn open_postgres(config: &StorageConfig) -> Result<Arc<dyn ChainStore>, IndexerError> {
    if config.url.is_empty() {
        return Err(IndexerError::Config("storage.url is required for postgres".into()));
    }
    let opts = postgres::PostgresOptions {
        max_connections: config.max_connections,
        ..Default::default()
    };
    let store = postgres::PostgresStorage::connect_with_options(&config.url, opts).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(_config: &StorageConfig) -> Result<Arc<dyn ChainStore>, IndexerError> {
    Err(IndexerError::Config("built without the `postgres` feature".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names() {
        let cfg: StorageConfig =
            serde_json::from_str(r#"{"backend": "sqlite", "url": "./minter.db"}"#).unwrap();
        assert_eq!(cfg.backend, Backend::Sqlite);
        assert_eq!(cfg.max_connections, 10);
        assert_eq!(Backend::Postgres.to_string(), "postgres");
    }

    #[tokio::test]
    async fn opens_memory_by_default() {
        let store = open(&StorageConfig::default()).await.unwrap();
        assert_eq!(store.last_height().await.unwrap(), 0);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn sqlite_requires_url() {
        let cfg = StorageConfig {
            backend: Backend::Sqlite,
            ..Default::default()
        };
        assert!(matches!(open(&cfg).await, Err(IndexerError::Config(_))));
    }
}
