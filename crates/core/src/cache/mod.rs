//! Response cache: keyed storage of observed objects and the manager that
//! feeds it from upstream responses and answers queries from it.
//!
//! Records are keyed by (client identity, resource type, namespace, name)
//! and hold the object in the canonical storage format (compact JSON),
//! whatever content type the original response used. Backends:
//!
//! - SQLite via tokio-rusqlite, WAL mode, versioned migrations
//! - Plain files under a directory tree built from the key components

pub mod connection;
pub mod fs;
pub mod hash;
pub mod manager;
pub mod migrations;
pub mod records;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use fs::FsStore;
pub use manager::CacheManager;
pub use store::{CacheStore, RecordKey, RecordScope};

use std::sync::Arc;

use crate::config::{CacheBackend, CacheConfig};

/// Open the configured backend.
pub async fn open_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, Error> {
    let store: Arc<dyn CacheStore> = match config.backend {
        CacheBackend::Sqlite => Arc::new(CacheDb::open(&config.db_path).await?),
        CacheBackend::Filesystem => {
            tokio::fs::create_dir_all(&config.fs_root).await?;
            Arc::new(FsStore::new(&config.fs_root))
        }
    };
    tracing::info!(backend = ?config.backend, "cache store opened");
    Ok(store)
}
