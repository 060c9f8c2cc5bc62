//! Cache Storage and key-value backends for the Deeds client.
//!
//! This crate provides:
//! - Versioned request/response buckets (`CacheStorage`)
//! - Session- and local-scoped string key-value stores (`KeyValueStore`)
//! - Backends: in-memory and local filesystem

pub mod backends;
pub mod error;
pub mod kv;
pub mod traits;

pub use backends::{filesystem::FilesystemCacheStorage, memory::MemoryCacheStorage};
pub use error::{StorageError, StorageResult};
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use traits::CacheStorage;

use deeds_core::config::StorageConfig;
use std::sync::Arc;

/// Subdirectory of a filesystem state root holding cache buckets.
pub const CACHES_DIR: &str = "caches";
/// File holding session-scoped keys under a filesystem state root.
pub const SESSION_FILE: &str = "session.json";
/// File holding local-scoped keys under a filesystem state root.
pub const LOCAL_FILE: &str = "local.json";

/// Create a cache storage backend from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn CacheStorage>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(MemoryCacheStorage::new())),
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemCacheStorage::new(path.join(CACHES_DIR)).await?;
            Ok(Arc::new(backend))
        }
    }
}

/// The two key-value scopes a page sees.
#[derive(Clone)]
pub struct KeyValueStores {
    /// Cleared when the browser session ends.
    pub session: Arc<dyn KeyValueStore>,
    /// Survives sessions.
    pub local: Arc<dyn KeyValueStore>,
}

impl KeyValueStores {
    /// Fresh in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            session: Arc::new(MemoryKeyValueStore::new()),
            local: Arc::new(MemoryKeyValueStore::new()),
        }
    }

    /// Open the stores described by configuration.
    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        match config {
            StorageConfig::Memory => Ok(Self::in_memory()),
            StorageConfig::Filesystem { path } => Ok(Self {
                session: Arc::new(FileKeyValueStore::open(path.join(SESSION_FILE))?),
                local: Arc::new(FileKeyValueStore::open(path.join(LOCAL_FILE))?),
            }),
        }
    }
}
