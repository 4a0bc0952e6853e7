//! Cache storage.
//!
//! A [`CacheStorage`] is a namespace of named [`CacheStore`]s, each a map
//! from [`RequestKey`](crate::RequestKey) to [`Response`](crate::Response).
//! The controller only ever talks to these traits, so the backend is a
//! deployment choice:
//!
//! - [`MemoryCacheStorage`]: moka-backed, in-process. The default, and
//!   what tests substitute for a real store.
//! - [`DiskCacheStorage`]: one directory per store, one JSON file per
//!   entry. Survives restarts.
//!
//! Writes to the same key are last-write-wins. Stored values are
//! snapshots of equivalent network responses, so no locking is needed.

pub mod disk;
pub mod memory;
pub mod traits;

pub use disk::{DiskCacheStorage, DiskCacheStore};
pub use memory::{MemoryCacheStorage, MemoryCacheStore};
pub use traits::{CacheStorage, CacheStore};

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::types::{RequestKey, Response};
use crate::{Result, ShellCacheError};

/// Build the storage backend described by `config`.
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn CacheStorage>> {
    let storage: Arc<dyn CacheStorage> = match config.backend {
        StorageBackend::Memory => Arc::new(match config.max_entries {
            Some(max) => MemoryCacheStorage::with_max_entries(max),
            None => MemoryCacheStorage::new(),
        }),
        StorageBackend::Disk => Arc::new(DiskCacheStorage::new(config.resolve_dir())?),
    };
    Ok(storage)
}

/// Reject keys and responses a store must not keep.
pub(crate) fn ensure_storable(key: &RequestKey, response: &Response) -> Result<()> {
    if *key.method() != reqwest::Method::GET {
        return Err(ShellCacheError::NotStorable(format!(
            "{key}: only GET requests can be cached"
        )));
    }
    if !response.is_storable() {
        return Err(ShellCacheError::NotStorable(format!(
            "{key}: status {} / Vary",
            response.status().as_u16()
        )));
    }
    Ok(())
}
