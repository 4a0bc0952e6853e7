//! In-process cache storage backed by moka.

use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;
use tokio::sync::RwLock;

use super::ensure_storable;
use super::traits::{CacheStorage, CacheStore};
use crate::Result;
use crate::types::{RequestKey, Response};

/// Thread-safe in-memory [`CacheStorage`].
///
/// Stores are kept in creation order. Each store is a moka cache, unbounded
/// by default. A bound is available for long-running hosts, but an evicted
/// App Shell entry is only restored by the next successful fetch of it.
pub struct MemoryCacheStorage {
    stores: RwLock<Vec<Arc<MemoryCacheStore>>>,
    max_entries: Option<u64>,
}

impl MemoryCacheStorage {
    /// Create empty storage with unbounded stores.
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(Vec::new()),
            max_entries: None,
        }
    }

    /// Create empty storage whose stores hold at most `max` entries each.
    pub fn with_max_entries(max: u64) -> Self {
        Self {
            stores: RwLock::new(Vec::new()),
            max_entries: Some(max),
        }
    }
}

impl Default for MemoryCacheStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>> {
        if let Some(store) = self.stores.read().await.iter().find(|s| s.name == name) {
            return Ok(store.clone());
        }

        let mut stores = self.stores.write().await;
        // Another task may have created it between the two locks.
        if let Some(store) = stores.iter().find(|s| s.name == name) {
            return Ok(store.clone());
        }
        let store = Arc::new(MemoryCacheStore::new(name, self.max_entries));
        stores.push(store.clone());
        Ok(store)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.stores.read().await.iter().any(|s| s.name == name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut stores = self.stores.write().await;
        let before = stores.len();
        stores.retain(|s| s.name != name);
        Ok(stores.len() != before)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .stores
            .read()
            .await
            .iter()
            .map(|s| s.name.clone())
            .collect())
    }
}

/// One in-memory store.
pub struct MemoryCacheStore {
    name: String,
    entries: Cache<RequestKey, Response>,
}

impl MemoryCacheStore {
    fn new(name: &str, max_entries: Option<u64>) -> Self {
        let mut builder = Cache::<RequestKey, Response>::builder();
        if let Some(max) = max_entries {
            builder = builder.max_capacity(max);
        }
        Self {
            name: name.to_string(),
            entries: builder.build(),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &RequestKey) -> Result<Option<Response>> {
        Ok(self.entries.get(key).await)
    }

    async fn put(&self, key: RequestKey, response: Response) -> Result<()> {
        ensure_storable(&key, &response)?;
        self.entries.insert(key, response).await;
        Ok(())
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        Ok(self.entries.remove(key).await.is_some())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        Ok(self.entries.iter().map(|(k, _)| (*k).clone()).collect())
    }
}
