//! Storage capability traits.
//!
//! Mirrors the browser Cache Storage surface the controller depends on:
//! open-by-name, list names, delete-by-name, and per-store get/put.

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::types::{RequestKey, Response};

/// A namespace of named cache stores.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the store called `name`, creating it if absent.
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>>;

    /// Whether a store called `name` exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Delete the store called `name` and every entry in it.
    ///
    /// Returns `false` if no such store existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Names of all stores, in creation order.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// One named map from request key to response snapshot.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &str;

    /// Look up a stored response. A miss is `Ok(None)`, not an error.
    async fn get(&self, key: &RequestKey) -> Result<Option<Response>>;

    /// Store `response` under `key`, replacing any previous entry.
    ///
    /// Fails with `NotStorable` for non-GET keys, partial content and
    /// `Vary: *` responses.
    async fn put(&self, key: RequestKey, response: Response) -> Result<()>;

    /// Remove one entry. Returns `false` if it was absent.
    async fn delete(&self, key: &RequestKey) -> Result<bool>;

    /// Keys of all stored entries. Order is not guaranteed.
    async fn keys(&self) -> Result<Vec<RequestKey>>;
}
