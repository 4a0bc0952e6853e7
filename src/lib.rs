//! Shellcache - offline app-shell cache controller
//!
//! This crate keeps a versioned, namespaced cache of HTTP responses for a
//! single origin and decides, per request, whether to answer from the
//! network or from the cache:
//!
//! - **documents** (`Accept: text/html`) are network-first, falling back
//!   to the cached page, then to the cached root page, when offline;
//! - **everything else** is cache-first, fetched and stored on a miss;
//! - **non-GET and cross-origin** requests are never intercepted.
//!
//! A cache generation is installed by precaching its App Shell and
//! activated by deleting the stores of older generations. Storage, network
//! and the hosting runtime are capabilities injected as traits
//! ([`CacheStorage`], [`Fetcher`], [`WorkerScope`]).
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shellcache::{HttpFetcher, OfflineCacheController, Registration, Request};
//!
//! #[tokio::main]
//! async fn main() -> shellcache::Result<()> {
//!     let controller = OfflineCacheController::builder()
//!         .origin("https://hotel.example.com")
//!         .version("v1.0.0")
//!         .build()?;
//!
//!     let registration = Registration::new(Arc::new(HttpFetcher::new()?));
//!     registration.register(Arc::new(controller)).await?;
//!
//!     let page = registration.connect_client().await;
//!     let response = registration
//!         .dispatch(page, &Request::document("https://hotel.example.com/dashboard/")?)
//!         .await?;
//!     println!("{}", response.status());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod network;
pub mod registration;
pub mod storage;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use config::Config;
pub use controller::{
    ControllerBuilder, ControllerState, FallbackChain, Interception, OfflineCacheController,
    RequestClass, Strategy, WorkerScope,
};
pub use error::{Result, ShellCacheError};
pub use network::{Fetcher, HttpFetcher};
pub use registration::{ClientId, Registration};
pub use storage::{CacheStorage, CacheStore, DiskCacheStorage, MemoryCacheStorage};
pub use types::{Request, RequestKey, Response};
pub use version::{PKG_VERSION, version_string};
