//! Network access.
//!
//! The controller reaches the network only through [`Fetcher`], so tests
//! can swap in a scripted fake and hosts can route through their own
//! client.

mod http;

pub use http::HttpFetcher;

use async_trait::async_trait;

use crate::Result;
use crate::types::{Request, Response};

/// Performs a request against the network.
///
/// A response with any HTTP status is a successful fetch. Only transport
/// failures (offline, DNS, timeout, TLS) are errors, reported as
/// [`ShellCacheError::Network`](crate::ShellCacheError::Network).
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}
