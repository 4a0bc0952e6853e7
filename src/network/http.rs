//! reqwest-backed fetcher

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::Fetcher;
use crate::Result;
use crate::config::NetworkConfig;
use crate::types::{Request, Response};

/// [`Fetcher`] over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout (30 seconds).
    pub fn new() -> Result<Self> {
        Self::from_config(&NetworkConfig::default())
    }

    pub fn from_config(config: &NetworkConfig) -> Result<Self> {
        Self::with_timeout(config.timeout())
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client, e.g. to share a connection pool.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self, request), fields(method = %request.method(), url = %request.url()))]
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let res = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone())
            .send()
            .await?;

        let status = res.status();
        let headers = res.headers().clone();
        let url = res.url().clone();
        let body = res.bytes().await?;
        debug!(status = status.as_u16(), bytes = body.len(), "fetched");

        Ok(Response::new(status, body)
            .with_headers(headers)
            .with_url(url))
    }
}
