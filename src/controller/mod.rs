//! The offline cache controller.
//!
//! One [`OfflineCacheController`] is one cache generation. It owns the
//! store `{namespace}-{version}` and moves through
//! [`ControllerState`]s driven by its host:
//!
//! 1. [`install`](OfflineCacheController::install) precaches the App Shell.
//!    All-or-nothing: if any entry fails, nothing is written and the
//!    generation becomes `Redundant`.
//! 2. [`activate`](OfflineCacheController::activate) deletes every other
//!    store in the namespace and claims open clients.
//! 3. [`handle_fetch`](OfflineCacheController::handle_fetch) routes each
//!    request per [`routing`]: network-first for documents, cache-first for
//!    everything else, passthrough for non-GET and cross-origin requests.
//!
//! Every successful network fetch of an intercepted request refreshes the
//! cache, so the store heals itself as users browse online.

mod builder;
pub mod lifecycle;
pub mod routing;

pub use builder::ControllerBuilder;
pub use lifecycle::{ControllerState, WorkerScope};
pub use routing::{FallbackChain, IgnoreReason, Interception, RequestClass, Strategy};

use std::sync::{Arc, PoisonError, RwLock};

use futures_util::future::try_join_all;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::network::Fetcher;
use crate::storage::{CacheStorage, CacheStore};
use crate::telemetry;
use crate::types::{Request, RequestKey, Response};
use crate::version::version_string;
use crate::{Result, ShellCacheError};

/// Joins namespace and version in a store name.
pub const CACHE_NAME_SEPARATOR: char = '-';

/// One generation of the offline cache.
pub struct OfflineCacheController {
    origin: Url,
    namespace: String,
    version: String,
    cache_name: String,
    app_shell: Vec<Url>,
    offline_fallbacks: Vec<Url>,
    skip_waiting: bool,
    claim_clients: bool,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    store: OnceCell<Arc<dyn CacheStore>>,
    state: RwLock<ControllerState>,
}

impl OfflineCacheController {
    /// Create a builder for configuring a controller.
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        origin: Url,
        namespace: String,
        version: String,
        app_shell: Vec<Url>,
        offline_fallbacks: Vec<Url>,
        skip_waiting: bool,
        claim_clients: bool,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let cache_name = format!("{namespace}{CACHE_NAME_SEPARATOR}{version}");
        Self {
            origin,
            namespace,
            version,
            cache_name,
            app_shell,
            offline_fallbacks,
            skip_waiting,
            claim_clients,
            storage,
            fetcher,
            store: OnceCell::new(),
            state: RwLock::new(ControllerState::Uninstalled),
        }
    }

    /// Root URL of the origin this controller serves.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Cache generation identifier.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Name of this generation's store: `{namespace}-{version}`.
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Resolved App Shell URLs, in manifest order.
    pub fn app_shell(&self) -> &[Url] {
        &self.app_shell
    }

    pub fn offline_fallbacks(&self) -> &[Url] {
        &self.offline_fallbacks
    }

    pub fn state(&self) -> ControllerState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ControllerState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Move `from → to`, failing if the controller is elsewhere.
    fn transition(&self, from: ControllerState, to: ControllerState) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != from {
            return Err(ShellCacheError::InvalidState {
                expected: from.as_str(),
                actual: *state,
            });
        }
        *state = to;
        Ok(())
    }

    /// Retire this generation. It stops intercepting immediately.
    pub fn mark_redundant(&self) {
        self.set_state(ControllerState::Redundant);
    }

    /// Whether `name` is another generation of this controller's namespace.
    ///
    /// Namespace and version never contain [`CACHE_NAME_SEPARATOR`], so a
    /// store name splits into them unambiguously. `static-images-v1` is
    /// not a generation of `static`.
    pub fn is_stale_cache(&self, name: &str) -> bool {
        name != self.cache_name
            && name
                .split_once(CACHE_NAME_SEPARATOR)
                .is_some_and(|(namespace, version)| {
                    namespace == self.namespace
                        && !version.is_empty()
                        && !version.contains(CACHE_NAME_SEPARATOR)
                })
    }

    async fn current_store(&self) -> Result<&Arc<dyn CacheStore>> {
        self.store
            .get_or_try_init(|| self.storage.open(&self.cache_name))
            .await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Install this generation: precache every App Shell entry.
    ///
    /// Entries are fetched concurrently; each must succeed with a 2xx
    /// status. Only when all have been fetched are they written, so a
    /// failed install leaves the new store empty. On failure the
    /// controller becomes `Redundant` and `InstallFailed` is returned;
    /// whatever generation was active keeps serving.
    ///
    /// On success the controller is `Installed` and, if configured, asks
    /// `scope` to skip the waiting phase.
    #[instrument(skip(self, scope), fields(cache = %self.cache_name))]
    pub async fn install(&self, scope: &dyn WorkerScope) -> Result<()> {
        self.transition(ControllerState::Uninstalled, ControllerState::Installing)?;
        info!(
            build = %version_string(),
            entries = self.app_shell.len(),
            "installing cache generation"
        );

        match self.precache().await {
            Ok(()) => {
                self.set_state(ControllerState::Installed);
                metrics::counter!(telemetry::INSTALL_TOTAL, "status" => "ok").increment(1);
                info!("cache generation installed");
                if self.skip_waiting {
                    scope.skip_waiting().await;
                }
                Ok(())
            }
            Err(e) => {
                self.set_state(ControllerState::Redundant);
                metrics::counter!(telemetry::INSTALL_TOTAL, "status" => "error").increment(1);
                warn!(error = %e, "cache generation install failed");
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<()> {
        let store = self.current_store().await.map_err(|e| ShellCacheError::InstallFailed {
            url: self.cache_name.clone(),
            reason: format!("cannot open cache: {e}"),
        })?;

        let responses = try_join_all(self.app_shell.iter().map(|url| self.fetch_shell_entry(url)))
            .await?;

        for (url, response) in self.app_shell.iter().zip(responses) {
            store
                .put(RequestKey::get(url), response)
                .await
                .map_err(|e| ShellCacheError::InstallFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    async fn fetch_shell_entry(&self, url: &Url) -> Result<Response> {
        let request = Request::new(reqwest::Method::GET, url.clone());
        let response =
            self.fetcher
                .fetch(&request)
                .await
                .map_err(|e| ShellCacheError::InstallFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        if !response.is_ok() {
            return Err(ShellCacheError::InstallFailed {
                url: url.to_string(),
                reason: format!("status {}", response.status()),
            });
        }
        debug!(%url, "precached");
        Ok(response)
    }

    /// Activate this generation.
    ///
    /// Deletes every store in the namespace other than this generation's,
    /// then, if configured, claims all open clients. Stores outside the
    /// namespace are left alone. A store that cannot be deleted is logged
    /// and skipped; activation still completes.
    ///
    /// Returns the names of the deleted stores.
    #[instrument(skip(self, scope), fields(cache = %self.cache_name))]
    pub async fn activate(&self, scope: &dyn WorkerScope) -> Result<Vec<String>> {
        self.transition(ControllerState::Installed, ControllerState::Activating)?;

        let deleted = match self.delete_stale_caches().await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(error = %e, "could not list caches; stale generations kept");
                Vec::new()
            }
        };

        if self.claim_clients {
            let claimed = scope.claim_clients().await;
            debug!(clients = claimed, "claimed clients");
        }

        self.set_state(ControllerState::Active);
        info!(deleted = deleted.len(), "cache generation active");
        Ok(deleted)
    }

    async fn delete_stale_caches(&self) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for name in self.storage.keys().await? {
            if !self.is_stale_cache(&name) {
                continue;
            }
            match self.storage.delete(&name).await {
                Ok(true) => {
                    debug!(cache = %name, "deleted stale cache");
                    deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => warn!(cache = %name, error = %e, "failed to delete stale cache"),
            }
        }
        metrics::counter!(telemetry::STALE_CACHES_DELETED_TOTAL).increment(deleted.len() as u64);
        Ok(deleted)
    }

    // ========================================================================
    // Fetch interception
    // ========================================================================

    /// Offer an intercepted request to this generation.
    ///
    /// Returns `Passthrough` unless the controller is `Active` and the
    /// request is a same-origin GET. Otherwise answers per the routing
    /// policy. An `Err` means the fetcher failed and no cached
    /// alternative existed; the fetcher's error is returned unchanged.
    #[instrument(skip(self, request), fields(method = %request.method(), url = %request.url()))]
    pub async fn handle_fetch(&self, request: &Request) -> Result<Interception> {
        if !self.state().can_intercept() {
            return Ok(Interception::Passthrough);
        }

        let class = routing::classify(request, &self.origin.origin());
        let response = match class {
            RequestClass::Ignored(reason) => {
                debug!(?reason, "not intercepted");
                return Ok(Interception::Passthrough);
            }
            RequestClass::Document => self.network_first(request).await?,
            RequestClass::Asset => self.cache_first(request).await?,
        };
        Ok(Interception::Responded(response))
    }

    /// Network, then the fallback chain.
    async fn network_first(&self, request: &Request) -> Result<Response> {
        let strategy = Strategy::NetworkFirst;
        let error = match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store_copy(request.key(), &response).await;
                record_fetch(strategy, "network");
                return Ok(response);
            }
            // Any fetch rejection is masked by the cache where possible.
            Err(e) => e,
        };

        let chain = FallbackChain::for_document(request, &self.offline_fallbacks);
        for (position, key) in chain.keys().iter().enumerate() {
            if let Some(cached) = self.lookup(key, strategy).await {
                let source = if position == 0 { "cache" } else { "fallback" };
                debug!(%key, source, error = %error, "network failed, served from cache");
                record_fetch(strategy, source);
                return Ok(cached);
            }
        }

        warn!(error = %error, "network failed and no cached page");
        record_fetch(strategy, "error");
        Err(error)
    }

    /// Cache, then network.
    async fn cache_first(&self, request: &Request) -> Result<Response> {
        let strategy = Strategy::CacheFirst;
        let key = request.key();
        if let Some(cached) = self.lookup(&key, strategy).await {
            record_fetch(strategy, "cache");
            return Ok(cached);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store_copy(key, &response).await;
                record_fetch(strategy, "network");
                Ok(response)
            }
            Err(e) => {
                // Nothing was cached, so there is nothing to fall back to.
                debug!(error = %e, "asset unavailable");
                record_fetch(strategy, "error");
                Err(e)
            }
        }
    }

    /// Cache lookup that degrades storage errors to a miss.
    async fn lookup(&self, key: &RequestKey, strategy: Strategy) -> Option<Response> {
        let found = match self.current_store().await {
            Ok(store) => match store.get(key).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(%key, error = %e, "cache read failed");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "cache open failed");
                None
            }
        };
        let metric = if found.is_some() {
            telemetry::CACHE_HITS_TOTAL
        } else {
            telemetry::CACHE_MISSES_TOTAL
        };
        metrics::counter!(metric, "strategy" => strategy.label()).increment(1);
        found
    }

    /// Store a copy of a live response. Failures never reach the page.
    async fn store_copy(&self, key: RequestKey, response: &Response) {
        if !response.is_storable() {
            debug!(%key, status = response.status().as_u16(), "response not storable");
            return;
        }
        let result = match self.current_store().await {
            Ok(store) => store.put(key.clone(), response.clone()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(%key, error = %e, "cache write failed");
        }
    }
}

impl std::fmt::Debug for OfflineCacheController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineCacheController")
            .field("origin", &self.origin.as_str())
            .field("cache_name", &self.cache_name)
            .field("state", &self.state())
            .finish()
    }
}

fn record_fetch(strategy: Strategy, source: &'static str) {
    metrics::counter!(telemetry::FETCH_TOTAL, "strategy" => strategy.label(), "source" => source)
        .increment(1);
}
