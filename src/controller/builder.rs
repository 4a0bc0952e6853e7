//! Builder for controller generations

use std::sync::Arc;

use url::Url;

use super::{CACHE_NAME_SEPARATOR, OfflineCacheController};
use crate::config::{self, Config, NetworkConfig, StorageBackend};
use crate::network::{Fetcher, HttpFetcher};
use crate::storage::{self, CacheStorage, MemoryCacheStorage};
use crate::{Result, ShellCacheError};

/// Builder for an [`OfflineCacheController`].
///
/// Everything except the origin defaults to the shipped deployment:
/// namespace `static`, generation `v1.0.0`, the hotel App Shell, `/` as
/// offline page, skip-waiting and client claiming on, in-memory storage,
/// and an HTTP fetcher with a 30 second timeout.
///
/// ```rust
/// # use shellcache::OfflineCacheController;
/// let controller = OfflineCacheController::builder()
///     .origin("https://hotel.example.com")
///     .version("v1.2.0")
///     .app_shell(["/", "/static/css/main.css"])
///     .build()?;
/// assert_eq!(controller.cache_name(), "static-v1.2.0");
/// # Ok::<(), shellcache::ShellCacheError>(())
/// ```
pub struct ControllerBuilder {
    origin: Option<String>,
    namespace: String,
    version: String,
    app_shell: Vec<String>,
    offline_fallbacks: Vec<String>,
    skip_waiting: bool,
    claim_clients: bool,
    network: NetworkConfig,
    storage: Option<Arc<dyn CacheStorage>>,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl ControllerBuilder {
    pub fn new() -> Self {
        let defaults = config::CacheConfig::default();
        Self {
            origin: None,
            namespace: defaults.namespace,
            version: defaults.version,
            app_shell: defaults.app_shell,
            offline_fallbacks: defaults.offline_fallbacks,
            skip_waiting: true,
            claim_clients: true,
            network: NetworkConfig::default(),
            storage: None,
            fetcher: None,
        }
    }

    /// Start from a loaded [`Config`], including its storage backend.
    ///
    /// A bounded memory store must have room for the whole App Shell.
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.storage.backend == StorageBackend::Memory
            && let Some(max) = config.storage.max_entries
            && max < config.cache.app_shell.len() as u64
        {
            return Err(ShellCacheError::Configuration(format!(
                "storage.max_entries ({max}) is smaller than the App Shell ({} entries)",
                config.cache.app_shell.len()
            )));
        }
        Ok(Self {
            origin: Some(config.origin.clone()),
            namespace: config.cache.namespace.clone(),
            version: config.cache.version.clone(),
            app_shell: config.cache.app_shell.clone(),
            offline_fallbacks: config.cache.offline_fallbacks.clone(),
            skip_waiting: config.lifecycle.skip_waiting,
            claim_clients: config.lifecycle.claim_clients,
            network: config.network.clone(),
            storage: Some(storage::from_config(&config.storage)?),
            fetcher: None,
        })
    }

    /// Origin this controller serves (scheme, host, port). Any path is ignored.
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Logical namespace; stores are named `{namespace}-{version}`.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Cache generation identifier.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Resources to precache at install. Paths resolve against the origin.
    pub fn app_shell<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.app_shell = entries.into_iter().map(Into::into).collect();
        self
    }

    /// Pages served, in order, to offline document requests with no cached
    /// copy of their own.
    pub fn offline_fallbacks<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.offline_fallbacks = entries.into_iter().map(Into::into).collect();
        self
    }

    pub fn skip_waiting(mut self, enabled: bool) -> Self {
        self.skip_waiting = enabled;
        self
    }

    pub fn claim_clients(mut self, enabled: bool) -> Self {
        self.claim_clients = enabled;
        self
    }

    /// Cache storage shared across generations. Default: a fresh
    /// [`MemoryCacheStorage`].
    pub fn storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Network access. Default: [`HttpFetcher`].
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Set the default fetcher's timeout (seconds).
    pub fn timeout(mut self, secs: u64) -> Self {
        self.network.timeout_secs = secs;
        self
    }

    /// Validate and build the controller, in state `Uninstalled`.
    pub fn build(self) -> Result<OfflineCacheController> {
        let origin = self
            .origin
            .as_deref()
            .ok_or_else(|| ShellCacheError::Configuration("origin is required".to_string()))?;
        let origin = parse_origin(origin)?;

        validate_name_part("namespace", &self.namespace)?;
        validate_name_part("version", &self.version)?;

        let app_shell = resolve_all(&origin, &self.app_shell, "app_shell")?;
        let offline_fallbacks = resolve_all(&origin, &self.offline_fallbacks, "offline_fallbacks")?;

        let storage: Arc<dyn CacheStorage> = match self.storage {
            Some(storage) => storage,
            None => Arc::new(MemoryCacheStorage::new()),
        };
        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::from_config(&self.network)?),
        };

        Ok(OfflineCacheController::new(
            origin,
            self.namespace,
            self.version,
            app_shell,
            offline_fallbacks,
            self.skip_waiting,
            self.claim_clients,
            storage,
            fetcher,
        ))
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an origin and normalise it to its root URL (`scheme://host:port/`).
fn parse_origin(origin: &str) -> Result<Url> {
    let url = Url::parse(origin)
        .map_err(|e| ShellCacheError::Configuration(format!("invalid origin {origin:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
        return Err(ShellCacheError::Configuration(format!(
            "origin must be an http(s) URL with a host, got {origin:?}"
        )));
    }
    let root = Url::parse(&url.origin().ascii_serialization())?;
    Ok(root)
}

/// Namespace and version are joined into the store name, so neither may be
/// empty or contain the separator.
fn validate_name_part(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ShellCacheError::Configuration(format!(
            "{field} must not be empty"
        )));
    }
    if value.contains(CACHE_NAME_SEPARATOR) {
        return Err(ShellCacheError::Configuration(format!(
            "{field} {value:?} must not contain '{CACHE_NAME_SEPARATOR}'"
        )));
    }
    Ok(())
}

fn resolve_all(origin: &Url, entries: &[String], field: &str) -> Result<Vec<Url>> {
    entries
        .iter()
        .map(|entry| {
            let url = origin.join(entry).map_err(|e| {
                ShellCacheError::Configuration(format!("invalid {field} entry {entry:?}: {e}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ShellCacheError::Configuration(format!(
                    "{field} entry {entry:?} is not an http(s) URL"
                )));
            }
            Ok(url)
        })
        .collect()
}
