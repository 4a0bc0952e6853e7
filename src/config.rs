//! Deployment configuration.
//!
//! The cache generation and the App Shell manifest are fixed when a build
//! is deployed. They are read from a TOML file with the following
//! resolution order:
//! 1. explicit path (if provided)
//! 2. `~/.shellcache/config.toml` (user)
//! 3. `/etc/shellcache/config.toml` (system)
//!
//! Only `origin` is mandatory; everything else defaults to the values the
//! hotel inventory deployment ships with.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Result, ShellCacheError};

/// Environment variable overriding the default on-disk cache root.
pub const CACHE_DIR_ENV: &str = "SHELLCACHE_CACHE_DIR";

/// Controller configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Origin the controller serves, e.g. `https://hotel.example.com`.
    pub origin: String,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Cache generation and App Shell manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Logical namespace; store names are `{namespace}-{version}`.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Cache generation identifier (default: "v1.0.0").
    #[serde(default = "default_version")]
    pub version: String,
    /// Resources that must be cached at install, in order.
    #[serde(default = "default_app_shell")]
    pub app_shell: Vec<String>,
    /// Entries tried, in order, when a document request fails offline and
    /// has no cached copy of its own (default: `["/"]`).
    #[serde(default = "default_offline_fallbacks")]
    pub offline_fallbacks: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            version: default_version(),
            app_shell: default_app_shell(),
            offline_fallbacks: default_offline_fallbacks(),
        }
    }
}

fn default_namespace() -> String {
    "static".to_string()
}

fn default_version() -> String {
    "v1.0.0".to_string()
}

pub(crate) fn default_app_shell() -> Vec<String> {
    [
        "/",
        "/dashboard/",
        "/static/css/main.css",
        "/static/js/main.js",
        "/static/manifest.webmanifest",
        "/static/icons/icon-192.svg",
        "/static/icons/icon-512.svg",
        "/static/icons/maskable-512.svg",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub(crate) fn default_offline_fallbacks() -> Vec<String> {
    vec!["/".to_string()]
}

/// Lifecycle behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Activate right after install instead of waiting for old clients to
    /// close (default: true).
    #[serde(default = "default_true")]
    pub skip_waiting: bool,
    /// Take control of already-open clients on activation (default: true).
    #[serde(default = "default_true")]
    pub claim_clients: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            skip_waiting: true,
            claim_clients: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// HTTP fetcher settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout() -> u64 {
    30
}

/// Where cache stores live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process, lost on restart.
    #[default]
    Memory,
    /// One directory per store under [`StorageConfig::dir`].
    Disk,
}

/// Cache storage settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory for the disk backend.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Per-store entry bound for the memory backend (default: unbounded).
    #[serde(default)]
    pub max_entries: Option<u64>,
}

impl StorageConfig {
    /// Root directory for the disk backend.
    ///
    /// Explicit `dir`, else `$SHELLCACHE_CACHE_DIR`, else
    /// `<platform cache dir>/shellcache`.
    pub fn resolve_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            std::env::var(CACHE_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    dirs::cache_dir()
                        .unwrap_or_else(|| PathBuf::from(".cache"))
                        .join("shellcache")
                })
        })
    }
}

impl Config {
    /// Configuration for `origin` with every other value defaulted.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            cache: CacheConfig::default(),
            lifecycle: LifecycleConfig::default(),
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.shellcache/config.toml`
    /// 3. `/etc/shellcache/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            ShellCacheError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content).map_err(|e| {
            ShellCacheError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ShellCacheError::Configuration(e.to_string()))
    }

    /// Name of the current cache store: `{namespace}-{version}`.
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache.namespace, self.cache.version)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(ShellCacheError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".shellcache").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/shellcache/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(ShellCacheError::Configuration(
            "No config file found. Create ~/.shellcache/config.toml or /etc/shellcache/config.toml"
                .to_string(),
        ))
    }
}
