//! Shellcache error types

use crate::controller::ControllerState;

/// Shellcache error types
#[derive(Debug, thiserror::Error)]
pub enum ShellCacheError {
    // Lifecycle errors
    /// An App Shell entry could not be fetched (or came back non-2xx)
    /// while installing a generation. Fatal to that generation: it never
    /// activates and the previous generation keeps serving.
    #[error("install failed for {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    #[error("invalid controller state: expected {expected}, got {actual}")]
    InvalidState {
        expected: &'static str,
        actual: ControllerState,
    },

    // Network errors
    /// Transport-level failure (offline, DNS, timeout, TLS...).
    ///
    /// The routing policy masks this with a cache lookup where it can.
    /// When no cached alternative exists it is returned to the caller
    /// unchanged.
    #[error("network error: {0}")]
    Network(String),

    // Storage errors
    #[error("storage error: {0}")]
    Storage(String),

    /// The key or response cannot be stored (non-GET key, partial content,
    /// `Vary: *`).
    #[error("response not storable: {0}")]
    NotStorable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Input errors
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ShellCacheError {
    /// Whether this error is a network failure the cache may mask.
    pub fn is_network(&self) -> bool {
        matches!(self, ShellCacheError::Network(_))
    }

    /// Whether this error aborted a generation's installation.
    pub fn is_install_failure(&self) -> bool {
        matches!(self, ShellCacheError::InstallFailed { .. })
    }
}

impl From<reqwest::Error> for ShellCacheError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            ShellCacheError::InvalidRequest(err.to_string())
        } else {
            ShellCacheError::Network(err.to_string())
        }
    }
}

/// Result type alias for shellcache operations
pub type Result<T> = std::result::Result<T, ShellCacheError>;
