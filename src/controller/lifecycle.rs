//! Controller lifecycle states and the host capabilities a lifecycle
//! phase may call back into.

use std::fmt;

use async_trait::async_trait;

/// Lifecycle state of one controller generation.
///
/// ```text
/// Uninstalled → Installing → Installed → Activating → Active
///                    │                                   │
///                    └──(install failed)──► Redundant ◄──┘ (superseded)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    Uninstalled,
    /// Precaching the App Shell.
    Installing,
    /// App Shell cached; waiting to activate.
    Installed,
    /// Pruning stale stores and claiming clients.
    Activating,
    /// Intercepting fetches.
    Active,
    /// Install failed or a newer generation took over. Terminal.
    Redundant,
}

impl ControllerState {
    /// Only an active generation answers fetches.
    pub fn can_intercept(&self) -> bool {
        matches!(self, ControllerState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ControllerState::Redundant)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Uninstalled => "uninstalled",
            ControllerState::Installing => "installing",
            ControllerState::Installed => "installed",
            ControllerState::Activating => "activating",
            ControllerState::Active => "active",
            ControllerState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the hosting runtime lets a controller do during its lifecycle.
///
/// Passed to [`install`](super::OfflineCacheController::install) and
/// [`activate`](super::OfflineCacheController::activate).
/// [`Registration`](crate::Registration) is the in-crate host.
#[async_trait]
pub trait WorkerScope: Send + Sync {
    /// Ask to activate as soon as install succeeds, without waiting for
    /// clients of the previous generation to close.
    async fn skip_waiting(&self);

    /// Take control of every open client, including those loaded under a
    /// previous generation. The host may apply the claim once activation
    /// has finished. Returns the number of clients claimed.
    async fn claim_clients(&self) -> usize;
}
