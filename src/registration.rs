//! Hosting runtime for controller generations.
//!
//! A [`Registration`] plays the part the browser plays for a service
//! worker: it installs new generations, decides when they activate, keeps
//! track of open clients (pages), and routes each client's requests
//! either through the active controller or straight to the network.
//!
//! # Generation handover
//!
//! ```text
//! register(v2) ──► v2.install() ──┬─ Err ──► v2 Redundant, v1 keeps serving
//!                                 │
//!                                 └─ Ok ──► skip-waiting requested, or
//!                                           nothing controlled by v1?
//!                                              │yes               │no
//!                                              ▼                  ▼
//!                                       v2.activate()       v2 waits until the
//!                                       v1 Redundant        last v1 client closes
//! ```
//!
//! Lifecycle phases are awaited in order and serialised across the whole
//! registration: an install always finishes before its activation starts,
//! and two generations never activate concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

use crate::Result;
use crate::controller::{Interception, OfflineCacheController, WorkerScope};
use crate::network::Fetcher;
use crate::types::{Request, Response};

/// Identifier of an open client (page).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Hosts the active and waiting controller generations for one origin.
pub struct Registration {
    fetcher: Arc<dyn Fetcher>,
    active: RwLock<Option<Arc<OfflineCacheController>>>,
    waiting: RwLock<Option<Arc<OfflineCacheController>>>,
    /// Open clients and whether each is controlled.
    clients: RwLock<HashMap<ClientId, bool>>,
    next_client: AtomicU64,
    lifecycle: Mutex<()>,
}

impl Registration {
    /// Create an empty registration. `fetcher` serves requests the
    /// controller does not intercept.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            active: RwLock::new(None),
            waiting: RwLock::new(None),
            clients: RwLock::new(HashMap::new()),
            next_client: AtomicU64::new(1),
            lifecycle: Mutex::new(()),
        }
    }

    /// The generation currently answering fetches.
    pub async fn active(&self) -> Option<Arc<OfflineCacheController>> {
        self.active.read().await.clone()
    }

    /// An installed generation waiting for the active one's clients to close.
    pub async fn waiting(&self) -> Option<Arc<OfflineCacheController>> {
        self.waiting.read().await.clone()
    }

    /// Install `controller` and activate it when allowed.
    ///
    /// On install failure the controller is `Redundant`, the active
    /// generation is untouched, and the `InstallFailed` error is returned.
    #[instrument(skip(self, controller), fields(cache = %controller.cache_name()))]
    pub async fn register(&self, controller: Arc<OfflineCacheController>) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let scope = LifecycleScope::new(self);
        controller.install(&scope).await?;

        let has_active = self.active.read().await.is_some();
        if scope.skip_waiting_requested() || !has_active || !self.has_controlled_clients().await {
            if let Some(previous) = self.waiting.write().await.take() {
                previous.mark_redundant();
            }
            self.activate(controller).await
        } else {
            if let Some(previous) = self.waiting.write().await.replace(controller) {
                // A newer install supersedes the older waiting one.
                previous.mark_redundant();
            }
            info!("installed; waiting for clients of the active generation to close");
            Ok(())
        }
    }

    /// Activate `controller` and make it the active generation.
    /// Caller holds the lifecycle lock.
    ///
    /// A claim requested during activation is applied only once the
    /// controller holds the active slot, so a claimed client is never
    /// routed to the generation being replaced.
    async fn activate(&self, controller: Arc<OfflineCacheController>) -> Result<()> {
        let scope = LifecycleScope::new(self);
        controller.activate(&scope).await?;

        if let Some(previous) = self.active.write().await.replace(controller) {
            previous.mark_redundant();
        }
        if scope.claim_requested() {
            let claimed = self.claim().await;
            debug!(clients = claimed, "clients claimed by new generation");
        }
        Ok(())
    }

    /// Activate the waiting generation if no client is controlled any more.
    async fn promote_waiting_if_idle(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.has_controlled_clients().await {
            return Ok(());
        }
        let Some(waiting) = self.waiting.write().await.take() else {
            return Ok(());
        };
        info!(cache = %waiting.cache_name(), "last client closed; activating waiting generation");
        self.activate(waiting).await
    }

    // ========================================================================
    // Clients
    // ========================================================================

    /// Open a client. It is controlled iff a generation is active now.
    pub async fn connect_client(&self) -> ClientId {
        let id = ClientId(self.next_client.fetch_add(1, Ordering::Relaxed));
        let controlled = self.active.read().await.is_some();
        self.clients.write().await.insert(id, controlled);
        debug!(client = id.0, controlled, "client connected");
        id
    }

    /// Close a client. Closing the last controlled client lets a waiting
    /// generation activate.
    pub async fn disconnect_client(&self, id: ClientId) -> Result<()> {
        let removed = self.clients.write().await.remove(&id);
        debug!(client = id.0, known = removed.is_some(), "client disconnected");
        if removed == Some(true) {
            self.promote_waiting_if_idle().await?;
        }
        Ok(())
    }

    /// Whether requests from `id` go through the active generation.
    pub async fn is_controlled(&self, id: ClientId) -> bool {
        self.clients.read().await.get(&id).copied().unwrap_or(false)
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    async fn has_controlled_clients(&self) -> bool {
        self.clients.read().await.values().any(|controlled| *controlled)
    }

    /// Control every open client. Returns how many clients there are.
    async fn claim(&self) -> usize {
        let mut clients = self.clients.write().await;
        for controlled in clients.values_mut() {
            *controlled = true;
        }
        clients.len()
    }

    // ========================================================================
    // Fetch dispatch
    // ========================================================================

    /// Perform a request on behalf of client `id`.
    ///
    /// Controlled clients go through the active generation; requests it
    /// passes through, and all requests of uncontrolled or unknown
    /// clients, go straight to the network with no cache involvement.
    pub async fn dispatch(&self, id: ClientId, request: &Request) -> Result<Response> {
        let controller = if self.is_controlled(id).await {
            self.active().await
        } else {
            None
        };

        if let Some(controller) = controller
            && let Interception::Responded(response) = controller.handle_fetch(request).await?
        {
            return Ok(response);
        }
        self.fetcher.fetch(request).await
    }
}

/// Worker scope handed to a controller for one lifecycle phase.
struct LifecycleScope<'a> {
    registration: &'a Registration,
    skip_waiting: AtomicBool,
    claim: AtomicBool,
}

impl<'a> LifecycleScope<'a> {
    fn new(registration: &'a Registration) -> Self {
        Self {
            registration,
            skip_waiting: AtomicBool::new(false),
            claim: AtomicBool::new(false),
        }
    }

    fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    fn claim_requested(&self) -> bool {
        self.claim.load(Ordering::Acquire)
    }
}

#[async_trait]
impl<'a> WorkerScope for LifecycleScope<'a> {
    async fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Release);
    }

    /// Deferred until the claiming generation is active.
    async fn claim_clients(&self) -> usize {
        self.claim.store(true, Ordering::Release);
        self.registration.client_count().await
    }
}
