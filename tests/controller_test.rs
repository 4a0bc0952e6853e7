//! Tests for [`OfflineCacheController`] lifecycle and routing policy.
//!
//! The network is a scripted in-memory fake; storage is the real
//! [`MemoryCacheStorage`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Method, StatusCode};
use url::Url;

use shellcache::{
    CacheStorage, CacheStore, ControllerState, Fetcher, Interception, MemoryCacheStorage,
    OfflineCacheController, Request, RequestKey, Response, Result, ShellCacheError, WorkerScope,
};

const ORIGIN: &str = "https://hotel.test";
const SHELL: [&str; 4] = ["/", "/dashboard/", "/static/css/main.css", "/static/js/main.js"];

// ============================================================================
// Fakes
// ============================================================================

/// Scripted network: known URLs answer with their response, unknown URLs
/// answer 404, failing URLs (or everything while offline) error.
struct MockNetwork {
    routes: Mutex<HashMap<String, Response>>,
    failing: Mutex<HashSet<String>>,
    online: AtomicBool,
    /// Fail every request with a local I/O error instead of a network one.
    broken: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockNetwork {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            online: AtomicBool::new(true),
            broken: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn with_shell() -> Arc<Self> {
        let net = Self::new();
        for path in SHELL {
            net.serve(path, &format!("shell {path}"));
        }
        net
    }

    fn serve(&self, path: &str, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url(path).to_string(), Response::ok(body.to_string()));
    }

    fn serve_response(&self, path: &str, response: Response) {
        self.routes
            .lock()
            .unwrap()
            .insert(url(path).to_string(), response);
    }

    fn fail(&self, path: &str) {
        self.failing.lock().unwrap().insert(url(path).to_string());
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn calls_for(&self, path: &str) -> usize {
        let target = url(path).to_string();
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|u| **u == target)
            .count()
    }
}

#[async_trait]
impl Fetcher for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let target = request.url().to_string();
        self.calls.lock().unwrap().push(target.clone());
        if self.broken.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("socket closed").into());
        }
        if !self.online.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&target) {
            return Err(ShellCacheError::Network(format!("unreachable: {target}")));
        }
        Ok(self
            .routes
            .lock()
            .unwrap()
            .get(&target)
            .cloned()
            .unwrap_or_else(|| Response::new(StatusCode::NOT_FOUND, "not found")))
    }
}

#[derive(Default)]
struct RecordingScope {
    skip_waiting: AtomicBool,
    claims: AtomicUsize,
}

#[async_trait]
impl WorkerScope for RecordingScope {
    async fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    async fn claim_clients(&self) -> usize {
        self.claims.fetch_add(1, Ordering::SeqCst);
        0
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

fn key(path: &str) -> RequestKey {
    RequestKey::get(&url(path))
}

fn document(path: &str) -> Request {
    Request::document(url(path).as_str()).unwrap()
}

fn asset(path: &str) -> Request {
    Request::get(url(path).as_str())
        .unwrap()
        .header(ACCEPT, HeaderValue::from_static("*/*"))
}

fn controller(
    version: &str,
    storage: &Arc<MemoryCacheStorage>,
    net: &Arc<MockNetwork>,
) -> OfflineCacheController {
    OfflineCacheController::builder()
        .origin(ORIGIN)
        .version(version)
        .app_shell(SHELL)
        .storage(storage.clone())
        .fetcher(net.clone())
        .build()
        .unwrap()
}

async fn active_controller(
    storage: &Arc<MemoryCacheStorage>,
    net: &Arc<MockNetwork>,
) -> OfflineCacheController {
    let c = controller("v1.0.0", storage, net);
    let scope = RecordingScope::default();
    c.install(&scope).await.unwrap();
    c.activate(&scope).await.unwrap();
    assert_eq!(c.state(), ControllerState::Active);
    c
}

fn body(interception: Interception) -> String {
    let response = interception.into_response().expect("intercepted");
    String::from_utf8(response.body().to_vec()).unwrap()
}

// ============================================================================
// Install
// ============================================================================

#[tokio::test]
async fn install_caches_every_shell_entry() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    let c = controller("v1.0.0", &storage, &net);
    let scope = RecordingScope::default();

    c.install(&scope).await.unwrap();

    assert_eq!(c.state(), ControllerState::Installed);
    assert!(scope.skip_waiting.load(Ordering::SeqCst));
    let store = storage.open("static-v1.0.0").await.unwrap();
    for path in SHELL {
        let cached = store.get(&key(path)).await.unwrap();
        let cached = cached.unwrap_or_else(|| panic!("{path} not cached"));
        assert!(!cached.body().is_empty());
    }
}

#[tokio::test]
async fn install_fails_when_an_entry_is_unreachable() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    net.fail("/static/js/main.js");
    let c = controller("v1.0.0", &storage, &net);
    let scope = RecordingScope::default();

    let err = c.install(&scope).await.unwrap_err();

    match err {
        ShellCacheError::InstallFailed { url, .. } => {
            assert_eq!(url, "https://hotel.test/static/js/main.js")
        }
        other => panic!("expected InstallFailed, got {other:?}"),
    }
    assert_eq!(c.state(), ControllerState::Redundant);
    assert!(!scope.skip_waiting.load(Ordering::SeqCst));
}

#[tokio::test]
async fn install_is_all_or_nothing() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    net.fail("/dashboard/");
    let c = controller("v1.0.0", &storage, &net);

    assert!(c.install(&RecordingScope::default()).await.is_err());

    let store = storage.open("static-v1.0.0").await.unwrap();
    assert!(store.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn install_rejects_non_success_status() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    net.serve_response(
        "/static/css/main.css",
        Response::new(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
    );
    let c = controller("v1.0.0", &storage, &net);

    let err = c.install(&RecordingScope::default()).await.unwrap_err();
    assert!(err.is_install_failure());
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn install_twice_is_invalid_state() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    let c = controller("v1.0.0", &storage, &net);
    let scope = RecordingScope::default();
    c.install(&scope).await.unwrap();

    let err = c.install(&scope).await.unwrap_err();
    assert!(matches!(
        err,
        ShellCacheError::InvalidState {
            actual: ControllerState::Installed,
            ..
        }
    ));
}

#[tokio::test]
async fn skip_waiting_can_be_disabled() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    let c = OfflineCacheController::builder()
        .origin(ORIGIN)
        .app_shell(SHELL)
        .skip_waiting(false)
        .storage(storage.clone())
        .fetcher(net.clone())
        .build()
        .unwrap();
    let scope = RecordingScope::default();

    c.install(&scope).await.unwrap();
    assert!(!scope.skip_waiting.load(Ordering::SeqCst));
}

// ============================================================================
// Activate
// ============================================================================

#[tokio::test]
async fn activate_deletes_stale_generations_in_namespace() {
    let storage = Arc::new(MemoryCacheStorage::new());
    storage.open("static-v0.9.0").await.unwrap();
    storage.open("static-v0.8.0").await.unwrap();
    storage.open("uploads-v1").await.unwrap();
    let net = MockNetwork::with_shell();
    let c = controller("v1.0.0", &storage, &net);
    let scope = RecordingScope::default();
    c.install(&scope).await.unwrap();

    let mut deleted = c.activate(&scope).await.unwrap();
    deleted.sort();

    assert_eq!(deleted, vec!["static-v0.8.0", "static-v0.9.0"]);
    assert_eq!(
        storage.keys().await.unwrap(),
        vec!["uploads-v1", "static-v1.0.0"]
    );
    assert_eq!(scope.claims.load(Ordering::SeqCst), 1);
    assert_eq!(c.state(), ControllerState::Active);
}

#[tokio::test]
async fn activate_keeps_stores_of_namespaces_sharing_a_prefix() {
    let storage = Arc::new(MemoryCacheStorage::new());
    storage.open("static-images-v1").await.unwrap();
    storage.open("static-v0.9.0").await.unwrap();
    let net = MockNetwork::with_shell();
    let c = controller("v2", &storage, &net);
    let scope = RecordingScope::default();
    c.install(&scope).await.unwrap();

    let deleted = c.activate(&scope).await.unwrap();

    assert_eq!(deleted, vec!["static-v0.9.0"]);
    assert!(storage.has("static-images-v1").await.unwrap());
    assert!(!storage.has("static-v0.9.0").await.unwrap());
}

#[tokio::test]
async fn activate_requires_install() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    let c = controller("v1.0.0", &storage, &net);

    let err = c.activate(&RecordingScope::default()).await.unwrap_err();
    assert!(matches!(err, ShellCacheError::InvalidState { .. }));
    assert_eq!(c.state(), ControllerState::Uninstalled);
}

#[tokio::test]
async fn claim_can_be_disabled() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    let c = OfflineCacheController::builder()
        .origin(ORIGIN)
        .app_shell(SHELL)
        .claim_clients(false)
        .storage(storage.clone())
        .fetcher(net.clone())
        .build()
        .unwrap();
    let scope = RecordingScope::default();
    c.install(&scope).await.unwrap();
    c.activate(&scope).await.unwrap();
    assert_eq!(scope.claims.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Document requests: network-first
// ============================================================================

#[tokio::test]
async fn document_online_returns_live_response_and_caches_it() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    net.serve("/inventario/", "inventory v1");
    let c = active_controller(&storage, &net).await;

    let got = c.handle_fetch(&document("/inventario/")).await.unwrap();
    assert_eq!(body(got), "inventory v1");

    let store = storage.open(c.cache_name()).await.unwrap();
    let cached = store.get(&key("/inventario/")).await.unwrap().unwrap();
    assert_eq!(cached.body().as_ref(), b"inventory v1");
}

#[tokio::test]
async fn document_online_refreshes_stale_copy() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    let c = active_controller(&storage, &net).await;
    net.serve("/dashboard/", "dashboard, today");

    let got = c.handle_fetch(&document("/dashboard/")).await.unwrap();
    assert_eq!(body(got), "dashboard, today");

    net.set_online(false);
    let got = c.handle_fetch(&document("/dashboard/")).await.unwrap();
    assert_eq!(body(got), "dashboard, today");
}

#[tokio::test]
async fn document_offline_serves_exact_cached_copy() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    let c = active_controller(&storage, &net).await;
    net.set_online(false);

    let got = c.handle_fetch(&document("/dashboard/")).await.unwrap();
    assert_eq!(body(got), "shell /dashboard/");
}

#[tokio::test]
async fn document_offline_without_copy_falls_back_to_root() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    let c = active_controller(&storage, &net).await;
    net.set_online(false);

    let got = c.handle_fetch(&document("/pedidos/42/")).await.unwrap();
    let root = storage
        .open(c.cache_name())
        .await
        .unwrap()
        .get(&key("/"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.into_response().unwrap(), root);
}

#[tokio::test]
async fn document_offline_with_nothing_cached_propagates_network_error() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::new();
    let c = OfflineCacheController::builder()
        .origin(ORIGIN)
        .app_shell(Vec::<String>::new())
        .storage(storage.clone())
        .fetcher(net.clone())
        .build()
        .unwrap();
    let scope = RecordingScope::default();
    c.install(&scope).await.unwrap();
    c.activate(&scope).await.unwrap();
    net.set_online(false);

    let err = c.handle_fetch(&document("/reportes/")).await.unwrap_err();
    assert!(err.is_network());
    assert!(err.to_string().contains("https://hotel.test/reportes/"));
}

#[tokio::test]
async fn offline_fallbacks_are_tried_in_order() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    net.serve("/offline/", "you are offline");
    let c = OfflineCacheController::builder()
        .origin(ORIGIN)
        .app_shell(["/", "/offline/"])
        .offline_fallbacks(["/offline/", "/"])
        .storage(storage.clone())
        .fetcher(net.clone())
        .build()
        .unwrap();
    let scope = RecordingScope::default();
    c.install(&scope).await.unwrap();
    c.activate(&scope).await.unwrap();
    net.set_online(false);

    let got = c.handle_fetch(&document("/usuarios/")).await.unwrap();
    assert_eq!(body(got), "you are offline");
}

#[tokio::test]
async fn document_falls_back_on_any_fetcher_error() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    let c = active_controller(&storage, &net).await;
    net.broken.store(true, Ordering::SeqCst);

    let cached = c.handle_fetch(&document("/dashboard/")).await.unwrap();
    assert_eq!(body(cached), "shell /dashboard/");

    let fallback = c.handle_fetch(&document("/reports/")).await.unwrap();
    assert_eq!(body(fallback), "shell /");
}

#[tokio::test]
async fn fetcher_error_without_cached_page_is_returned_unchanged() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    let c = OfflineCacheController::builder()
        .origin(ORIGIN)
        .app_shell(["/static/css/main.css"])
        .storage(storage.clone())
        .fetcher(net.clone())
        .build()
        .unwrap();
    let scope = RecordingScope::default();
    c.install(&scope).await.unwrap();
    c.activate(&scope).await.unwrap();
    net.broken.store(true, Ordering::SeqCst);

    let err = c.handle_fetch(&document("/reports/")).await.unwrap_err();
    assert!(matches!(err, ShellCacheError::Io(_)));
}

#[tokio::test]
async fn document_http_error_is_returned_not_masked() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    net.serve_response(
        "/dashboard/",
        Response::new(StatusCode::SERVICE_UNAVAILABLE, "maintenance"),
    );
    let c = active_controller(&storage, &net).await;

    let got = c.handle_fetch(&document("/dashboard/")).await.unwrap();
    assert_eq!(
        got.into_response().unwrap().status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

// ============================================================================
// Asset requests: cache-first
// ============================================================================

#[tokio::test]
async fn cached_asset_is_served_without_network() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    let c = active_controller(&storage, &net).await;
    let before = net.calls_for("/static/css/main.css");
    net.serve("/static/css/main.css", "changed on server");

    let got = c.handle_fetch(&asset("/static/css/main.css")).await.unwrap();

    assert_eq!(body(got), "shell /static/css/main.css");
    assert_eq!(net.calls_for("/static/css/main.css"), before);
}

#[tokio::test]
async fn uncached_asset_is_fetched_then_served_from_cache() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    net.serve("/static/img/logo.png", "png bytes");
    let c = active_controller(&storage, &net).await;

    let first = c.handle_fetch(&asset("/static/img/logo.png")).await.unwrap();
    assert_eq!(body(first), "png bytes");
    assert_eq!(net.calls_for("/static/img/logo.png"), 1);

    let second = c.handle_fetch(&asset("/static/img/logo.png")).await.unwrap();
    assert_eq!(body(second), "png bytes");
    assert_eq!(net.calls_for("/static/img/logo.png"), 1);
}

#[tokio::test]
async fn uncached_asset_offline_propagates_failure() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    let c = active_controller(&storage, &net).await;
    net.set_online(false);

    let err = c
        .handle_fetch(&asset("/static/img/missing.png"))
        .await
        .unwrap_err();
    assert!(err.is_network());
}

#[tokio::test]
async fn partial_content_is_returned_but_not_cached() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    net.serve_response(
        "/static/video/tour.mp4",
        Response::new(StatusCode::PARTIAL_CONTENT, "chunk"),
    );
    let c = active_controller(&storage, &net).await;

    let got = c.handle_fetch(&asset("/static/video/tour.mp4")).await.unwrap();
    assert_eq!(
        got.into_response().unwrap().status(),
        StatusCode::PARTIAL_CONTENT
    );

    let store = storage.open(c.cache_name()).await.unwrap();
    assert!(store.get(&key("/static/video/tour.mp4")).await.unwrap().is_none());
}

// ============================================================================
// Passthrough
// ============================================================================

#[tokio::test]
async fn non_get_is_not_intercepted() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    let c = active_controller(&storage, &net).await;
    let post = Request::new(Method::POST, url("/pedidos/nuevo/"))
        .header(ACCEPT, HeaderValue::from_static("text/html"));

    let got = c.handle_fetch(&post).await.unwrap();

    assert!(got.is_passthrough());
    assert_eq!(net.calls_for("/pedidos/nuevo/"), 0);
    let store = storage.open(c.cache_name()).await.unwrap();
    assert_eq!(store.keys().await.unwrap().len(), SHELL.len());
}

#[tokio::test]
async fn cross_origin_is_not_intercepted() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    let c = active_controller(&storage, &net).await;
    let cdn = Request::get("https://cdn.example.com/bootstrap.min.css").unwrap();

    let got = c.handle_fetch(&cdn).await.unwrap();

    assert!(got.is_passthrough());
    let store = storage.open(c.cache_name()).await.unwrap();
    assert_eq!(store.keys().await.unwrap().len(), SHELL.len());
}

#[tokio::test]
async fn redundant_controller_stops_intercepting() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let net = MockNetwork::with_shell();
    let c = active_controller(&storage, &net).await;
    c.mark_redundant();

    let got = c.handle_fetch(&document("/")).await.unwrap();
    assert!(got.is_passthrough());
}
