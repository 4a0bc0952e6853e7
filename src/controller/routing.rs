//! Request routing policy.
//!
//! Every intercepted request is classified once:
//!
//! | Request                              | Class      | Strategy      |
//! |--------------------------------------|------------|---------------|
//! | method is not GET                    | `Ignored`  | passthrough   |
//! | origin differs from the controller's | `Ignored`  | passthrough   |
//! | `Accept` contains `text/html`        | `Document` | network-first |
//! | anything else                        | `Asset`    | cache-first   |
//!
//! Documents that fail offline walk a [`FallbackChain`]: the exact request
//! first, then each configured offline page.

use reqwest::Method;
use url::{Origin, Url};

use crate::telemetry;
use crate::types::{Request, RequestKey, Response};

/// Why a request was left to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Only GET is cacheable.
    Method,
    /// Cross-origin requests pass through untouched.
    CrossOrigin,
}

/// Routing class of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Document,
    Asset,
    Ignored(IgnoreReason),
}

impl RequestClass {
    /// Strategy for this class, `None` for ignored requests.
    pub fn strategy(&self) -> Option<Strategy> {
        match self {
            RequestClass::Document => Some(Strategy::NetworkFirst),
            RequestClass::Asset => Some(Strategy::CacheFirst),
            RequestClass::Ignored(_) => None,
        }
    }
}

/// Order in which network and cache are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
}

impl Strategy {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Strategy::NetworkFirst => telemetry::NETWORK_FIRST,
            Strategy::CacheFirst => telemetry::CACHE_FIRST,
        }
    }
}

/// Classify `request` for a controller serving `origin`.
pub fn classify(request: &Request, origin: &Origin) -> RequestClass {
    if *request.method() != Method::GET {
        return RequestClass::Ignored(IgnoreReason::Method);
    }
    if request.origin() != *origin {
        return RequestClass::Ignored(IgnoreReason::CrossOrigin);
    }
    if request.accepts_html() {
        RequestClass::Document
    } else {
        RequestClass::Asset
    }
}

/// Outcome of offering a request to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Interception {
    /// Not intercepted; the host performs the request natively.
    Passthrough,
    /// The controller answered.
    Responded(Response),
}

impl Interception {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Interception::Passthrough)
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Interception::Passthrough => None,
            Interception::Responded(response) => Some(response),
        }
    }
}

/// Ordered cache keys tried when the network is unavailable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackChain {
    keys: Vec<RequestKey>,
}

impl FallbackChain {
    pub fn new(primary: RequestKey) -> Self {
        Self {
            keys: vec![primary],
        }
    }

    /// Append a key; duplicates are skipped.
    pub fn then(mut self, key: RequestKey) -> Self {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
        self
    }

    /// The exact request, then a GET of each offline page.
    pub fn for_document(request: &Request, offline_pages: &[Url]) -> Self {
        offline_pages
            .iter()
            .fold(Self::new(request.key()), |chain, page| {
                chain.then(RequestKey::get(page))
            })
    }

    pub fn keys(&self) -> &[RequestKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
