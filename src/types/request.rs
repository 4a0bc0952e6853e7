//! Intercepted request context and cache keys

use std::fmt;

use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use url::{Origin, Url};

use crate::{Result, ShellCacheError};

/// An intercepted request: method, absolute URL and headers.
///
/// Only lives for the duration of one fetch; never persisted.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
        }
    }

    /// Build a GET request from an absolute URL string.
    pub fn get(url: &str) -> Result<Self> {
        Ok(Self::new(Method::GET, Url::parse(url)?))
    }

    /// Build a GET request for a document (`Accept: text/html`).
    pub fn document(url: &str) -> Result<Self> {
        Ok(Self::get(url)?.header(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml"),
        ))
    }

    /// Set a header, replacing any previous value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Add a header line, keeping any previous values.
    pub fn append_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set a header from a string value.
    pub fn try_header(self, name: HeaderName, value: &str) -> Result<Self> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| ShellCacheError::InvalidRequest(format!("header {name}: {e}")))?;
        Ok(self.header(name, value))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Scheme, host and port of the target URL.
    pub fn origin(&self) -> Origin {
        self.url.origin()
    }

    /// The declared `Accept` header, every line joined with `", "`.
    ///
    /// Lines that are not valid UTF-8 are skipped.
    pub fn accept(&self) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        (!values.is_empty()).then(|| values.join(", "))
    }

    /// Whether the request asks for an HTML document.
    pub fn accepts_html(&self) -> bool {
        self.accept().is_some_and(|a| a.contains("text/html"))
    }

    /// Cache key for this request.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method.clone(), &self.url)
    }
}

/// Key under which a response is stored: method plus URL without fragment.
///
/// Fragments never reach the server, so `/page#a` and `/page#b` share an
/// entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: Method,
    url: String,
}

impl RequestKey {
    pub fn new(method: Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method,
            url: url.into(),
        }
    }

    /// Key for a GET of `url`.
    pub fn get(url: &Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
