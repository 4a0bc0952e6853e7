//! Response snapshots

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, VARY};
use url::Url;

/// A complete HTTP response: status, headers and the full body.
///
/// The body is reference-counted, so `clone()` is cheap. "Store a copy
/// and hand the live response to the page" is a plain clone.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    url: Option<Url>,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            url: None,
        }
    }

    /// A `200 OK` response with the given body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Record the final URL the response was served from.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Status is in the 2xx range.
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    /// Whether a cache store may keep this response.
    ///
    /// Partial content and `Vary: *` responses can never be matched
    /// against a later request, so they are not stored.
    pub fn is_storable(&self) -> bool {
        self.status != StatusCode::PARTIAL_CONTENT && !self.varies_on_everything()
    }

    fn varies_on_everything(&self) -> bool {
        self.headers.get_all(VARY).iter().any(|v| {
            v.to_str()
                .map(|s| s.split(',').any(|field| field.trim() == "*"))
                .unwrap_or(false)
        })
    }
}
