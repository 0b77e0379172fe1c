//! Transport layer for remote sources.
//!
//! The engine only needs a synchronous request/response operation that
//! tells timeouts apart from other failures. [`Transport`] is that seam;
//! [`HttpTransport`] is the reqwest-backed implementation used by default.

use std::borrow::Cow;
use std::time::Duration;

use crate::error::TransportError;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpTransport;

// ----------------------------------------------------------------------------
// Requests
// ----------------------------------------------------------------------------

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    /// `GET`, parameters in the query string.
    #[default]
    Get,
    /// `POST`, parameters in a form body.
    Post,
}

/// Where and how a page should be requested.
///
/// Produced by page plugins; the owning origin adds the timeout.
///
/// # Examples
///
/// ```
/// use sscn::transport::{Method, RequestTarget};
///
/// let target = RequestTarget::post("https://www.biaozhun.org/plus/search.php")
///     .form("q", "50001-2017");
/// assert_eq!(target.method, Method::Post);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestTarget {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Query string parameters.
    pub query: Vec<(String, String)>,
    /// Form body parameters.
    pub form: Vec<(String, String)>,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
}

impl RequestTarget {
    /// A GET request to `url`.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            ..Self::default()
        }
    }

    /// A POST request to `url`.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            ..Self::default()
        }
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Adds a form body parameter.
    #[must_use]
    pub fn form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((key.into(), value.into()));
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Whether a header named `key` is set (case-insensitive).
    #[must_use]
    pub fn has_header(&self, key: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(key))
    }
}

/// A request ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// What to send.
    pub target: RequestTarget,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Request {
    /// Creates a request.
    #[must_use]
    pub const fn new(target: RequestTarget, timeout: Duration) -> Self {
        Self { target, timeout }
    }

    /// Timeout in whole milliseconds.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

// ----------------------------------------------------------------------------
// Responses
// ----------------------------------------------------------------------------

/// A raw response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Final URL after redirects.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl Response {
    /// Creates a response.
    #[must_use]
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    /// The body decoded as UTF-8, lossily.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// A synchronous request executor.
///
/// One transport is held per registered source for the lifetime of the
/// registry, so connections and cookies are shared by every request of that
/// source.
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the raw response.
    ///
    /// HTTP error statuses are returned as responses, not errors.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] if the request timed out and
    /// [`TransportError::Connection`] for other transport failures.
    fn send(&self, request: &Request) -> Result<Response, TransportError>;
}
