//! The HTTP transport seam.
//!
//! The endpoint layer never talks to the network directly; it builds a
//! [`RequestConfig`] and hands it to an [`HttpTransport`]. The transport
//! returns a [`ResponseEnvelope`] carrying the decoded body alongside status
//! and headers. Mutations hand the whole envelope back to their caller; the
//! cache only ever stores the body.
//!
//! [`RequestConfig`] is deliberately open-ended: besides the recognized
//! transport options it carries an `extra` bag of arbitrary keys that is
//! forwarded to the transport verbatim, never validated against a closed
//! schema. Merging two configurations is per key — headers and extras merge
//! entry-wise with the overlay winning, they are never replaced wholesale.
//!
//! A deterministic in-process transport for tests lives in [`mock`]; a real
//! adapter backed by `reqwest` is available behind the `reqwest` feature.

pub mod mock;
#[cfg(feature = "reqwest")]
pub mod reqwest;

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::registry::Method;

/// Request/response header map.
pub type Headers = BTreeMap<String, String>;

/// Error type for transport operations.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The request could not be completed (connection failure, timeout,
    /// malformed response).
    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with an error status.
    #[error("HTTP status {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The decoded error body, if any.
        body: Value,
    },

    /// The request was cancelled through its cancellation token.
    #[error("request cancelled")]
    Cancelled,
}

/// Outbound request configuration.
///
/// All fields are optional so that partial configurations can be layered:
/// API-level defaults, endpoint-level options, and call-time options merge
/// with [`RequestConfig::merge`], later layers winning per key.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// The HTTP method; filled in from the registry at dispatch time.
    pub method: Option<Method>,
    /// The request path (resolved from the operation's template).
    pub url: Option<String>,
    /// Base URL prepended to `url`.
    pub base_url: Option<String>,
    /// Request headers, merged per key across layers.
    pub headers: Headers,
    /// JSON request body.
    pub body: Option<Value>,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
    /// Cancellation token, forwarded to the transport verbatim.
    pub cancel: Option<CancellationToken>,
    /// Arbitrary caller-defined extension properties. Forwarded verbatim;
    /// unknown keys are never rejected or stripped.
    pub extra: BTreeMap<String, Value>,
}

impl RequestConfig {
    /// An empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL, builder style.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Adds one header, builder style.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the request body, builder style.
    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the timeout, builder style.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attaches a cancellation token, builder style.
    #[must_use]
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Adds one extension property, builder style.
    #[must_use]
    pub fn extra(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    /// Merges `overlay` over `self`, per key. Headers and extras merge
    /// entry-wise with `overlay` winning; scalar fields fall back to `self`
    /// when `overlay` leaves them unset.
    #[must_use]
    pub fn merge(&self, overlay: &RequestConfig) -> RequestConfig {
        let mut headers = self.headers.clone();
        headers.extend(overlay.headers.clone());

        let mut extra = self.extra.clone();
        extra.extend(overlay.extra.clone());

        RequestConfig {
            method: overlay.method.or(self.method),
            url: overlay.url.clone().or_else(|| self.url.clone()),
            base_url: overlay.base_url.clone().or_else(|| self.base_url.clone()),
            headers,
            body: overlay.body.clone().or_else(|| self.body.clone()),
            timeout: overlay.timeout.or(self.timeout),
            cancel: overlay.cancel.clone().or_else(|| self.cancel.clone()),
            extra,
        }
    }

    /// The full request URL: `base_url` joined with `url`.
    #[must_use]
    pub fn full_url(&self) -> String {
        let path = self.url.as_deref().unwrap_or("");
        match self.base_url.as_deref() {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), path),
            None => path.to_string(),
        }
    }
}

/// A successful transport response: decoded body plus transport metadata.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    /// The decoded response body.
    pub data: Value,
    /// The HTTP status code.
    pub status: u16,
    /// The response headers.
    pub headers: Headers,
}

impl ResponseEnvelope {
    /// A 200 envelope with the given body and no headers.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            status: 200,
            headers: Headers::new(),
        }
    }
}

/// The capability the endpoint layer consumes: issue one HTTP request from a
/// configuration and resolve to an envelope.
pub trait HttpTransport: Send + Sync {
    /// Issues the request described by `config`.
    fn request(
        &self,
        config: RequestConfig,
    ) -> BoxFuture<'static, Result<ResponseEnvelope, TransportError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overlay_wins_per_key() {
        let base = RequestConfig::new()
            .base_url("https://api.example.com")
            .header("authorization", "Bearer a")
            .header("accept", "application/json")
            .timeout(Duration::from_secs(30));
        let overlay = RequestConfig::new()
            .header("authorization", "Bearer b")
            .extra("validateStatus", json!("lenient"));

        let merged = base.merge(&overlay);
        assert_eq!(merged.headers["authorization"], "Bearer b");
        assert_eq!(merged.headers["accept"], "application/json");
        assert_eq!(merged.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(merged.timeout, Some(Duration::from_secs(30)));
        assert_eq!(merged.extra["validateStatus"], json!("lenient"));
    }

    #[test]
    fn test_merge_preserves_unknown_extras_from_both_sides() {
        let base = RequestConfig::new().extra("onUploadProgress", json!("cb-1"));
        let overlay = RequestConfig::new().extra("maxRedirects", json!(3));

        let merged = base.merge(&overlay);
        assert_eq!(merged.extra.len(), 2);
        assert_eq!(merged.extra["onUploadProgress"], json!("cb-1"));
        assert_eq!(merged.extra["maxRedirects"], json!(3));
    }

    #[test]
    fn test_full_url() {
        let config = RequestConfig::new().base_url("https://api.example.com/");
        let config = RequestConfig {
            url: Some("/pets/123".to_string()),
            ..config
        };
        assert_eq!(config.full_url(), "https://api.example.com/pets/123");

        let bare = RequestConfig {
            url: Some("/pets".to_string()),
            ..RequestConfig::new()
        };
        assert_eq!(bare.full_url(), "/pets");
    }
}
