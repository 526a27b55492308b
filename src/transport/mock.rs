//! Deterministic in-process transport for tests and demos.
//!
//! [`MockTransport`] answers every request through a caller-supplied
//! responder closure and records each [`RequestConfig`] it sees, enabling
//! assertions about dispatched methods, URLs, headers, and bodies without
//! real I/O.
//!
//! ```
//! use opquery::transport::mock::MockTransport;
//! use serde_json::json;
//!
//! let transport = MockTransport::ok(json!({"id": "123", "name": "Fluffy"}));
//! assert_eq!(transport.call_count(), 0);
//! ```

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use super::{HttpTransport, RequestConfig, ResponseEnvelope, TransportError};

type Responder = dyn Fn(&RequestConfig) -> Result<ResponseEnvelope, TransportError> + Send + Sync;

/// A controllable transport that records its calls.
///
/// Cloning is cheap and clones share the responder and the call log, so a
/// test can keep one handle while the endpoint under test owns another.
#[derive(Clone)]
pub struct MockTransport {
    responder: Arc<Responder>,
    calls: Arc<Mutex<Vec<RequestConfig>>>,
}

impl MockTransport {
    /// Creates a transport answering through `responder`.
    pub fn new(
        responder: impl Fn(&RequestConfig) -> Result<ResponseEnvelope, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A transport that always answers 200 with `body`.
    pub fn ok(body: serde_json::Value) -> Self {
        Self::new(move |_| Ok(ResponseEnvelope::ok(body.clone())))
    }

    /// A transport that always fails with a request error.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(move |_| Err(TransportError::Request(message.clone())))
    }

    /// All recorded requests, in dispatch order.
    pub fn calls(&self) -> Vec<RequestConfig> {
        self.calls.lock().expect("mock call log poisoned").clone()
    }

    /// The number of requests dispatched so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("mock call log poisoned").len()
    }

    /// The most recent request, if any.
    pub fn last_call(&self) -> Option<RequestConfig> {
        self.calls
            .lock()
            .expect("mock call log poisoned")
            .last()
            .cloned()
    }
}

impl HttpTransport for MockTransport {
    fn request(
        &self,
        config: RequestConfig,
    ) -> BoxFuture<'static, Result<ResponseEnvelope, TransportError>> {
        let result = (self.responder)(&config);
        self.calls
            .lock()
            .expect("mock call log poisoned")
            .push(config);
        Box::pin(async move { result })
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("call_count", &self.call_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_records_calls() {
        let transport = MockTransport::ok(json!({"ok": true}));

        let config = RequestConfig {
            method: Some(Method::Get),
            url: Some("/pets".to_string()),
            ..RequestConfig::new()
        };
        let envelope = transport.request(config).await.unwrap();

        assert_eq!(envelope.status, 200);
        assert_eq!(envelope.data, json!({"ok": true}));
        assert_eq!(transport.call_count(), 1);
        assert_eq!(
            transport.last_call().and_then(|c| c.url),
            Some("/pets".to_string())
        );
    }

    #[tokio::test]
    async fn test_failing() {
        let transport = MockTransport::failing("connection refused");
        let err = transport.request(RequestConfig::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::Request(msg) if msg.contains("refused")));
    }
}
