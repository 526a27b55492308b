//! Real HTTP transport backed by [`reqwest`].
//!
//! Enabled with the `reqwest` cargo feature. Recognized configuration keys
//! (method, url, headers, body, timeout, cancellation) map onto the reqwest
//! request builder; the `extra` bag has no transport-level meaning here and
//! is carried through untouched for adapters layered on top.

use futures::future::BoxFuture;
use serde_json::Value;

use crate::registry::Method;

use super::{Headers, HttpTransport, RequestConfig, ResponseEnvelope, TransportError};

/// An [`HttpTransport`] implementation over a shared [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport over an existing client (connection pools,
    /// proxies, and TLS settings configured by the caller).
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

impl HttpTransport for ReqwestTransport {
    fn request(
        &self,
        config: RequestConfig,
    ) -> BoxFuture<'static, Result<ResponseEnvelope, TransportError>> {
        let client = self.client.clone();
        Box::pin(async move {
            let method = config.method.unwrap_or(Method::Get);
            let url = config.full_url();

            let mut builder = client.request(to_reqwest_method(method), &url);
            for (name, value) in &config.headers {
                builder = builder.header(name, value);
            }
            if let Some(timeout) = config.timeout {
                builder = builder.timeout(timeout);
            }
            if let Some(body) = &config.body {
                builder = builder.json(body);
            }

            let send = async move {
                let response = builder
                    .send()
                    .await
                    .map_err(|err| TransportError::Request(err.to_string()))?;

                let status = response.status().as_u16();
                let mut headers = Headers::new();
                for (name, value) in response.headers() {
                    if let Ok(value) = value.to_str() {
                        headers.insert(name.as_str().to_string(), value.to_string());
                    }
                }

                let text = response
                    .text()
                    .await
                    .map_err(|err| TransportError::Request(err.to_string()))?;
                let data = if text.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(&text).unwrap_or(Value::String(text))
                };

                if status >= 400 {
                    return Err(TransportError::Status { status, body: data });
                }
                Ok(ResponseEnvelope {
                    data,
                    status,
                    headers,
                })
            };

            match config.cancel {
                Some(token) => tokio::select! {
                    () = token.cancelled() => Err(TransportError::Cancelled),
                    result = send => result,
                },
                None => send.await,
            }
        })
    }
}
