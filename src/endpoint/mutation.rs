//! Mutation endpoints: one-shot handles for POST/PUT/PATCH/DELETE
//! operations.
//!
//! Unlike queries, mutations do not subscribe to anything. They run on
//! demand — [`MutationEndpoint::mutate_async`] for callers that await the
//! transport envelope, [`MutationEndpoint::mutate`] for fire-and-forget —
//! and on success orchestrate the cache: cancel in-flight fetches under the
//! mutated key, write the response body through (so a subscribed consumer
//! sees fresh data without waiting for a refetch), then run the
//! invalidation step.
//!
//! The caller's promise settles to the full transport envelope; the cache
//! only ever receives the body payload.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::client::QueryClient;
use crate::endpoint::{EndpointOptions, Refetch};
use crate::error::Error;
use crate::invalidate::{self, InvalidationSpec};
use crate::key;
use crate::path;
use crate::registry::{OperationInfo, OperationRegistry};
use crate::source::{ParamSource, Params};
use crate::transport::{HttpTransport, RequestConfig, ResponseEnvelope};

/// The state of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationStatus<T> {
    /// Not yet started.
    Idle,
    /// In flight.
    Loading,
    /// Succeeded; carries the response body.
    Success(T),
    /// Failed.
    Error(String),
}

impl<T> MutationStatus<T> {
    /// The response body, if the mutation succeeded.
    pub const fn data(&self) -> Option<&T> {
        match self {
            MutationStatus::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Returns `true` while the mutation is in flight.
    pub const fn is_loading(&self) -> bool {
        matches!(self, MutationStatus::Loading)
    }

    /// Returns `true` if the mutation succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self, MutationStatus::Success(_))
    }

    /// Returns `true` if the mutation failed.
    pub const fn is_error(&self) -> bool {
        matches!(self, MutationStatus::Error(_))
    }
}

/// Per-call arguments for [`MutationEndpoint::mutate_async`].
///
/// Everything is optional; call-time values win over endpoint-level options
/// key by key.
#[derive(Debug, Clone, Default)]
pub struct MutateArgs {
    /// The request body.
    pub data: Option<Value>,
    /// Path-parameter overrides, merged over the endpoint's source.
    pub params: Option<Params>,
    /// Call-time request configuration, merged over endpoint options.
    pub request: RequestConfig,
    /// Call-time invalidation targets, replacing endpoint-level ones.
    pub invalidate: Option<InvalidationSpec>,
    /// Call-time override for skipping invalidation.
    pub dont_invalidate: Option<bool>,
    /// Call-time override for skipping the cache write-through.
    pub dont_update_cache: Option<bool>,
}

impl MutateArgs {
    /// Empty arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request body.
    #[must_use]
    pub fn data(mut self, body: Value) -> Self {
        self.data = Some(body);
        self
    }

    /// Sets call-time path-parameter overrides.
    #[must_use]
    pub fn params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    /// Sets call-time request configuration.
    #[must_use]
    pub fn request(mut self, request: RequestConfig) -> Self {
        self.request = request;
        self
    }

    /// Sets call-time invalidation targets.
    #[must_use]
    pub fn invalidate(mut self, spec: InvalidationSpec) -> Self {
        self.invalidate = Some(spec);
        self
    }

    /// Skips invalidation for this call.
    #[must_use]
    pub fn dont_invalidate(mut self) -> Self {
        self.dont_invalidate = Some(true);
        self
    }

    /// Skips the cache write-through for this call.
    #[must_use]
    pub fn dont_update_cache(mut self) -> Self {
        self.dont_update_cache = Some(true);
        self
    }
}

/// A handle for one mutating operation bound to a parameter source.
pub struct MutationEndpoint<T> {
    id: Arc<str>,
    info: OperationInfo,
    params: ParamSource,
    extra_params: ParamSource,
    options: EndpointOptions,
    registry: Arc<OperationRegistry>,
    client: Arc<QueryClient>,
    transport: Arc<dyn HttpTransport>,
    defaults: RequestConfig,
    status: Arc<Mutex<MutationStatus<Value>>>,
    _result: PhantomData<fn() -> T>,
}

impl<T> MutationEndpoint<T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: &str,
        info: OperationInfo,
        params: ParamSource,
        options: EndpointOptions,
        registry: Arc<OperationRegistry>,
        client: Arc<QueryClient>,
        transport: Arc<dyn HttpTransport>,
        defaults: RequestConfig,
    ) -> Self {
        Self {
            id: Arc::from(id),
            info,
            params,
            extra_params: ParamSource::none(),
            options,
            registry,
            client,
            transport,
            defaults,
            status: Arc::new(Mutex::new(MutationStatus::Idle)),
            _result: PhantomData,
        }
    }

    /// The operation id this endpoint is bound to.
    pub fn operation_id(&self) -> &str {
        &self.id
    }

    /// The registry info for the bound operation.
    pub const fn info(&self) -> &OperationInfo {
        &self.info
    }

    /// The endpoint-level parameter source's current value.
    pub fn path_params(&self) -> Option<Params> {
        self.params.get()
    }

    /// The extra parameter source's current value.
    pub fn extra_path_params(&self) -> Option<Params> {
        self.extra_params.get()
    }

    /// Attaches a second parameter source layered over the endpoint source
    /// (its values win key by key). Useful when part of the path is known
    /// only after construction.
    #[must_use]
    pub fn with_extra_params(mut self, extra: impl Into<ParamSource>) -> Self {
        self.extra_params = extra.into();
        self
    }

    /// Whether every path placeholder resolves from the endpoint-level
    /// sources and no `enabled` override reads false.
    pub fn is_enabled(&self) -> bool {
        let overridden_on = self
            .options
            .enabled
            .as_ref()
            .map_or(true, |source| source.get());
        let merged = self.merged_params(None);
        overridden_on && path::resolve(&self.info.path, merged.as_ref()).is_fully_resolved
    }

    /// The current mutation state, with the body decoded.
    pub fn status(&self) -> MutationStatus<T>
    where
        T: DeserializeOwned,
    {
        let status = self
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match status {
            MutationStatus::Idle => MutationStatus::Idle,
            MutationStatus::Loading => MutationStatus::Loading,
            MutationStatus::Error(message) => MutationStatus::Error(message),
            MutationStatus::Success(body) => match serde_json::from_value(body) {
                Ok(data) => MutationStatus::Success(data),
                Err(err) => MutationStatus::Error(err.to_string()),
            },
        }
    }

    /// The decoded response body of the last successful call.
    pub fn data(&self) -> Option<T>
    where
        T: DeserializeOwned,
    {
        match self.status() {
            MutationStatus::Success(data) => Some(data),
            _ => None,
        }
    }

    /// The message of the last failed call.
    pub fn error(&self) -> Option<String> {
        match &*self.status.lock().unwrap_or_else(PoisonError::into_inner) {
            MutationStatus::Error(message) => Some(message.clone()),
            _ => None,
        }
    }

    /// Endpoint params layered under extra params layered under call-time
    /// overrides; later layers win key by key.
    fn merged_params(&self, call_time: Option<&Params>) -> Option<Params> {
        let mut merged = Params::new();
        let mut any = false;
        for layer in [
            self.params.get().as_ref(),
            self.extra_params.get().as_ref(),
            call_time,
        ]
        .into_iter()
        .flatten()
        {
            any = true;
            for (name, value) in layer {
                merged.insert(name.clone(), value.clone());
            }
        }
        any.then_some(merged)
    }

    /// Runs the mutation and resolves to the full transport envelope.
    ///
    /// Calling with unresolved required path parameters (after call-time
    /// overrides) is a configuration error; no request is issued. On
    /// success, cache write-through and invalidation are initiated before
    /// this future resolves.
    pub async fn mutate_async(&self, args: MutateArgs) -> Result<ResponseEnvelope, Error> {
        let merged = self.merged_params(args.params.as_ref());
        let resolved = path::resolve(&self.info.path, merged.as_ref());
        if !resolved.is_fully_resolved {
            return Err(Error::MissingPathParams {
                operation: self.id.to_string(),
                missing: path::unresolved(&self.info.path, merged.as_ref()),
            });
        }

        let mut config = self
            .defaults
            .merge(&self.options.request)
            .merge(&args.request);
        config.method = Some(self.info.method);
        config.url = Some(resolved.url.clone());
        if let Some(body) = &args.data {
            config.body = Some(body.clone());
        }

        self.set_status(MutationStatus::Loading);
        debug!(operation = %self.id, url = %resolved.url, "dispatching mutation");

        let envelope = match self.transport.request(config).await {
            Ok(envelope) => envelope,
            Err(err) => {
                if let Some(handler) = &self.options.error_handler {
                    handler.handle(err.clone()).await;
                }
                self.set_status(MutationStatus::Error(err.to_string()));
                return Err(Error::Transport(err));
            }
        };

        let body = envelope.data.clone();
        let own_key = key::derive_key(&self.info.path, merged.as_ref(), None);
        let dont_update_cache = args
            .dont_update_cache
            .unwrap_or(self.options.dont_update_cache);
        let dont_invalidate = args.dont_invalidate.unwrap_or(self.options.dont_invalidate);

        self.client.cancel_queries(&own_key);
        if !dont_update_cache {
            self.client.set_query_data(own_key.clone(), body.clone());
        }
        if !dont_invalidate {
            let spec = args.invalidate.as_ref().or(self.options.invalidate.as_ref());
            invalidate::run(
                &self.registry,
                &self.client,
                &self.id,
                &self.info.path,
                spec,
                &self.options.refetch,
            );
        }

        self.set_status(MutationStatus::Success(body));
        Ok(envelope)
    }

    fn set_status(&self, status: MutationStatus<Value>) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

impl<T> MutationEndpoint<T>
where
    T: Send + 'static,
{
    /// Fire-and-forget mutation. A no-op while the endpoint is disabled;
    /// failures land in [`MutationEndpoint::error`].
    pub fn mutate(&self, args: MutateArgs) {
        if !self.is_enabled() {
            debug!(operation = %self.id, "mutation disabled, ignoring mutate()");
            return;
        }
        let endpoint = self.clone();
        tokio::spawn(async move {
            let _ = endpoint.mutate_async(args).await;
        });
    }
}

impl<T> Clone for MutationEndpoint<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            info: self.info.clone(),
            params: self.params.clone(),
            extra_params: self.extra_params.clone(),
            options: self.options.clone(),
            registry: self.registry.clone(),
            client: self.client.clone(),
            transport: self.transport.clone(),
            defaults: self.defaults.clone(),
            status: self.status.clone(),
            _result: PhantomData,
        }
    }
}

impl<T> fmt::Debug for MutationEndpoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationEndpoint")
            .field("operation", &self.id)
            .field("path", &self.info.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Method;
    use crate::source::params;
    use crate::transport::mock::MockTransport;
    use serde_json::json;

    fn petstore() -> Arc<OperationRegistry> {
        Arc::new(
            OperationRegistry::new()
                .with_operation("listPets", Method::Get, "/pets")
                .with_operation("getPet", Method::Get, "/pets/{petId}")
                .with_operation("createPet", Method::Post, "/pets")
                .with_operation("updatePet", Method::Put, "/pets/{petId}"),
        )
    }

    fn endpoint_for<T>(
        id: &str,
        transport: MockTransport,
        params: ParamSource,
        options: EndpointOptions,
        client: Arc<QueryClient>,
    ) -> MutationEndpoint<T> {
        let registry = petstore();
        let info = registry.get(id).unwrap().clone();
        MutationEndpoint::new(
            id,
            info,
            params,
            options,
            registry,
            client,
            Arc::new(transport),
            RequestConfig::new(),
        )
    }

    fn key_of(parts: &[&str]) -> crate::key::QueryKey {
        parts.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_mutate_async_returns_envelope_caches_body() {
        let client = Arc::new(QueryClient::new());
        let endpoint: MutationEndpoint<Value> = endpoint_for(
            "createPet",
            MockTransport::ok(json!({"id": "9", "name": "Fluffy"})),
            ParamSource::none(),
            EndpointOptions::new(),
            client.clone(),
        );

        let envelope = endpoint
            .mutate_async(MutateArgs::new().data(json!({"name": "Fluffy"})))
            .await
            .unwrap();

        // Caller sees the transport envelope...
        assert_eq!(envelope.status, 200);
        assert_eq!(envelope.data, json!({"id": "9", "name": "Fluffy"}));
        // ...while the cache holds only the body payload.
        let entry = client.get(&key_of(&["pets"])).unwrap();
        assert_eq!(entry.body, json!({"id": "9", "name": "Fluffy"}));
        assert_eq!(endpoint.data(), Some(json!({"id": "9", "name": "Fluffy"})));
    }

    #[tokio::test]
    async fn test_mutate_async_unresolved_params_is_configuration_error() {
        let endpoint: MutationEndpoint<Value> = endpoint_for(
            "updatePet",
            MockTransport::ok(json!({})),
            ParamSource::none(),
            EndpointOptions::new(),
            Arc::new(QueryClient::new()),
        );

        let err = endpoint.mutate_async(MutateArgs::new()).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(
            err,
            Error::MissingPathParams { missing, .. } if missing == vec!["petId".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_call_time_params_win() {
        let transport = MockTransport::ok(json!({}));
        let endpoint: MutationEndpoint<Value> = endpoint_for(
            "updatePet",
            transport.clone(),
            params([("petId", "123")]).into(),
            EndpointOptions::new(),
            Arc::new(QueryClient::new()),
        );

        endpoint
            .mutate_async(MutateArgs::new().params(params([("petId", "456")])))
            .await
            .unwrap();

        assert_eq!(
            transport.last_call().and_then(|c| c.url),
            Some("/pets/456".to_string())
        );
    }

    #[tokio::test]
    async fn test_default_invalidation_marks_list_stale() {
        let client = Arc::new(QueryClient::new());
        client.set_query_data(key_of(&["pets"]), json!([{"id": "123"}]));

        let endpoint: MutationEndpoint<Value> = endpoint_for(
            "updatePet",
            MockTransport::ok(json!({"id": "123", "name": "Rex"})),
            params([("petId", "123")]).into(),
            EndpointOptions::new(),
            client.clone(),
        );
        endpoint.mutate_async(MutateArgs::new()).await.unwrap();

        assert!(client.get(&key_of(&["pets"])).unwrap().is_stale);
        // The own-key write-through left fresh data for getPet.
        let own = client.get(&key_of(&["pets", "123"])).unwrap();
        assert_eq!(own.body, json!({"id": "123", "name": "Rex"}));
        assert!(!own.is_stale);
    }

    #[tokio::test]
    async fn test_dont_update_cache_skips_write_through() {
        let client = Arc::new(QueryClient::new());
        let endpoint: MutationEndpoint<Value> = endpoint_for(
            "updatePet",
            MockTransport::ok(json!({"id": "123"})),
            params([("petId", "123")]).into(),
            EndpointOptions::new().dont_update_cache(),
            client.clone(),
        );
        endpoint.mutate_async(MutateArgs::new()).await.unwrap();
        assert!(client.get(&key_of(&["pets", "123"])).is_none());
    }

    #[tokio::test]
    async fn test_dont_invalidate_skips_orchestrator() {
        let client = Arc::new(QueryClient::new());
        client.set_query_data(key_of(&["pets"]), json!([]));

        let endpoint: MutationEndpoint<Value> = endpoint_for(
            "updatePet",
            MockTransport::ok(json!({"id": "123"})),
            params([("petId", "123")]).into(),
            EndpointOptions::new(),
            client.clone(),
        );
        endpoint
            .mutate_async(MutateArgs::new().dont_invalidate())
            .await
            .unwrap();

        assert!(!client.get(&key_of(&["pets"])).unwrap().is_stale);
    }

    #[tokio::test]
    async fn test_request_config_merging_headers_per_key() {
        let transport = MockTransport::ok(json!({}));
        let endpoint: MutationEndpoint<Value> = endpoint_for(
            "createPet",
            transport.clone(),
            ParamSource::none(),
            EndpointOptions::new().request(
                RequestConfig::new()
                    .header("authorization", "Bearer setup")
                    .header("x-tenant", "acme"),
            ),
            Arc::new(QueryClient::new()),
        );

        endpoint
            .mutate_async(MutateArgs::new().request(
                RequestConfig::new()
                    .header("authorization", "Bearer call")
                    .extra("onUploadProgress", json!("cb")),
            ))
            .await
            .unwrap();

        let dispatched = transport.last_call().unwrap();
        assert_eq!(dispatched.headers["authorization"], "Bearer call");
        assert_eq!(dispatched.headers["x-tenant"], "acme");
        assert_eq!(dispatched.extra["onUploadProgress"], json!("cb"));
        assert_eq!(dispatched.method, Some(Method::Post));
    }

    #[tokio::test]
    async fn test_transport_error_surfaces_in_status() {
        let endpoint: MutationEndpoint<Value> = endpoint_for(
            "createPet",
            MockTransport::failing("boom"),
            ParamSource::none(),
            EndpointOptions::new(),
            Arc::new(QueryClient::new()),
        );

        let err = endpoint.mutate_async(MutateArgs::new()).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(endpoint.error().unwrap().contains("boom"));
    }

    #[test]
    fn test_is_enabled_with_extra_params() {
        let endpoint: MutationEndpoint<Value> = endpoint_for(
            "updatePet",
            MockTransport::ok(json!({})),
            ParamSource::none(),
            EndpointOptions::new(),
            Arc::new(QueryClient::new()),
        );
        assert!(!endpoint.is_enabled());

        let endpoint = endpoint.with_extra_params(params([("petId", "123")]));
        assert!(endpoint.is_enabled());
    }
}
