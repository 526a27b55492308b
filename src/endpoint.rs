//! Reactive endpoint handles.
//!
//! An endpoint is a live handle bound to one registry operation plus a
//! parameter source. Queries are subscriptions: they expose current state
//! and a stream that follows the cache. Mutations are one-shot operations:
//! they run on demand and orchestrate cache effects afterwards. The two
//! shapes are deliberately disjoint — [`Endpoint`] is the sum type the
//! method-dispatching factory returns.
//!
//! # Example
//!
//! ```rust,ignore
//! let api = Api::new(registry, transport);
//!
//! let pet: QueryEndpoint<Pet> =
//!     api.use_query("getPet", params([("petId", "123")]), EndpointOptions::new())?;
//! assert!(pet.is_enabled());
//!
//! let create: MutationEndpoint<Pet> =
//!     api.use_mutation("createPet", ParamSource::none(), EndpointOptions::new())?;
//! let envelope = create
//!     .mutate_async(MutateArgs::new().data(json!({"name": "Fluffy"})))
//!     .await?;
//! ```

pub mod mutation;
pub mod query;

pub use mutation::{MutateArgs, MutationEndpoint, MutationStatus};
pub use query::{QueryEndpoint, QueryStatus};

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::Error;
use crate::invalidate::InvalidationSpec;
use crate::source::Source;
use crate::transport::{RequestConfig, ResponseEnvelope, TransportError};

/// One-shot "data became available" callback; receives the body payload.
pub type OnLoad = Arc<dyn Fn(&Value) + Send + Sync>;

/// Data transform applied to the body payload before it is handed to
/// consumers.
pub type Select = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// A caller-supplied error hook, run before standard error propagation.
/// Wraps either a sync or an async callback.
#[derive(Clone)]
pub struct ErrorHandler(Arc<dyn Fn(TransportError) -> BoxFuture<'static, ()> + Send + Sync>);

impl ErrorHandler {
    /// Wraps a synchronous callback.
    pub fn new(f: impl Fn(TransportError) + Send + Sync + 'static) -> Self {
        Self(Arc::new(move |err| {
            f(err);
            Box::pin(async {})
        }))
    }

    /// Wraps an asynchronous callback.
    pub fn new_async<F, Fut>(f: F) -> Self
    where
        F: Fn(TransportError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Arc::new(move |err| Box::pin(f(err))))
    }

    pub(crate) async fn handle(&self, err: TransportError) {
        (self.0)(err).await;
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorHandler(..)")
    }
}

/// Type-erased refetch capability, used to hand already-constructed query
/// endpoints to a mutation's invalidation step.
pub trait Refetch: Send + Sync {
    /// Fetches now and returns the transport envelope.
    fn refetch(&self) -> BoxFuture<'static, Result<ResponseEnvelope, Error>>;

    /// The operation this handle is bound to.
    fn operation_id(&self) -> &str;
}

/// The options bag recognized by every endpoint constructor. Query
/// endpoints read the query-side keys, mutation endpoints the
/// mutation-side keys; unknown concerns ride along in
/// [`request`](Self::request)'s open `extra` bag.
#[derive(Clone, Default)]
pub struct EndpointOptions {
    /// Explicit enablement override; `false` (or a source currently reading
    /// `false`) keeps the endpoint disabled even with resolved parameters.
    pub enabled: Option<Source<bool>>,
    /// One-shot first-success callback.
    pub on_load: Option<OnLoad>,
    /// Error hook, run before standard propagation.
    pub error_handler: Option<ErrorHandler>,
    /// Body transform applied before data reaches consumers.
    pub select: Option<Select>,
    /// Outbound request configuration (headers, timeout, cancellation,
    /// arbitrary extension keys), merged over API-level defaults.
    pub request: RequestConfig,
    /// Per-endpoint staleness override.
    pub stale_time: Option<Duration>,
    /// Extra fetch attempts on transport failure.
    pub retry: Option<u32>,
    /// Opaque metadata carried on the endpoint.
    pub meta: Option<Value>,
    /// Mutation-side: explicit invalidation targets.
    pub invalidate: Option<InvalidationSpec>,
    /// Mutation-side: skip the invalidation step entirely.
    pub dont_invalidate: bool,
    /// Mutation-side: skip the own-key cache write-through.
    pub dont_update_cache: bool,
    /// Mutation-side: endpoints to refetch directly after success.
    pub refetch: Vec<Arc<dyn Refetch>>,
}

impl EndpointOptions {
    /// An empty options bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the enablement override.
    #[must_use]
    pub fn enabled(mut self, enabled: impl Into<Source<bool>>) -> Self {
        self.enabled = Some(enabled.into());
        self
    }

    /// Registers the one-shot first-success callback.
    #[must_use]
    pub fn on_load(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_load = Some(Arc::new(f));
        self
    }

    /// Registers the error hook.
    #[must_use]
    pub fn error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Registers the body transform.
    #[must_use]
    pub fn select(mut self, f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.select = Some(Arc::new(f));
        self
    }

    /// Sets the outbound request configuration.
    #[must_use]
    pub fn request(mut self, request: RequestConfig) -> Self {
        self.request = request;
        self
    }

    /// Overrides the staleness window for this endpoint.
    #[must_use]
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    /// Sets extra fetch attempts on transport failure.
    #[must_use]
    pub fn retry(mut self, attempts: u32) -> Self {
        self.retry = Some(attempts);
        self
    }

    /// Attaches opaque metadata.
    #[must_use]
    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Sets explicit invalidation targets for mutations.
    #[must_use]
    pub fn invalidate(mut self, spec: InvalidationSpec) -> Self {
        self.invalidate = Some(spec);
        self
    }

    /// Skips post-mutation invalidation.
    #[must_use]
    pub fn dont_invalidate(mut self) -> Self {
        self.dont_invalidate = true;
        self
    }

    /// Skips the post-mutation cache write-through.
    #[must_use]
    pub fn dont_update_cache(mut self) -> Self {
        self.dont_update_cache = true;
        self
    }

    /// Adds an endpoint to refetch directly after mutation success.
    #[must_use]
    pub fn refetch_endpoint(mut self, handle: Arc<dyn Refetch>) -> Self {
        self.refetch.push(handle);
        self
    }
}

impl fmt::Debug for EndpointOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointOptions")
            .field("enabled", &self.enabled)
            .field("stale_time", &self.stale_time)
            .field("retry", &self.retry)
            .field("dont_invalidate", &self.dont_invalidate)
            .field("dont_update_cache", &self.dont_update_cache)
            .field("refetch", &self.refetch.len())
            .finish_non_exhaustive()
    }
}

/// A live endpoint handle, discriminated by operation kind.
pub enum Endpoint<T> {
    /// A subscription-shaped handle for a GET operation.
    Query(QueryEndpoint<T>),
    /// A one-shot handle for a POST/PUT/PATCH/DELETE operation.
    Mutation(MutationEndpoint<T>),
}

impl<T> Endpoint<T> {
    /// Returns `true` for query handles.
    pub const fn is_query(&self) -> bool {
        matches!(self, Endpoint::Query(_))
    }

    /// The query handle, if this is one.
    pub const fn as_query(&self) -> Option<&QueryEndpoint<T>> {
        match self {
            Endpoint::Query(endpoint) => Some(endpoint),
            Endpoint::Mutation(_) => None,
        }
    }

    /// The mutation handle, if this is one.
    pub const fn as_mutation(&self) -> Option<&MutationEndpoint<T>> {
        match self {
            Endpoint::Mutation(endpoint) => Some(endpoint),
            Endpoint::Query(_) => None,
        }
    }

    /// Unwraps into the query handle.
    pub fn into_query(self) -> Option<QueryEndpoint<T>> {
        match self {
            Endpoint::Query(endpoint) => Some(endpoint),
            Endpoint::Mutation(_) => None,
        }
    }

    /// Unwraps into the mutation handle.
    pub fn into_mutation(self) -> Option<MutationEndpoint<T>> {
        match self {
            Endpoint::Mutation(endpoint) => Some(endpoint),
            Endpoint::Query(_) => None,
        }
    }

    /// Whether the underlying endpoint is currently enabled.
    pub fn is_enabled(&self) -> bool {
        match self {
            Endpoint::Query(endpoint) => endpoint.is_enabled(),
            Endpoint::Mutation(endpoint) => endpoint.is_enabled(),
        }
    }
}

impl<T> Clone for Endpoint<T> {
    fn clone(&self) -> Self {
        match self {
            Endpoint::Query(endpoint) => Endpoint::Query(endpoint.clone()),
            Endpoint::Mutation(endpoint) => Endpoint::Mutation(endpoint.clone()),
        }
    }
}

impl<T> fmt::Debug for Endpoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Query(endpoint) => f.debug_tuple("Query").field(endpoint).finish(),
            Endpoint::Mutation(endpoint) => f.debug_tuple("Mutation").field(endpoint).finish(),
        }
    }
}
