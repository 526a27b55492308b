//! The endpoint factory: one bound API object per configuration.
//!
//! [`Api`] ties together the operation registry, an HTTP transport, and a
//! [`QueryClient`]. Endpoints created from one `Api` share its cache and
//! defaults; independently configured `Api` instances never interfere,
//! which keeps them testable in isolation.
//!
//! # Example
//!
//! ```rust,ignore
//! use opquery::api::Api;
//! use opquery::registry::{Method, OperationRegistry};
//! use opquery::transport::reqwest::ReqwestTransport;
//!
//! let registry = OperationRegistry::new()
//!     .with_operation("listPets", Method::Get, "/pets")
//!     .with_operation("getPet", Method::Get, "/pets/{petId}")
//!     .with_operation("createPet", Method::Post, "/pets");
//!
//! let api = Api::new(registry, ReqwestTransport::new())
//!     .with_defaults(RequestConfig::new().base_url("https://petstore.example.com"));
//!
//! let pets = api.use_query::<Vec<Pet>>("listPets", ParamSource::none(), Default::default())?;
//! ```

use std::sync::Arc;

use crate::client::{QueryClient, QueryConfig};
use crate::endpoint::{Endpoint, EndpointOptions, MutationEndpoint, QueryEndpoint};
use crate::error::Error;
use crate::registry::{OperationInfo, OperationRegistry};
use crate::source::ParamSource;
use crate::transport::{HttpTransport, RequestConfig};

/// A bound API object: registry + transport + shared cache + defaults.
#[derive(Clone)]
pub struct Api {
    registry: Arc<OperationRegistry>,
    transport: Arc<dyn HttpTransport>,
    client: Arc<QueryClient>,
    defaults: RequestConfig,
}

impl Api {
    /// Binds a registry to a transport, with a fresh default-configured
    /// cache.
    pub fn new(registry: OperationRegistry, transport: impl HttpTransport + 'static) -> Self {
        Self {
            registry: Arc::new(registry),
            transport: Arc::new(transport),
            client: Arc::new(QueryClient::new()),
            defaults: RequestConfig::new(),
        }
    }

    /// Replaces the cache with an externally owned one (e.g. shared between
    /// API objects or pre-seeded by tests).
    #[must_use]
    pub fn with_client(mut self, client: Arc<QueryClient>) -> Self {
        self.client = client;
        self
    }

    /// Replaces the cache with a fresh one using the given configuration.
    #[must_use]
    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.client = Arc::new(QueryClient::with_config(config));
        self
    }

    /// Sets API-level request defaults (base URL, headers, timeouts) merged
    /// under every endpoint's own request configuration.
    #[must_use]
    pub fn with_defaults(mut self, defaults: RequestConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// The shared operation registry.
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// The shared cache.
    pub fn client(&self) -> &Arc<QueryClient> {
        &self.client
    }

    /// Whether `id` maps to a query endpoint (GET), without constructing
    /// one.
    pub fn is_query_operation(&self, id: &str) -> Result<bool, Error> {
        self.registry.is_query_operation(id)
    }

    /// The allowed values for a named enum, if metadata was attached to the
    /// registry.
    pub fn enum_values(&self, name: &str) -> Option<&[String]> {
        self.registry.enum_values(name)
    }

    fn lookup(&self, id: &str) -> Result<OperationInfo, Error> {
        self.registry.lookup(id).cloned()
    }

    /// Builds a query endpoint for a GET operation.
    pub fn use_query<T>(
        &self,
        id: &str,
        params: impl Into<ParamSource>,
        options: EndpointOptions,
    ) -> Result<QueryEndpoint<T>, Error> {
        let info = self.lookup(id)?;
        if !info.method.is_query() {
            return Err(Error::NotQueryOperation {
                operation: id.to_string(),
                method: info.method,
            });
        }
        Ok(QueryEndpoint::new(
            id,
            info,
            params.into(),
            options,
            self.client.clone(),
            self.transport.clone(),
            self.defaults.clone(),
        ))
    }

    /// Builds a mutation endpoint for a POST/PUT/PATCH/DELETE operation.
    pub fn use_mutation<T>(
        &self,
        id: &str,
        params: impl Into<ParamSource>,
        options: EndpointOptions,
    ) -> Result<MutationEndpoint<T>, Error> {
        let info = self.lookup(id)?;
        if info.method.is_query() {
            return Err(Error::NotMutationOperation {
                operation: id.to_string(),
            });
        }
        Ok(MutationEndpoint::new(
            id,
            info,
            params.into(),
            options,
            self.registry.clone(),
            self.client.clone(),
            self.transport.clone(),
            self.defaults.clone(),
        ))
    }

    /// Builds an endpoint for any operation, dispatching on the registry
    /// method: GET becomes [`Endpoint::Query`], everything else
    /// [`Endpoint::Mutation`]. The parameter source and options are
    /// forwarded unchanged.
    pub fn use_endpoint<T>(
        &self,
        id: &str,
        params: impl Into<ParamSource>,
        options: EndpointOptions,
    ) -> Result<Endpoint<T>, Error> {
        let info = self.lookup(id)?;
        if info.method.is_query() {
            self.use_query(id, params, options).map(Endpoint::Query)
        } else {
            self.use_mutation(id, params, options)
                .map(Endpoint::Mutation)
        }
    }
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api")
            .field("operations", &self.registry.len())
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}
