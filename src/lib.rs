//! # opquery - Reactive endpoints over an OpenAPI operation map
//!
//! opquery binds a static operation map (operation id → HTTP method + URL
//! path template, typically generated from an OpenAPI document) to a
//! cache-backed query/mutation runtime and an HTTP transport. Given an
//! operation id, it produces a live "endpoint" handle exposing fetch state,
//! cache key, enablement, and invalidation behavior — while the path
//! parameters feeding it may themselves be reactive.
//!
//! ## Architecture
//!
//! 1. **Registry** ([`registry`]): pure data, supplied externally.
//! 2. **Parameter sources** ([`source`]): static values, `watch` cells, or
//!    accessor closures behind one "read current value" operation.
//! 3. **Path resolution** ([`path`]) and **cache keys** ([`key`]): pure
//!    functions of the current parameter value, re-run on every reactive
//!    tick.
//! 4. **Endpoints** ([`endpoint`]): query handles are subscriptions
//!    following the cache; mutation handles run on demand and orchestrate
//!    cache effects ([`invalidate`]) afterwards.
//! 5. **Cache** ([`client`]) and **transport** ([`transport`]): injected
//!    collaborators; the cache stores body payloads only, the transport
//!    receives an open-ended request configuration.
//!
//! ## Example
//!
//! ```rust,ignore
//! use opquery::prelude::*;
//! use serde_json::json;
//!
//! let registry = OperationRegistry::new()
//!     .with_operation("listPets", Method::Get, "/pets")
//!     .with_operation("getPet", Method::Get, "/pets/{petId}")
//!     .with_operation("createPet", Method::Post, "/pets");
//!
//! let api = Api::new(registry, transport)
//!     .with_defaults(RequestConfig::new().base_url("https://petstore.example.com"));
//!
//! // A query endpoint with a reactive parameter cell.
//! let (pet_id, pet_id_cell) = tokio::sync::watch::channel(None);
//! let pet = api.use_query::<Pet>("getPet", pet_id_cell, EndpointOptions::new())?;
//! assert!(!pet.is_enabled()); // petId still unresolved
//!
//! pet_id.send(Some(params([("petId", "123")])))?;
//! assert!(pet.is_enabled());
//!
//! // A mutation; on success the sibling list operation is invalidated.
//! let create = api.use_mutation::<Pet>("createPet", ParamSource::none(), EndpointOptions::new())?;
//! let envelope = create
//!     .mutate_async(MutateArgs::new().data(json!({"name": "Fluffy"})))
//!     .await?;
//! ```
//!
//! The reactive cell primitive (`tokio::sync::watch`), the HTTP transport
//! (any [`transport::HttpTransport`]), and the cache storage
//! ([`client::QueryClient`]) are collaborators the endpoint layer
//! orchestrates; generating the operation map from an OpenAPI document is
//! out of scope.

pub mod api;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod invalidate;
pub mod key;
pub mod path;
pub mod prelude;
pub mod registry;
pub mod source;
pub mod transport;
