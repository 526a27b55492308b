//! Prelude module for convenient imports.
//!
//! ```
//! use opquery::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`Api`] - The endpoint factory
//! - [`OperationRegistry`] / [`Method`] - The operation map
//! - [`EndpointOptions`], [`MutateArgs`] - Endpoint configuration
//! - [`QueryEndpoint`], [`MutationEndpoint`], [`Endpoint`] - Live handles
//! - [`ParamSource`], [`Source`], [`params`] - Reactive parameter sources
//! - [`InvalidationSpec`] - Post-mutation invalidation targets
//! - [`RequestConfig`], [`ResponseEnvelope`] - The transport seam

pub use crate::api::Api;
pub use crate::client::{QueryClient, QueryConfig};
pub use crate::endpoint::{
    Endpoint, EndpointOptions, ErrorHandler, MutateArgs, MutationEndpoint, MutationStatus,
    QueryEndpoint, QueryStatus, Refetch,
};
pub use crate::error::Error;
pub use crate::invalidate::InvalidationSpec;
pub use crate::key::QueryKey;
pub use crate::path::ResolvedPath;
pub use crate::registry::{Method, OperationInfo, OperationRegistry};
pub use crate::source::{params, ParamSource, Params, Source};
pub use crate::transport::{HttpTransport, RequestConfig, ResponseEnvelope, TransportError};
