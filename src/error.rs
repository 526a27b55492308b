//! Error types for endpoint construction and execution.

use thiserror::Error;

use crate::registry::Method;
use crate::transport::TransportError;

/// Error type for endpoint operations.
///
/// Configuration problems (unknown operations, structurally missing path
/// parameters) are surfaced as errors at construction or call time, never as
/// panics. Transport failures are wrapped so callers can match on them.
#[derive(Error, Debug)]
pub enum Error {
    /// The operation id is not present in the registry.
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),

    /// A query constructor was given a non-GET operation.
    #[error("operation `{operation}` is a {method} operation, not a query")]
    NotQueryOperation {
        /// The offending operation id.
        operation: String,
        /// The method found in the registry.
        method: Method,
    },

    /// A mutation constructor was given a GET operation.
    #[error("operation `{operation}` is a GET operation, not a mutation")]
    NotMutationOperation {
        /// The offending operation id.
        operation: String,
    },

    /// A request was about to be issued while required path placeholders
    /// were still unresolved.
    #[error("operation `{operation}` is missing path parameters: {missing:?}")]
    MissingPathParams {
        /// The operation id.
        operation: String,
        /// The placeholder names without a defined value.
        missing: Vec<String>,
    },

    /// The response body could not be decoded into the requested type.
    #[error("failed to decode response body for `{operation}`: {source}")]
    Decode {
        /// The operation id.
        operation: String,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The transport reported a failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    /// Returns `true` if this is a configuration error (as opposed to a
    /// transport or decoding failure).
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnknownOperation(_)
                | Error::NotQueryOperation { .. }
                | Error::NotMutationOperation { .. }
                | Error::MissingPathParams { .. }
        )
    }
}
