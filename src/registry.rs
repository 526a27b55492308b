//! The operation registry: a static map from operation id to HTTP method and
//! URL path template.
//!
//! The registry is pure data. It is typically generated from an OpenAPI
//! document by external tooling and loaded here with [`OperationRegistry::from_json`],
//! but it can just as well be assembled in code:
//!
//! ```
//! use opquery::registry::{Method, OperationRegistry};
//!
//! let registry = OperationRegistry::new()
//!     .with_operation("listPets", Method::Get, "/pets")
//!     .with_operation("getPet", Method::Get, "/pets/{petId}")
//!     .with_operation("createPet", Method::Post, "/pets");
//!
//! assert!(registry.get("getPet").is_some());
//! ```
//!
//! The registry is read-only once constructed and is shared between all
//! endpoints created from one [`Api`](crate::api::Api).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The HTTP methods an operation may use.
///
/// GET operations become query endpoints; everything else becomes a mutation
/// endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// HTTP GET.
    Get,
    /// HTTP POST.
    Post,
    /// HTTP PUT.
    Put,
    /// HTTP PATCH.
    Patch,
    /// HTTP DELETE.
    Delete,
}

impl Method {
    /// Returns `true` for methods that read data (GET).
    pub const fn is_query(self) -> bool {
        matches!(self, Method::Get)
    }

    /// The canonical upper-case method name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operation: an HTTP method plus a URL path template with `{name}`
/// placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInfo {
    /// The HTTP method.
    pub method: Method,
    /// The URL path template, e.g. `/pets/{petId}`.
    pub path: String,
}

impl OperationInfo {
    /// Creates operation info from a method and path template.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }
}

/// A static, immutable map from operation id to [`OperationInfo`], with
/// optional enum metadata (name → allowed string values) carried alongside.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationRegistry {
    operations: BTreeMap<String, OperationInfo>,
    enums: BTreeMap<String, Vec<String>>,
}

impl OperationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an operation, builder style.
    #[must_use]
    pub fn with_operation(
        mut self,
        id: impl Into<String>,
        method: Method,
        path: impl Into<String>,
    ) -> Self {
        self.operations
            .insert(id.into(), OperationInfo::new(method, path));
        self
    }

    /// Attaches enum metadata (name → allowed values), builder style.
    #[must_use]
    pub fn with_enums(mut self, enums: BTreeMap<String, Vec<String>>) -> Self {
        self.enums = enums;
        self
    }

    /// Loads a registry from a JSON operation map of the shape
    /// `{"listPets": {"method": "get", "path": "/pets"}, ...}`.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let operations: BTreeMap<String, OperationInfo> = serde_json::from_value(value)?;
        Ok(Self {
            operations,
            enums: BTreeMap::new(),
        })
    }

    /// Looks up an operation by id.
    pub fn get(&self, id: &str) -> Option<&OperationInfo> {
        self.operations.get(id)
    }

    /// Looks up an operation by id, failing with a configuration error for
    /// unknown ids.
    pub fn lookup(&self, id: &str) -> Result<&OperationInfo, Error> {
        self.operations
            .get(id)
            .ok_or_else(|| Error::UnknownOperation(id.to_string()))
    }

    /// Returns whether the operation maps to a query endpoint (GET) without
    /// constructing one.
    pub fn is_query_operation(&self, id: &str) -> Result<bool, Error> {
        Ok(self.lookup(id)?.method.is_query())
    }

    /// The allowed values for a named enum, if metadata was attached.
    pub fn enum_values(&self, name: &str) -> Option<&[String]> {
        self.enums.get(name).map(Vec::as_slice)
    }

    /// Iterates over all `(id, info)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OperationInfo)> {
        self.operations.iter().map(|(id, info)| (id.as_str(), info))
    }

    /// The number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if no operations are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn petstore() -> OperationRegistry {
        OperationRegistry::new()
            .with_operation("listPets", Method::Get, "/pets")
            .with_operation("getPet", Method::Get, "/pets/{petId}")
            .with_operation("createPet", Method::Post, "/pets")
            .with_operation("updatePet", Method::Put, "/pets/{petId}")
    }

    #[test]
    fn test_method_classification() {
        assert!(Method::Get.is_query());
        assert!(!Method::Post.is_query());
        assert!(!Method::Delete.is_query());
    }

    #[test]
    fn test_lookup_unknown_operation() {
        let registry = petstore();
        let err = registry.lookup("getOwners").unwrap_err();
        assert!(matches!(err, Error::UnknownOperation(id) if id == "getOwners"));
    }

    #[test]
    fn test_is_query_operation() {
        let registry = petstore();
        assert!(registry.is_query_operation("listPets").unwrap());
        assert!(!registry.is_query_operation("createPet").unwrap());
        assert!(registry.is_query_operation("nope").is_err());
    }

    #[test]
    fn test_from_json() {
        let registry = OperationRegistry::from_json(json!({
            "listPets": { "method": "get", "path": "/pets" },
            "updatePet": { "method": "put", "path": "/pets/{petId}" },
        }))
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get("updatePet"),
            Some(&OperationInfo::new(Method::Put, "/pets/{petId}"))
        );
    }

    #[test]
    fn test_enum_metadata() {
        let mut enums = BTreeMap::new();
        enums.insert(
            "PetStatus".to_string(),
            vec!["available".to_string(), "sold".to_string()],
        );
        let registry = petstore().with_enums(enums);

        assert_eq!(
            registry.enum_values("PetStatus"),
            Some(&["available".to_string(), "sold".to_string()][..])
        );
        assert_eq!(registry.enum_values("Unknown"), None);
    }
}
