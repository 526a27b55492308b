//! Post-mutation invalidation orchestration.
//!
//! After a mutation succeeds, related cached queries must be told their data
//! is out of date. The orchestrator computes the default target — the "list"
//! operation whose template equals the mutated template minus its trailing
//! `{id}` segment — applies any explicit [`InvalidationSpec`], and triggers
//! direct refetches of caller-supplied endpoint handles.
//!
//! Everything here is best-effort: an unknown operation id in a spec or a
//! failed refetch is logged and skipped, never allowed to fail the
//! mutation's own future.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::QueryClient;
use crate::endpoint::Refetch;
use crate::key;
use crate::registry::{OperationInfo, OperationRegistry};
use crate::source::Params;

/// Which operations to invalidate after a mutation, supplied per endpoint or
/// per call.
#[derive(Debug, Clone)]
pub enum InvalidationSpec {
    /// Invalidate every cached variant of each named operation.
    Operations(Vec<String>),
    /// Invalidate only the cache subtree derived from each operation's
    /// partial parameters. An empty parameter map behaves like the
    /// unconstrained form.
    Scoped(BTreeMap<String, Params>),
}

impl InvalidationSpec {
    /// Builds the unconstrained form from operation ids.
    pub fn operations<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        InvalidationSpec::Operations(ids.into_iter().map(Into::into).collect())
    }

    /// Builds the parameter-scoped form from `(operation id, partial params)`
    /// pairs.
    pub fn scoped<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Params)>,
        S: Into<String>,
    {
        InvalidationSpec::Scoped(entries.into_iter().map(|(id, p)| (id.into(), p)).collect())
    }
}

/// The template of the sibling "list" operation: the mutated template with
/// its trailing `{id}` segment removed. `None` when the template does not
/// end in a placeholder segment.
pub fn parent_template(template: &str) -> Option<String> {
    let trimmed = template.trim_end_matches('/');
    let (parent, last) = trimmed.rsplit_once('/')?;
    if last.starts_with('{') && last.ends_with('}') && !parent.is_empty() {
        Some(parent.to_string())
    } else {
        None
    }
}

/// The registry operation to invalidate by default for a mutated template:
/// the query operation whose template is the mutated template's parent.
fn default_target<'r>(
    registry: &'r OperationRegistry,
    template: &str,
) -> Option<(&'r str, &'r OperationInfo)> {
    let parent = parent_template(template)?;
    registry
        .iter()
        .find(|(_, info)| info.method.is_query() && info.path == parent)
        .or_else(|| registry.iter().find(|(_, info)| info.path == parent))
}

/// Runs the post-mutation invalidation step. Cache writes have already
/// happened by the time this is called; explicit refetches are spawned and
/// not awaited.
pub(crate) fn run(
    registry: &OperationRegistry,
    client: &QueryClient,
    mutated_id: &str,
    mutated_template: &str,
    spec: Option<&InvalidationSpec>,
    refetch: &[Arc<dyn Refetch>],
) {
    match spec {
        None => {
            if let Some((target_id, info)) = default_target(registry, mutated_template) {
                debug!(
                    operation = mutated_id,
                    target = target_id,
                    "invalidating sibling list operation"
                );
                client.invalidate_queries(&key::derive_prefix(&info.path, None));
            }
        }
        Some(InvalidationSpec::Operations(ids)) => {
            for id in ids {
                match registry.get(id) {
                    Some(info) => {
                        client.invalidate_queries(&key::derive_prefix(&info.path, None));
                    }
                    None => warn!(operation = %id, "skipping invalidation of unknown operation"),
                }
            }
        }
        Some(InvalidationSpec::Scoped(entries)) => {
            for (id, partial) in entries {
                match registry.get(id) {
                    Some(info) => {
                        client.invalidate_queries(&key::derive_prefix(&info.path, Some(partial)));
                    }
                    None => warn!(operation = %id, "skipping invalidation of unknown operation"),
                }
            }
        }
    }

    for handle in refetch {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(err) = handle.refetch().await {
                warn!(error = %err, "endpoint refetch after mutation failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Method;
    use crate::source::params;
    use serde_json::json;

    fn petstore() -> OperationRegistry {
        OperationRegistry::new()
            .with_operation("listPets", Method::Get, "/pets")
            .with_operation("getPet", Method::Get, "/pets/{petId}")
            .with_operation("updatePet", Method::Put, "/pets/{petId}")
            .with_operation("getOwners", Method::Get, "/owners")
    }

    fn key_of(parts: &[&str]) -> crate::key::QueryKey {
        parts.iter().copied().collect()
    }

    #[test]
    fn test_parent_template() {
        assert_eq!(parent_template("/pets/{petId}"), Some("/pets".to_string()));
        assert_eq!(
            parent_template("/owners/{ownerId}/pets/{petId}"),
            Some("/owners/{ownerId}/pets".to_string())
        );
        assert_eq!(parent_template("/pets"), None);
        assert_eq!(parent_template("/pets/{petId}/photos"), None);
    }

    #[test]
    fn test_default_invalidates_sibling_list_only() {
        let registry = petstore();
        let client = QueryClient::new();
        client.set_query_data(key_of(&["pets"]), json!([]));
        client.set_query_data(key_of(&["owners"]), json!([]));

        run(&registry, &client, "updatePet", "/pets/{petId}", None, &[]);

        assert!(client.get(&key_of(&["pets"])).unwrap().is_stale);
        assert!(!client.get(&key_of(&["owners"])).unwrap().is_stale);
    }

    #[test]
    fn test_default_without_list_operation_is_noop() {
        let registry =
            OperationRegistry::new().with_operation("updateThing", Method::Put, "/things/{id}");
        let client = QueryClient::new();
        client.set_query_data(key_of(&["things"]), json!([]));

        run(&registry, &client, "updateThing", "/things/{id}", None, &[]);

        // No registry operation has template "/things"; nothing is touched.
        assert!(!client.get(&key_of(&["things"])).unwrap().is_stale);
    }

    #[test]
    fn test_explicit_operation_list() {
        let registry = petstore();
        let client = QueryClient::new();
        client.set_query_data(key_of(&["pets"]), json!([]));
        client.set_query_data(key_of(&["owners"]), json!([]));

        let spec = InvalidationSpec::operations(["getOwners"]);
        run(
            &registry,
            &client,
            "updatePet",
            "/pets/{petId}",
            Some(&spec),
            &[],
        );

        assert!(client.get(&key_of(&["owners"])).unwrap().is_stale);
        // The explicit spec replaces the computed default.
        assert!(!client.get(&key_of(&["pets"])).unwrap().is_stale);
    }

    #[test]
    fn test_scoped_spec_narrows_by_params() {
        let registry = petstore();
        let client = QueryClient::new();
        client.set_query_data(key_of(&["pets", "123"]), json!({"id": "123"}));
        client.set_query_data(key_of(&["pets", "456"]), json!({"id": "456"}));
        client.set_query_data(key_of(&["pets"]), json!([]));

        let spec = InvalidationSpec::scoped([("getPet", params([("petId", "123")]))]);
        run(
            &registry,
            &client,
            "updatePet",
            "/pets/{petId}",
            Some(&spec),
            &[],
        );

        assert!(client.get(&key_of(&["pets", "123"])).unwrap().is_stale);
        assert!(!client.get(&key_of(&["pets", "456"])).unwrap().is_stale);
        assert!(!client.get(&key_of(&["pets"])).unwrap().is_stale);
    }

    #[test]
    fn test_unknown_operation_in_spec_is_skipped() {
        let registry = petstore();
        let client = QueryClient::new();
        client.set_query_data(key_of(&["pets"]), json!([]));

        let spec = InvalidationSpec::operations(["nosuch"]);
        run(
            &registry,
            &client,
            "updatePet",
            "/pets/{petId}",
            Some(&spec),
            &[],
        );

        assert!(!client.get(&key_of(&["pets"])).unwrap().is_stale);
    }
}
