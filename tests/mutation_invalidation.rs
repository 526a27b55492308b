// Integration tests for mutations: envelope/body split, write-through,
// default and explicit invalidation fan-out, and the refetch escape hatch.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::time::{sleep, timeout, Duration};

use opquery::prelude::*;
use opquery::transport::mock::MockTransport;

fn petstore(transport: MockTransport) -> Api {
    let registry = OperationRegistry::new()
        .with_operation("listPets", Method::Get, "/pets")
        .with_operation("getPet", Method::Get, "/pets/{petId}")
        .with_operation("getOwners", Method::Get, "/owners")
        .with_operation("createPet", Method::Post, "/pets")
        .with_operation("updatePet", Method::Put, "/pets/{petId}");
    Api::new(registry, transport).with_config(QueryConfig::new(
        Duration::from_secs(60),
        Duration::from_secs(300),
    ))
}

fn key_of(parts: &[&str]) -> QueryKey {
    parts.iter().copied().collect()
}

#[tokio::test]
async fn test_mutate_async_resolves_to_envelope_cache_gets_body() {
    let transport = MockTransport::new(|_| {
        Ok(ResponseEnvelope {
            data: json!({"id": "9", "name": "Fluffy"}),
            status: 201,
            headers: [("location".to_string(), "/pets/9".to_string())].into(),
        })
    });
    let api = petstore(transport);

    let create = api
        .use_mutation::<Value>("createPet", ParamSource::none(), EndpointOptions::new())
        .unwrap();
    let envelope = create
        .mutate_async(MutateArgs::new().data(json!({"name": "Fluffy"})))
        .await
        .unwrap();

    // The caller sees the full transport envelope...
    assert_eq!(envelope.status, 201);
    assert_eq!(envelope.headers["location"], "/pets/9");
    assert_eq!(envelope.data, json!({"id": "9", "name": "Fluffy"}));

    // ...the cache entry holds the body payload and nothing else.
    let entry = api.client().get(&key_of(&["pets"])).unwrap();
    assert_eq!(entry.body, json!({"id": "9", "name": "Fluffy"}));
}

#[tokio::test]
async fn test_default_invalidation_reaches_sibling_list_only() {
    let api = petstore(MockTransport::ok(json!({"id": "123", "name": "Rex"})));
    api.client().set_query_data(key_of(&["pets"]), json!([]));
    api.client().set_query_data(key_of(&["owners"]), json!([]));

    let update = api
        .use_mutation::<Value>(
            "updatePet",
            params([("petId", "123")]),
            EndpointOptions::new(),
        )
        .unwrap();
    update
        .mutate_async(MutateArgs::new().data(json!({"name": "Rex"})))
        .await
        .unwrap();

    assert!(api.client().get(&key_of(&["pets"])).unwrap().is_stale);
    assert!(
        !api.client().get(&key_of(&["owners"])).unwrap().is_stale,
        "unrelated operations must not be invalidated"
    );
}

#[tokio::test]
async fn test_explicit_scoped_invalidation() {
    let api = petstore(MockTransport::ok(json!({"id": "123"})));
    api.client()
        .set_query_data(key_of(&["pets", "123"]), json!({"id": "123"}));
    api.client().set_query_data(key_of(&["owners"]), json!([]));
    api.client().set_query_data(key_of(&["pets"]), json!([]));

    let update = api
        .use_mutation::<Value>(
            "updatePet",
            params([("petId", "123")]),
            EndpointOptions::new(),
        )
        .unwrap();
    update
        .mutate_async(
            MutateArgs::new()
                .dont_update_cache()
                .invalidate(InvalidationSpec::scoped([
                    ("getPet", params([("petId", "123")])),
                    ("listPets", Params::new()),
                ])),
        )
        .await
        .unwrap();

    assert!(api.client().get(&key_of(&["pets", "123"])).unwrap().is_stale);
    assert!(api.client().get(&key_of(&["pets"])).unwrap().is_stale);
    assert!(!api.client().get(&key_of(&["owners"])).unwrap().is_stale);
}

#[tokio::test]
async fn test_refetch_endpoints_escape_hatch() {
    let transport = MockTransport::ok(json!({"id": "123"}));
    let api = petstore(transport.clone());

    // A query endpoint whose parameters live in a closure the orchestrator
    // cannot introspect.
    let query = api
        .use_query::<Value>(
            "getPet",
            ParamSource::thunk(|| Some(params([("petId", "123")]))),
            EndpointOptions::new(),
        )
        .unwrap();

    let update = api
        .use_mutation::<Value>(
            "updatePet",
            params([("petId", "123")]),
            EndpointOptions::new().refetch_endpoint(Arc::new(query.clone())),
        )
        .unwrap();
    update.mutate_async(MutateArgs::new()).await.unwrap();

    // The refetch is fire-and-forget; give the spawned task a moment.
    timeout(Duration::from_secs(1), async {
        while transport.call_count() < 2 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("refetch handle should have been driven");

    let refetched = transport
        .calls()
        .into_iter()
        .filter(|c| c.method == Some(Method::Get))
        .count();
    assert_eq!(refetched, 1);
}

#[tokio::test]
async fn test_failing_refetch_does_not_fail_mutation() {
    // The refetch handle points at an endpoint whose transport always fails.
    let broken = petstore(MockTransport::failing("unreachable"));
    let query = broken
        .use_query::<Value>("listPets", ParamSource::none(), EndpointOptions::new())
        .unwrap();

    let api = petstore(MockTransport::ok(json!({"id": "123"})));
    let update = api
        .use_mutation::<Value>(
            "updatePet",
            params([("petId", "123")]),
            EndpointOptions::new().refetch_endpoint(Arc::new(query)),
        )
        .unwrap();

    let result = update.mutate_async(MutateArgs::new()).await;
    assert!(result.is_ok(), "cache orchestration failures are best-effort");
}

#[tokio::test]
async fn test_mutate_is_noop_while_disabled() {
    let transport = MockTransport::ok(json!({}));
    let api = petstore(transport.clone());

    let update = api
        .use_mutation::<Value>("updatePet", ParamSource::none(), EndpointOptions::new())
        .unwrap();
    assert!(!update.is_enabled());

    update.mutate(MutateArgs::new());
    sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.call_count(), 0, "mutate() must not issue a malformed request");

    // mutate_async instead surfaces the configuration error.
    let err = update.mutate_async(MutateArgs::new()).await.unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_use_endpoint_dispatch_round_trip() {
    let api = petstore(MockTransport::ok(json!({"id": "9"})));

    let endpoint = api
        .use_endpoint::<Value>("createPet", ParamSource::none(), EndpointOptions::new())
        .unwrap();
    let mutation = endpoint.into_mutation().expect("POST maps to a mutation");
    let envelope = mutation
        .mutate_async(MutateArgs::new().data(json!({"name": "Fluffy"})))
        .await
        .unwrap();
    assert_eq!(envelope.data, json!({"id": "9"}));

    let endpoint = api
        .use_endpoint::<Value>("listPets", ParamSource::none(), EndpointOptions::new())
        .unwrap();
    assert!(endpoint.is_query());
}
