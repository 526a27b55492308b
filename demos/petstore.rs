//! Petstore demo: the full endpoint flow against an in-process transport.
//!
//! Shows:
//! - Query subscription with a reactive parameter cell
//! - Enablement following parameter resolution
//! - Update mutation with write-through and default list invalidation
//! - Create mutation with an explicit invalidation spec
//!
//! Run with: `cargo run --example petstore`

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;

use opquery::prelude::*;
use opquery::transport::mock::MockTransport;
use opquery::transport::Headers;

#[derive(Debug, Clone, Deserialize)]
struct Pet {
    id: String,
    name: String,
}

/// An in-memory pet store the transport answers from.
fn transport() -> MockTransport {
    let pets = Arc::new(Mutex::new(vec![json!({"id": "1", "name": "Rex"})]));
    MockTransport::new(move |config| {
        let mut pets = pets.lock().expect("store poisoned");
        let url = config.url.clone().unwrap_or_default();
        let body = config.body.clone().unwrap_or_default();
        match (config.method, url.as_str()) {
            (Some(Method::Get), "/pets") => Ok(ResponseEnvelope::ok(Value::Array(pets.clone()))),
            (Some(Method::Get), path) => {
                let id = path.trim_start_matches("/pets/");
                pets.iter()
                    .find(|pet| pet["id"] == id)
                    .map(|pet| ResponseEnvelope::ok(pet.clone()))
                    .ok_or(TransportError::Status {
                        status: 404,
                        body: json!({"error": "no such pet"}),
                    })
            }
            (Some(Method::Put), path) => {
                let id = path.trim_start_matches("/pets/");
                let pet = pets
                    .iter_mut()
                    .find(|pet| pet["id"] == id)
                    .ok_or(TransportError::Status {
                        status: 404,
                        body: json!({"error": "no such pet"}),
                    })?;
                pet["name"] = body["name"].clone();
                Ok(ResponseEnvelope::ok(pet.clone()))
            }
            (Some(Method::Post), "/pets") => {
                let created = json!({
                    "id": (pets.len() + 1).to_string(),
                    "name": body["name"].clone(),
                });
                pets.push(created.clone());
                Ok(ResponseEnvelope {
                    data: created,
                    status: 201,
                    headers: Headers::new(),
                })
            }
            _ => Err(TransportError::Status {
                status: 405,
                body: Value::Null,
            }),
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let registry = OperationRegistry::new()
        .with_operation("listPets", Method::Get, "/pets")
        .with_operation("getPet", Method::Get, "/pets/{petId}")
        .with_operation("createPet", Method::Post, "/pets")
        .with_operation("updatePet", Method::Put, "/pets/{petId}");

    let api = Api::new(registry, transport());

    // A query whose parameter arrives later through a cell.
    let (pet_id, pet_id_cell) = watch::channel(None);
    let pet = api.use_query::<Pet>("getPet", pet_id_cell, EndpointOptions::new())?;
    println!("getPet enabled before params resolve: {}", pet.is_enabled());

    let mut pet_stream = pet.stream();
    println!("first status:  {:?}", pet_stream.next().await);

    pet_id.send(Some(params([("petId", "1")])))?;
    println!("after petId=1: {:?}", pet_stream.next().await); // Loading
    println!("then:          {:?}", pet_stream.next().await); // Success(Rex)
    println!("query key:     {}", pet.query_key());

    // Subscribe to the list, then rename the pet. The update writes its body
    // through to getPet's cache entry and invalidates the sibling list.
    let list = api.use_query::<Vec<Pet>>("listPets", ParamSource::none(), EndpointOptions::new())?;
    let mut list_stream = list.stream();
    list_stream.next().await; // Loading
    println!("list:          {:?}", list_stream.next().await);

    let update = api.use_mutation::<Pet>(
        "updatePet",
        params([("petId", "1")]),
        EndpointOptions::new(),
    )?;
    update
        .mutate_async(MutateArgs::new().data(json!({"name": "T-Rex"})))
        .await?;
    println!("pet after write-through: {:?}", pet_stream.next().await);

    list_stream.next().await; // Loading (list invalidated by default)
    println!("list after update:       {:?}", list_stream.next().await);

    // Creation has no trailing {id} segment to derive a default from, so it
    // names its invalidation target explicitly and skips the write-through
    // (a single pet body is not a list).
    let create = api.use_mutation::<Pet>("createPet", ParamSource::none(), EndpointOptions::new())?;
    let envelope = create
        .mutate_async(
            MutateArgs::new()
                .data(json!({"name": "Fluffy"}))
                .dont_update_cache()
                .invalidate(InvalidationSpec::operations(["listPets"])),
        )
        .await?;
    println!("created (status {}): {:?}", envelope.status, envelope.data);

    list_stream.next().await; // Loading (explicit invalidation)
    println!("list after create:       {:?}", list_stream.next().await);

    Ok(())
}
