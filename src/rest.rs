// Copyright 2026 Modelmesh Contributors.

//! Generates an `axum::Router` of CRUD, nested-attribute, and blob-streaming
//! routes from a data model's type graph (§4.I). Reads and writes are routed
//! through the persistence registry per §2/§4.J: each entity and field has a
//! derived [`ConnectionInfo`], and when a connection is registered for it the
//! request is served by (or pushed into) that connector rather than only the
//! in-memory [`DataModel`].

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::connection_info::ConnectionInfo;
use crate::connector::{Consumer, Provider};
use crate::error::{MiddlewareError, MiddlewareResult};
use crate::identifier::{self, EntityKind};
use crate::model::DataModel;
use crate::registry::PersistenceRegistry;

/// Fetches bytes for a `File`'s external `path`. The shipped implementation
/// uses `reqwest`; tests substitute an in-memory fake.
#[async_trait::async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Fetches the body at `url`.
    async fn fetch(&self, url: &str) -> MiddlewareResult<Vec<u8>>;
}

/// Default [`HttpFetcher`] backed by a shared `reqwest::Client`.
#[derive(Clone, Default)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

#[async_trait::async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> MiddlewareResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MiddlewareError::ConnectionError(e.to_string()))?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| MiddlewareError::ConnectionError(e.to_string()))
    }
}

/// Shared state every generated route closes over: the data model, the
/// top-level type it serves, the persistence registry behind it, and a
/// fetcher for `File` blob streaming.
#[derive(Clone)]
pub struct AppState {
    pub(crate) data_model: Arc<RwLock<DataModel>>,
    pub(crate) type_name: String,
    pub(crate) registry: Arc<PersistenceRegistry>,
    pub(crate) fetcher: Arc<dyn HttpFetcher>,
}

impl AppState {
    /// Builds state over `data_model`, serving `type_name`, resolving
    /// persistence through `registry`, fetching blobs with `fetcher`.
    pub fn new(
        data_model: Arc<RwLock<DataModel>>,
        type_name: impl Into<String>,
        registry: Arc<PersistenceRegistry>,
        fetcher: Arc<dyn HttpFetcher>,
    ) -> Self {
        Self {
            data_model,
            type_name: type_name.into(),
            registry,
            fetcher,
        }
    }
}

const BLOB_CONTENT_FIELD: &str = "content";

/// Recursively strips `File`/`Blob` payload fields from a response value to
/// bound payload size; the dedicated blob route serves them instead.
fn strip_blobs(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let is_blob = matches!(map.get("__type").and_then(Value::as_str), Some("File") | Some("Blob"));
            if is_blob {
                let mut stripped = map.clone();
                stripped.remove(BLOB_CONTENT_FIELD);
                stripped.remove("path");
                Value::Object(stripped)
            } else {
                Value::Object(map.iter().map(|(k, v)| (k.clone(), strip_blobs(v))).collect())
            }
        }
        Value::Array(items) => Value::Array(items.iter().map(strip_blobs).collect()),
        other => other.clone(),
    }
}

#[derive(Serialize)]
struct IdempotentMessage {
    message: String,
}

/// Builds the CRUD router for one top-level type, mounted by the facade at
/// `/{type_name}`.
pub fn router_for_type() -> Router<AppState> {
    Router::new()
        .route("/", get(list_entities).post(create_entity))
        .route("/:id", get(get_entity).put(update_entity).delete(delete_entity))
        .route(
            "/:id/:attr",
            get(get_attribute).put(put_attribute).post(post_attribute).delete(delete_attribute),
        )
        .route("/:id/:attr/file", get(stream_attribute_blob))
}

/// Splits an entity's id into the `(model_id, contained_model_id)` pair a
/// [`ConnectionInfo`] is built from: top-level entities address themselves
/// as `model_id`; an entity discovered as nested under some top-level
/// ancestor addresses as that ancestor's `contained_model_id` (§3).
fn resolve_address(data_model: &DataModel, id: &str) -> (String, Option<String>) {
    let top_level = data_model.get_top_level_models();
    if top_level.iter().any(|t| t == id) {
        return (id.to_string(), None);
    }
    let ancestor = data_model
        .get_referencing_models(id)
        .into_iter()
        .find(|referrer| top_level.iter().any(|t| t == referrer));
    match ancestor {
        Some(top) => (top, Some(id.to_string())),
        None => (id.to_string(), None),
    }
}

/// Overlays persistence-registry state onto an in-memory entity value before
/// it's served: the whole entity first (if a connection is registered for
/// its own [`ConnectionInfo`]), then every leaf field and nested identifiable
/// recursively, so a synced field anywhere beneath the entity reflects its
/// connector's current value rather than only what was last written into the
/// data model.
async fn overlay_persistence(
    value: &mut Value,
    data_model_name: &str,
    model_id: &str,
    contained_model_id: Option<&str>,
    registry: &PersistenceRegistry,
) {
    let whole_ci = match contained_model_id {
        Some(cid) => ConnectionInfo::for_contained_model(data_model_name, model_id, cid),
        None => ConnectionInfo::for_model(data_model_name, model_id),
    };
    if let Ok(connector) = registry.get_connection(&whole_ci).await {
        if let Ok(Value::Object(synced)) = connector.provide().await {
            if let Value::Object(map) = value {
                for (k, v) in synced {
                    map.insert(k, v);
                }
            }
        }
    }

    let Value::Object(map) = value else { return };
    let keys: Vec<String> = map.keys().cloned().collect();
    for key in keys {
        let Some(field_value) = map.get(&key).cloned() else { continue };
        match identifier::classify(&field_value) {
            EntityKind::Unidentifiable => {
                let field_ci = whole_ci.clone().with_field(key.clone());
                if let Ok(connector) = registry.get_connection(&field_ci).await {
                    if let Ok(synced_value) = connector.provide().await {
                        map.insert(key, synced_value);
                    }
                }
            }
            EntityKind::Identifiable => {
                let mut child = field_value;
                let child_id = identifier::id_with_patch(&child, None);
                overlay_persistence_boxed(&mut child, data_model_name, model_id, Some(child_id), registry).await;
                map.insert(key, child);
            }
            EntityKind::IdentifiableContainer => {
                let mut updated = field_value;
                match &mut updated {
                    Value::Array(items) => {
                        for item in items.iter_mut() {
                            if matches!(identifier::classify(item), EntityKind::Identifiable) {
                                let child_id = identifier::id_with_patch(item, None);
                                overlay_persistence_boxed(item, data_model_name, model_id, Some(child_id), registry).await;
                            }
                        }
                    }
                    Value::Object(inner) => {
                        for v in inner.values_mut() {
                            if matches!(identifier::classify(v), EntityKind::Identifiable) {
                                let child_id = identifier::id_with_patch(v, None);
                                overlay_persistence_boxed(v, data_model_name, model_id, Some(child_id), registry).await;
                            }
                        }
                    }
                    _ => {}
                }
                map.insert(key, updated);
            }
        }
    }
}

fn overlay_persistence_boxed<'a>(
    value: &'a mut Value,
    data_model_name: &'a str,
    model_id: &'a str,
    contained_model_id: Option<String>,
    registry: &'a PersistenceRegistry,
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        overlay_persistence(value, data_model_name, model_id, contained_model_id.as_deref(), registry).await;
    })
}

/// Pushes a write into the persistence connection registered for `ci`, if
/// any. Best-effort: no connection registered is the common case and not an
/// error, but a connector-level failure is still surfaced to the caller.
async fn push_to_persistence(registry: &PersistenceRegistry, ci: &ConnectionInfo, value: Option<Value>) -> MiddlewareResult<()> {
    match registry.get_connection(ci).await {
        Ok(connector) => connector.consume(value).await,
        Err(_) => Ok(()),
    }
}

async fn list_entities(State(state): State<AppState>) -> Json<Vec<Value>> {
    let data_model = state.data_model.read().await;
    let dm_name = data_model.name().to_string();
    let mut entities = Vec::new();
    for id in data_model.get_models_of_type_name(&state.type_name) {
        if let Some(entity) = data_model.get_model(&id) {
            let (model_id, contained_model_id) = resolve_address(&data_model, &id);
            let mut value = strip_blobs(&entity.read().expect("entity lock poisoned").clone());
            overlay_persistence(&mut value, &dm_name, &model_id, contained_model_id.as_deref(), &state.registry).await;
            entities.push(value);
        }
    }
    Json(entities)
}

async fn create_entity(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), MiddlewareError> {
    let mut data_model = state.data_model.write().await;
    let id = data_model.add_model(state.type_name.clone(), body.clone(), true)?;
    let created = data_model.get_model(&id).expect("just inserted");
    let dm_name = data_model.name().to_string();
    let value = created.read().expect("entity lock poisoned").clone();
    drop(data_model);

    let ci = ConnectionInfo::for_model(dm_name, id);
    push_to_persistence(&state.registry, &ci, Some(value.clone())).await?;

    Ok((StatusCode::OK, Json(value)))
}

async fn get_entity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, MiddlewareError> {
    let data_model = state.data_model.read().await;
    let entity = find_of_type(&data_model, &state.type_name, &id)?;
    let dm_name = data_model.name().to_string();
    let (model_id, contained_model_id) = resolve_address(&data_model, &id);
    let mut value = strip_blobs(&entity.read().expect("entity lock poisoned").clone());
    overlay_persistence(&mut value, &dm_name, &model_id, contained_model_id.as_deref(), &state.registry).await;
    Ok(Json(value))
}

async fn update_entity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(new_value): Json<Value>,
) -> Result<Json<Value>, MiddlewareError> {
    let mut data_model = state.data_model.write().await;
    find_of_type(&data_model, &state.type_name, &id)?;

    let new_id = crate::identifier::id_with_patch(&new_value, None);
    if new_id != id {
        data_model.remove_model(&id, true)?;
        data_model.add_model(state.type_name.clone(), new_value.clone(), true)?;
    } else {
        let entity = data_model.get_model(&id).expect("checked above");
        *entity.write().expect("entity lock poisoned") = new_value.clone();
    }
    let dm_name = data_model.name().to_string();
    let (model_id, contained_model_id) = resolve_address(&data_model, &new_id);
    drop(data_model);

    let ci = match &contained_model_id {
        Some(cid) => ConnectionInfo::for_contained_model(dm_name, model_id, cid.clone()),
        None => ConnectionInfo::for_model(dm_name, model_id),
    };
    push_to_persistence(&state.registry, &ci, Some(new_value.clone())).await?;

    Ok(Json(new_value))
}

async fn delete_entity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, MiddlewareError> {
    let mut data_model = state.data_model.write().await;
    find_of_type(&data_model, &state.type_name, &id)?;
    let dm_name = data_model.name().to_string();
    let (model_id, contained_model_id) = resolve_address(&data_model, &id);
    data_model.remove_model(&id, false)?;
    drop(data_model);

    let ci = match &contained_model_id {
        Some(cid) => ConnectionInfo::for_contained_model(dm_name, model_id, cid.clone()),
        None => ConnectionInfo::for_model(dm_name, model_id),
    };
    push_to_persistence(&state.registry, &ci, None).await?;

    Ok(StatusCode::OK)
}

async fn get_attribute(
    State(state): State<AppState>,
    Path((id, attr)): Path<(String, String)>,
) -> Result<Json<Value>, MiddlewareError> {
    let data_model = state.data_model.read().await;
    let entity = find_of_type(&data_model, &state.type_name, &id)?;
    let dm_name = data_model.name().to_string();
    let (model_id, contained_model_id) = resolve_address(&data_model, &id);
    let mut value = entity.read().expect("entity lock poisoned").clone();
    overlay_persistence(&mut value, &dm_name, &model_id, contained_model_id.as_deref(), &state.registry).await;
    let attr_value = value
        .get(&attr)
        .cloned()
        .ok_or_else(|| MiddlewareError::NotFound(format!("{}/{id}/{attr}", state.type_name)))?;
    Ok(Json(strip_blobs(&attr_value)))
}

async fn put_attribute(
    State(state): State<AppState>,
    Path((id, attr)): Path<(String, String)>,
    Json(new_value): Json<Value>,
) -> Result<Json<Value>, MiddlewareError> {
    let data_model = state.data_model.read().await;
    let entity = find_of_type(&data_model, &state.type_name, &id)?;
    let dm_name = data_model.name().to_string();
    let (model_id, contained_model_id) = resolve_address(&data_model, &id);
    {
        let guard = entity.read().expect("entity lock poisoned");
        if guard.get(&attr) == Some(&new_value) {
            return Ok(Json(serde_json::to_value(IdempotentMessage {
                message: format!("{attr} already set to this value"),
            })
            .expect("message serializes")));
        }
    }
    entity.write().expect("entity lock poisoned")[attr.as_str()] = new_value.clone();
    drop(data_model);

    let ci = field_connection_info(dm_name, model_id, contained_model_id, attr);
    push_to_persistence(&state.registry, &ci, Some(new_value.clone())).await?;

    Ok(Json(new_value))
}

async fn post_attribute(
    State(state): State<AppState>,
    Path((id, attr)): Path<(String, String)>,
    Json(new_value): Json<Value>,
) -> Result<(StatusCode, Json<Value>), MiddlewareError> {
    let data_model = state.data_model.read().await;
    let entity = find_of_type(&data_model, &state.type_name, &id)?;
    let dm_name = data_model.name().to_string();
    let (model_id, contained_model_id) = resolve_address(&data_model, &id);
    entity.write().expect("entity lock poisoned")[attr.as_str()] = new_value.clone();
    drop(data_model);

    let ci = field_connection_info(dm_name, model_id, contained_model_id, attr);
    push_to_persistence(&state.registry, &ci, Some(new_value.clone())).await?;

    Ok((StatusCode::OK, Json(new_value)))
}

async fn delete_attribute(
    State(state): State<AppState>,
    Path((id, attr)): Path<(String, String)>,
) -> Result<StatusCode, MiddlewareError> {
    let data_model = state.data_model.read().await;
    let entity = find_of_type(&data_model, &state.type_name, &id)?;
    let dm_name = data_model.name().to_string();
    let (model_id, contained_model_id) = resolve_address(&data_model, &id);
    {
        let mut guard = entity.write().expect("entity lock poisoned");
        if let Value::Object(map) = &mut *guard {
            map.insert(attr.clone(), Value::Null);
        }
    }
    drop(data_model);

    let ci = field_connection_info(dm_name, model_id, contained_model_id, attr);
    push_to_persistence(&state.registry, &ci, None).await?;

    Ok(StatusCode::OK)
}

fn field_connection_info(
    dm_name: String,
    model_id: String,
    contained_model_id: Option<String>,
    field: String,
) -> ConnectionInfo {
    match contained_model_id {
        Some(cid) => ConnectionInfo::for_contained_model(dm_name, model_id, cid).with_field(field),
        None => ConnectionInfo::for_model(dm_name, model_id).with_field(field),
    }
}

async fn stream_attribute_blob(
    State(state): State<AppState>,
    Path((id, attr)): Path<(String, String)>,
) -> Result<Response, MiddlewareError> {
    let data_model = state.data_model.read().await;
    let entity = find_of_type(&data_model, &state.type_name, &id)?;
    let blob = {
        let guard = entity.read().expect("entity lock poisoned");
        guard
            .get(&attr)
            .cloned()
            .ok_or_else(|| MiddlewareError::NotFound(format!("{}/{id}/{attr}", state.type_name)))?
    };

    let kind = blob.get("__type").and_then(Value::as_str);
    let media_type = blob
        .get("mediaType")
        .and_then(Value::as_str)
        .unwrap_or("application/octet-stream")
        .to_string();

    match kind {
        Some("Blob") => {
            let content = blob
                .get(BLOB_CONTENT_FIELD)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok((
                [(header::CONTENT_TYPE, media_type)],
                Body::from(content.into_bytes()),
            )
                .into_response())
        }
        Some("File") => {
            let path = blob
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| MiddlewareError::NotFound(format!("{}/{id}/{attr}/path", state.type_name)))?;
            let bytes = state.fetcher.fetch(path).await?;
            Ok(([(header::CONTENT_TYPE, media_type)], Body::from(bytes)).into_response())
        }
        _ => Err(MiddlewareError::NotFound(format!("{}/{id}/{attr} is not a file or blob", state.type_name))),
    }
}

fn find_of_type(
    data_model: &DataModel,
    type_name: &str,
    id: &str,
) -> MiddlewareResult<crate::model::SharedEntity> {
    if !data_model.get_models_of_type_name(type_name).iter().any(|x| x == id) {
        return Err(MiddlewareError::NotFound(format!("{type_name}/{id}")));
    }
    data_model
        .get_model(id)
        .ok_or_else(|| MiddlewareError::NotFound(format!("{type_name}/{id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use serde_json::json;
    use tower::util::ServiceExt;

    struct FakeFetcher;
    #[async_trait::async_trait]
    impl HttpFetcher for FakeFetcher {
        async fn fetch(&self, _url: &str) -> MiddlewareResult<Vec<u8>> {
            Ok(b"fake bytes".to_vec())
        }
    }

    fn state_with(entries: Vec<(&str, Value)>) -> AppState {
        let mut dm = DataModel::new("test");
        for (type_name, value) in entries {
            dm.add_model(type_name, value, true).unwrap();
        }
        AppState::new(
            Arc::new(RwLock::new(dm)),
            "Widget",
            Arc::new(PersistenceRegistry::new()),
            Arc::new(FakeFetcher),
        )
    }

    #[tokio::test]
    async fn list_then_get_round_trip() {
        let state = state_with(vec![("Widget", json!({"id": "w1", "count": 3}))]);
        let app = router_for_type().with_state(state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let list: Vec<Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(list.len(), 1);

        let response = app
            .oneshot(Request::builder().uri("/w1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_missing_entity_is_404() {
        let state = state_with(vec![]);
        let app = router_for_type().with_state(state);
        let response = app
            .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_then_delete_round_trip() {
        let state = state_with(vec![]);
        let app = router_for_type().with_state(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&json!({"id": "new"})).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/new")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn blob_route_streams_file_contents() {
        let state = state_with(vec![(
            "Widget",
            json!({"id": "w1", "doc": {"__type": "File", "path": "http://x/doc", "mediaType": "text/plain"}}),
        )]);
        let app = router_for_type().with_state(state);
        let response = app
            .oneshot(Request::builder().uri("/w1/doc/file").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"fake bytes");
    }

    #[tokio::test]
    async fn list_response_strips_blob_content() {
        let state = state_with(vec![(
            "Widget",
            json!({"id": "w1", "doc": {"__type": "Blob", "content": "secret", "mediaType": "text/plain"}}),
        )]);
        let app = router_for_type().with_state(state);
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let list: Vec<Value> = serde_json::from_slice(&body).unwrap();
        assert!(list[0]["doc"].get("content").is_none());
    }

    #[tokio::test]
    async fn get_entity_overlays_a_registered_field_connection() {
        let state = state_with(vec![("Widget", json!({"id": "w1", "reading": 1.0}))]);
        let ci = ConnectionInfo::for_model("test", "w1").with_field("reading");
        let factory: crate::registry::ConnectorFactory = Arc::new(|_: &Value| {
            Ok(Arc::new(crate::connector::MemoryConnector::with_value(json!(9.5)))
                as Arc<dyn crate::connector::PersistenceConnector>)
        });
        state.registry.add_persistence_factory(ci.clone(), None, factory).await;
        state.registry.add_to_persistence(ci, &Value::Null).await.unwrap();

        let app = router_for_type().with_state(state);
        let response = app
            .oneshot(Request::builder().uri("/w1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["reading"], json!(9.5));
    }

    #[tokio::test]
    async fn put_attribute_pushes_into_a_registered_field_connection() {
        let state = state_with(vec![("Widget", json!({"id": "w1", "reading": 1.0}))]);
        let ci = ConnectionInfo::for_model("test", "w1").with_field("reading");
        let factory: crate::registry::ConnectorFactory = Arc::new(|_: &Value| {
            Ok(Arc::new(crate::connector::MemoryConnector::new()) as Arc<dyn crate::connector::PersistenceConnector>)
        });
        state.registry.add_persistence_factory(ci.clone(), None, factory).await;
        state.registry.add_to_persistence(ci.clone(), &Value::Null).await.unwrap();

        let app = router_for_type().with_state(state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/w1/reading")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&json!(2.5)).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let connector = state.registry.get_connection(&ci).await.unwrap();
        assert_eq!(connector.provide().await.unwrap(), json!(2.5));
    }

    #[tokio::test]
    async fn post_then_delete_attribute_round_trip() {
        let state = state_with(vec![("Widget", json!({"id": "w1"}))]);
        let app = router_for_type().with_state(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/w1/note")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&json!("hello")).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/w1/note").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!("hello"));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/w1/note")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/w1/note").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), Value::Null);
    }
}
