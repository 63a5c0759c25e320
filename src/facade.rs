// Copyright 2026 Modelmesh Contributors.

//! The middleware facade: the single object an application builds against,
//! tying together data models, persistence, synchronization, workflows, and
//! the generated REST/GraphQL surfaces (§4.K).

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::connection_info::ConnectionInfo;
use crate::connector::{Consumer, PersistenceConnector};
use crate::error::{MiddlewareError, MiddlewareResult};
use crate::graphql::build_schema;
use crate::mapper::{Formatter, Mapper};
use crate::model::DataModel;
use crate::registry::PersistenceRegistry;
use crate::rest::{router_for_type, AppState, HttpFetcher, ReqwestFetcher};
use crate::sync::{PersistedConnector, SyncDirection, SyncRole, SyncedConnector};
use crate::workflow::{Workflow, WorkflowRegistry, WorkflowStatus};

/// Either the raw connector an application handed the facade, or the synced
/// wrapper produced by [`Middleware::sync_connector`]. Both expose the same
/// read/write surface to the connector endpoints.
enum ConnectorHandle {
    Plain(Arc<dyn PersistenceConnector>),
    Synced(Arc<SyncedConnector>),
}

impl ConnectorHandle {
    async fn provide(&self) -> MiddlewareResult<Value> {
        match self {
            ConnectorHandle::Plain(c) => c.provide().await,
            ConnectorHandle::Synced(c) => c.provide().await,
        }
    }

    async fn consume(&self, value: Option<Value>) -> MiddlewareResult<()> {
        match self {
            ConnectorHandle::Plain(c) => c.consume(value).await,
            ConnectorHandle::Synced(c) => c.consume(value).await,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ConnectorHandle::Plain(_) => "plain",
            ConnectorHandle::Synced(_) => "synced",
        }
    }
}

struct ConnectorRegistration {
    handle: ConnectorHandle,
    model_type: String,
    connection_info: Option<ConnectionInfo>,
    sync_role: Option<SyncRole>,
    sync_direction: Option<SyncDirection>,
}

#[derive(Serialize)]
struct ConnectorDescription {
    connector_id: String,
    connector_type: &'static str,
    persistence_connection: Option<String>,
    sync_role: Option<String>,
    sync_direction: Option<String>,
    model_type: String,
}

#[derive(Serialize)]
struct MessageBody {
    message: String,
}

/// Ties a set of data models, a persistence registry, a workflow registry,
/// and the connectors synced between them into one application surface.
///
/// Registration methods take `&self`; internal state is interior-mutable so
/// an `Arc<Middleware>` can be shared between the setup code that registers
/// data models/connectors/workflows and the axum handlers that serve them.
pub struct Middleware {
    data_models: RwLock<HashMap<String, Arc<RwLock<DataModel>>>>,
    registry: Arc<PersistenceRegistry>,
    workflows: Arc<WorkflowRegistry>,
    connectors: RwLock<HashMap<String, ConnectorRegistration>>,
    fetcher: Arc<dyn HttpFetcher>,
    router: RwLock<Router>,
}

impl Default for Middleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware {
    /// Creates an empty middleware using the default `reqwest`-backed blob fetcher.
    pub fn new() -> Self {
        Self {
            data_models: RwLock::new(HashMap::new()),
            registry: Arc::new(PersistenceRegistry::new()),
            workflows: Arc::new(WorkflowRegistry::new()),
            connectors: RwLock::new(HashMap::new()),
            fetcher: Arc::new(ReqwestFetcher::default()),
            router: RwLock::new(Router::new()),
        }
    }

    /// Overrides the blob fetcher used by generated `.../file` routes.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn HttpFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// The persistence registry backing this facade's connectors.
    pub fn registry(&self) -> Arc<PersistenceRegistry> {
        self.registry.clone()
    }

    /// The workflow registry backing this facade.
    pub fn workflows(&self) -> Arc<WorkflowRegistry> {
        self.workflows.clone()
    }

    /// Registers `data_model` under `name`. If `persist_instances` is set,
    /// every top-level entity already in the model is pushed into whatever
    /// persistence connection is registered for it (falling back to the
    /// data-model-level connection), so persistence starts in sync with the
    /// in-memory model rather than waiting for the first sync cycle.
    pub async fn load_data_model(
        &self,
        name: impl Into<String>,
        data_model: DataModel,
        persist_instances: bool,
    ) -> MiddlewareResult<Arc<RwLock<DataModel>>> {
        let name = name.into();
        let handle = Arc::new(RwLock::new(data_model));

        if persist_instances {
            let dm = handle.read().await;
            for id in dm.get_top_level_models() {
                let Some(entity) = dm.get_model(&id) else { continue };
                let value = entity.read().expect("entity lock poisoned").clone();
                let ci = ConnectionInfo::for_model(dm.name(), &id);
                if let Ok(connector) = self.registry.get_connection(&ci).await {
                    connector.consume(Some(value)).await?;
                }
            }
        }

        self.data_models.write().await.insert(name, handle.clone());
        Ok(handle)
    }

    /// Looks up a previously loaded data model by name.
    pub async fn data_model(&self, name: &str) -> MiddlewareResult<Arc<RwLock<DataModel>>> {
        self.data_models
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| MiddlewareError::NotFound(name.to_string()))
    }

    /// Registers `connector` under `id`. When `ci` is given, `connector`
    /// itself becomes the persistence backing for that connection (not
    /// merely a peer synced to it) — use [`Middleware::sync_connector`]
    /// instead when `connector` should sync against an existing one.
    pub async fn add_connector(
        &self,
        id: impl Into<String>,
        connector: Arc<dyn PersistenceConnector>,
        model_type: impl Into<String>,
        ci: Option<ConnectionInfo>,
    ) -> MiddlewareResult<()> {
        let id = id.into();
        if ci.is_none() {
            connector.connect().await?;
        }
        if let Some(ci) = &ci {
            self.registry.add_connection(ci.clone(), connector.clone()).await?;
        }
        self.connectors.write().await.insert(
            id,
            ConnectorRegistration {
                handle: ConnectorHandle::Plain(connector),
                model_type: model_type.into(),
                connection_info: ci,
                sync_role: None,
                sync_direction: None,
            },
        );
        Ok(())
    }

    /// Binds `connector` to the persistence connection already registered
    /// for `ci`, under the given sync role/direction, and registers the
    /// connector as a reverse fan-out peer of that connection (§4.G).
    #[allow(clippy::too_many_arguments)]
    pub async fn sync_connector(
        &self,
        id: impl Into<String>,
        connector: Arc<dyn PersistenceConnector>,
        ci: ConnectionInfo,
        role: SyncRole,
        direction: SyncDirection,
        priority: Option<i32>,
        mapper: Option<Arc<dyn Mapper>>,
        formatter: Option<Arc<dyn Formatter>>,
    ) -> MiddlewareResult<Arc<SyncedConnector>> {
        let id = id.into();
        let persisted: Arc<PersistedConnector> = self.registry.get_connection(&ci).await?;
        connector.connect().await?;

        persisted
            .register_peer(Arc::downgrade(&connector), role, direction, mapper.clone(), formatter.clone())
            .await;

        let mut synced = SyncedConnector::new(id.clone(), connector, persisted, role, direction)
            .with_transform(mapper, formatter);
        if let Some(priority) = priority {
            synced = synced.with_priority(priority);
        }
        let synced = Arc::new(synced);

        self.connectors.write().await.insert(
            id,
            ConnectorRegistration {
                handle: ConnectorHandle::Synced(synced.clone()),
                model_type: ci.model_type.clone().unwrap_or_default(),
                connection_info: Some(ci),
                sync_role: Some(role),
                sync_direction: Some(direction),
            },
        );
        Ok(synced)
    }

    /// Registers `workflow`, rejecting a duplicate name. Mirrors the
    /// decorator-style registration of the original implementation: callers
    /// build a [`Workflow`] with [`crate::workflow::WorkflowDescription`]'s
    /// builder methods and hand it to this single entry point.
    pub async fn workflow(&self, workflow: Workflow) -> MiddlewareResult<Arc<Workflow>> {
        self.workflows.register(workflow).await
    }

    /// Mounts CRUD/nested-attribute/blob routes for every type in the named
    /// data model's type graph, under `/{type_name}`.
    pub async fn generate_rest_api_for_data_model(&self, name: &str) -> MiddlewareResult<()> {
        let handle = self.data_model(name).await?;
        let type_names = handle.read().await.type_names();

        let mut router = self.router.write().await;
        let mut built = std::mem::replace(&mut *router, Router::new());
        for type_name in type_names {
            let state = AppState::new(handle.clone(), type_name.clone(), self.registry.clone(), self.fetcher.clone());
            built = built.nest(&format!("/{type_name}"), router_for_type().with_state(state));
        }
        *router = built;
        Ok(())
    }

    /// Builds and mounts a read-only GraphQL schema covering every type in
    /// the named data model's type graph, at `/graphql`.
    pub async fn generate_graphql_api_for_data_model(&self, name: &str) -> MiddlewareResult<()> {
        let handle = self.data_model(name).await?;
        let type_names = handle.read().await.type_names();
        let schema = build_schema(handle, self.registry.clone(), &type_names)
            .map_err(|e| MiddlewareError::MappingError(e.to_string()))?;

        let mut router = self.router.write().await;
        let built = std::mem::replace(&mut *router, Router::new());
        *router = built.route_service("/graphql", async_graphql_axum::GraphQL::new(schema));
        Ok(())
    }

    /// Builds the `/connectors/{id}/...` router described in §6, reading
    /// connector state through `self` at request time.
    pub fn generate_connector_endpoints(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/connectors/:id/description", get(connector_description))
            .route("/connectors/:id/value", get(connector_get_value).post(connector_post_value))
            .with_state(self.clone())
    }

    /// Builds the `/workflows/{name}/...` router described in §6.
    pub fn generate_workflow_endpoints(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/workflows/:name/execute", post(workflow_execute))
            .route("/workflows/:name/execute_background", post(workflow_execute_background))
            .route("/workflows/:name/description", get(workflow_description))
            .route("/workflows/:name/interrupt", get(workflow_interrupt))
            .with_state(self.clone())
    }

    /// Assembles the complete application router: generated data-model REST
    /// and GraphQL routes, plus connector and workflow endpoints, with
    /// tracing and permissive CORS layered over all of it.
    pub async fn into_router(self: &Arc<Self>) -> Router {
        let data_model_routes = self.router.read().await.clone();
        data_model_routes
            .merge(self.generate_connector_endpoints())
            .merge(self.generate_workflow_endpoints())
            .layer(tower_http::cors::CorsLayer::permissive())
            .layer(tower_http::trace::TraceLayer::new_for_http())
    }

    /// Launches every `onStartup`/interval workflow. Call once before serving.
    pub async fn start(&self) -> MiddlewareResult<()> {
        self.workflows.start_all().await
    }

    /// Interrupts every `onShutdown`/interval workflow. Call during graceful shutdown.
    pub async fn shutdown(&self) {
        self.workflows.shutdown_all().await;
    }
}

async fn connector_description(
    State(mw): State<Arc<Middleware>>,
    Path(id): Path<String>,
) -> Result<Json<ConnectorDescription>, MiddlewareError> {
    let connectors = mw.connectors.read().await;
    let reg = connectors.get(&id).ok_or_else(|| MiddlewareError::NotFound(id.clone()))?;
    Ok(Json(ConnectorDescription {
        connector_id: id,
        connector_type: reg.handle.kind(),
        persistence_connection: reg.connection_info.as_ref().map(|ci| format!("{ci:?}")),
        sync_role: reg.sync_role.map(|r| format!("{r:?}")),
        sync_direction: reg.sync_direction.map(|d| format!("{d:?}")),
        model_type: reg.model_type.clone(),
    }))
}

async fn connector_get_value(
    State(mw): State<Arc<Middleware>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, MiddlewareError> {
    let connectors = mw.connectors.read().await;
    let reg = connectors.get(&id).ok_or_else(|| MiddlewareError::NotFound(id.clone()))?;
    Ok(Json(reg.handle.provide().await?))
}

async fn connector_post_value(
    State(mw): State<Arc<Middleware>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, MiddlewareError> {
    let connectors = mw.connectors.read().await;
    let reg = connectors.get(&id).ok_or_else(|| MiddlewareError::NotFound(id.clone()))?;
    let value = if body.is_empty() { None } else { Some(serde_json::from_slice::<Value>(&body)?) };

    if value.is_none() {
        let pulls_from_persistence = matches!(
            reg.sync_direction,
            Some(SyncDirection::FromPersistence) | Some(SyncDirection::Bidirectional)
        );
        if !pulls_from_persistence {
            return Err(MiddlewareError::MappingError(format!(
                "connector '{id}' has no persistence to pull from for a null body"
            )));
        }
    }

    reg.handle.consume(value).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn workflow_execute(
    State(mw): State<Arc<Middleware>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, MiddlewareError> {
    let workflow = mw.workflows.get(&name).await?;
    let args = if body.is_empty() { Value::Null } else { serde_json::from_slice(&body)? };
    Ok(Json(workflow.execute(args).await?))
}

async fn workflow_execute_background(
    State(mw): State<Arc<Middleware>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<MessageBody>, MiddlewareError> {
    let workflow = mw.workflows.get(&name).await?;
    let args = if body.is_empty() { Value::Null } else { serde_json::from_slice(&body)? };
    let message = workflow.execute_background(args).await?;
    Ok(Json(MessageBody { message }))
}

async fn workflow_description(
    State(mw): State<Arc<Middleware>>,
    Path(name): Path<String>,
) -> Result<Json<WorkflowStatus>, MiddlewareError> {
    let workflow = mw.workflows.get(&name).await?;
    Ok(Json(workflow.describe().await))
}

async fn workflow_interrupt(
    State(mw): State<Arc<Middleware>>,
    Path(name): Path<String>,
) -> Result<Json<MessageBody>, MiddlewareError> {
    let workflow = mw.workflows.get(&name).await?;
    workflow.interrupt().await?;
    Ok(Json(MessageBody {
        message: format!("workflow '{name}' interrupted"),
    }))
}
