// Copyright 2026 Modelmesh Contributors.

//! Hierarchical persistence factory registry (§4.F).

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::connection_info::ConnectionInfo;
use crate::connector::PersistenceConnector;
use crate::error::{MiddlewareError, MiddlewareResult};
use crate::sync::PersistedConnector;

/// Lazily constructs a [`PersistenceConnector`] for a given seed value.
pub type ConnectorFactory =
    Arc<dyn Fn(&Value) -> MiddlewareResult<Arc<dyn PersistenceConnector>> + Send + Sync>;

/// The level at which a factory was registered, used to rank precedence
/// when several factories could apply to the same [`ConnectionInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FactoryPrecedence {
    Default = 0,
    DataModel = 1,
    DataModelAndType = 2,
    Exact = 3,
}

struct FactoryEntry {
    precedence: FactoryPrecedence,
    model_type: Option<String>,
    factory: ConnectorFactory,
}

/// Registry mapping [`ConnectionInfo`] to persistence connectors, each
/// transparently wrapped in a [`PersistedConnector`] on registration.
#[derive(Default)]
pub struct PersistenceRegistry {
    factories: RwLock<HashMap<ConnectionInfo, Vec<FactoryEntry>>>,
    connections: RwLock<HashMap<ConnectionInfo, Arc<PersistedConnector>>>,
    by_model_type: RwLock<HashMap<String, Vec<ConnectionInfo>>>,
}

impl PersistenceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a lazy constructor scoped at `ci`'s level. When `model_type`
    /// is set, the factory only applies to connections whose `model_type`
    /// hint matches, ranking above a plain data-model-level factory.
    pub async fn add_persistence_factory(
        &self,
        ci: ConnectionInfo,
        model_type: Option<String>,
        factory: ConnectorFactory,
    ) {
        let precedence = match (ci.model_id.is_some(), model_type.is_some()) {
            (true, _) => FactoryPrecedence::Exact,
            (false, true) => FactoryPrecedence::DataModelAndType,
            (false, false) => FactoryPrecedence::DataModel,
        };
        let mut factories = self.factories.write().await;
        factories
            .entry(ci)
            .or_default()
            .push(FactoryEntry {
                precedence,
                model_type,
                factory,
            });
    }

    /// Registers a default factory applying to every connection info with
    /// no more specific match.
    pub async fn add_default_factory(&self, factory: ConnectorFactory) {
        let mut factories = self.factories.write().await;
        factories
            .entry(ConnectionInfo::for_data_model(DEFAULT_SCOPE))
            .or_default()
            .push(FactoryEntry {
                precedence: FactoryPrecedence::Default,
                model_type: None,
                factory,
            });
    }

    /// Instantiates a connector for `ci` using the most-specific applicable
    /// factory (*exact → (dataModel, modelType) → dataModel → default*) and
    /// registers it, wrapped in sync fan-out plumbing.
    pub async fn add_to_persistence(&self, ci: ConnectionInfo, seed: &Value) -> MiddlewareResult<()> {
        let factory = self.resolve_factory(&ci).await?;
        let connector = factory(seed)?;
        connector.connect().await?;
        let persisted = Arc::new(PersistedConnector::new(connector));
        self.index_model_type(&ci).await;
        self.connections.write().await.insert(ci, persisted);
        Ok(())
    }

    /// Registers an already-constructed connector as the persistence backing
    /// for `ci`, bypassing the factory mechanism. Used by
    /// [`crate::facade::Middleware::add_connector`] when a connector is
    /// meant to BE persistence for a connection rather than merely sync to it.
    pub async fn add_connection(
        &self,
        ci: ConnectionInfo,
        connector: Arc<dyn PersistenceConnector>,
    ) -> MiddlewareResult<Arc<PersistedConnector>> {
        connector.connect().await?;
        let persisted = Arc::new(PersistedConnector::new(connector));
        self.index_model_type(&ci).await;
        self.connections.write().await.insert(ci, persisted.clone());
        Ok(persisted)
    }

    /// Indexes `ci` under its `model_type` hint, if it has one, for
    /// [`PersistenceRegistry::connections_for_model_type`] lookups (§4.F).
    async fn index_model_type(&self, ci: &ConnectionInfo) {
        if let Some(model_type) = &ci.model_type {
            self.by_model_type.write().await.entry(model_type.clone()).or_default().push(ci.clone());
        }
    }

    /// Every connection currently registered with a `model_type` hint of
    /// `model_type`.
    pub async fn connections_for_model_type(&self, model_type: &str) -> Vec<Arc<PersistedConnector>> {
        let index = self.by_model_type.read().await;
        let Some(cis) = index.get(model_type) else { return Vec::new() };
        let connections = self.connections.read().await;
        cis.iter().filter_map(|ci| connections.get(ci).cloned()).collect()
    }

    async fn resolve_factory(&self, ci: &ConnectionInfo) -> MiddlewareResult<ConnectorFactory> {
        let factories = self.factories.read().await;
        let mut candidates: Vec<&FactoryEntry> = Vec::new();
        for chain_ci in ci.fallback_chain() {
            if let Some(entries) = factories.get(&chain_ci) {
                candidates.extend(entries.iter());
            }
        }
        if let Some(default_entries) = factories.get(&ConnectionInfo::for_data_model(DEFAULT_SCOPE)) {
            candidates.extend(default_entries.iter());
        }

        candidates
            .into_iter()
            .filter(|entry| {
                entry.model_type.is_none()
                    || entry.model_type.as_deref() == ci.model_type.as_deref()
            })
            .max_by_key(|entry| entry.precedence)
            .map(|entry| entry.factory.clone())
            .ok_or_else(|| MiddlewareError::KeyNotFound(format!("{:?}", ci)))
    }

    /// Hierarchical lookup: walks `ci`'s fallback chain from most specific
    /// to least specific, returning the first registered connector.
    pub async fn get_connection(&self, ci: &ConnectionInfo) -> MiddlewareResult<Arc<PersistedConnector>> {
        let connections = self.connections.read().await;
        for candidate in ci.fallback_chain() {
            if let Some(connector) = connections.get(&candidate) {
                return Ok(connector.clone());
            }
        }
        Err(MiddlewareError::KeyNotFound(format!("{:?}", ci)))
    }

    /// Removes a registered connection, along with its derived indices, and
    /// stops it from fanning out to any peers it had synced to (§4.F).
    pub async fn remove_connection(&self, ci: &ConnectionInfo) -> MiddlewareResult<()> {
        let persisted = self
            .connections
            .write()
            .await
            .remove(ci)
            .ok_or_else(|| MiddlewareError::KeyNotFound(format!("{:?}", ci)))?;
        persisted.clear_peers().await;

        let mut index = self.by_model_type.write().await;
        index.retain(|_, cis| {
            cis.retain(|entry| entry != ci);
            !cis.is_empty()
        });
        Ok(())
    }
}

const DEFAULT_SCOPE: &str = "__default__";
