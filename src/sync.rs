// Copyright 2026 Modelmesh Contributors.

//! Synchronization engine: synced connectors bound to persistence, and the
//! reverse fan-out wrapper every persistence connector is given (§4.G).

use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

use crate::connector::{Consumer, Lifecycle, PersistenceConnector, Provider};
use crate::error::MiddlewareResult;
use crate::mapper::{Formatter, Mapper};

/// Where a synced connector sits relative to persistence (§4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRole {
    /// Authoritative source; pushes its reads into persistence.
    GroundTruth,
    /// Never writes persistence.
    ReadOnly,
    /// May read from and write to persistence.
    ReadWrite,
    /// Only writes; never serves persistence reads back out.
    WriteOnly,
}

/// Which way values may cross the persistence boundary (§4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Values flow from the connector into persistence only.
    ToPersistence,
    /// Values flow from persistence into the connector only.
    FromPersistence,
    /// Both directions are permitted.
    Bidirectional,
}

impl SyncDirection {
    fn allows_read_from_persistence(self) -> bool {
        matches!(self, SyncDirection::FromPersistence | SyncDirection::Bidirectional)
    }

    fn allows_write_to_persistence(self) -> bool {
        matches!(self, SyncDirection::ToPersistence | SyncDirection::Bidirectional)
    }
}

/// A connector bound to a persistence backend under an immutable
/// `(role, direction)` configuration, with an optional mapper/formatter
/// pair transforming values as they cross the boundary.
pub struct SyncedConnector {
    id: String,
    connector: Arc<dyn PersistenceConnector>,
    persistence: Arc<PersistedConnector>,
    role: SyncRole,
    direction: SyncDirection,
    priority: i32,
    mapper: Option<Arc<dyn Mapper>>,
    formatter: Option<Arc<dyn Formatter>>,
}

impl SyncedConnector {
    /// Binds `connector` to `persistence` under the given role/direction.
    pub fn new(
        id: impl Into<String>,
        connector: Arc<dyn PersistenceConnector>,
        persistence: Arc<PersistedConnector>,
        role: SyncRole,
        direction: SyncDirection,
    ) -> Self {
        Self {
            id: id.into(),
            connector,
            persistence,
            role,
            direction,
            priority: 0,
            mapper: None,
            formatter: None,
        }
    }

    /// Sets the conflict-resolution priority used when several
    /// `GroundTruth` connectors target the same persistence id.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Attaches the mapper/formatter pair applied to values crossing the
    /// persistence boundary for this connector.
    pub fn with_transform(mut self, mapper: Option<Arc<dyn Mapper>>, formatter: Option<Arc<dyn Formatter>>) -> Self {
        self.mapper = mapper;
        self.formatter = formatter;
        self
    }

    fn transform(&self, value: &Value) -> MiddlewareResult<Value> {
        let mapped = match &self.mapper {
            Some(mapper) => mapper.map(value)?,
            None => value.clone(),
        };
        match &self.formatter {
            Some(fmt) => {
                let bytes = fmt.serialize(&mapped)?;
                fmt.deserialize(&bytes)
            }
            None => Ok(mapped),
        }
    }

    /// Id used to identify this connector among a persisted connector's peers.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Read path (§4.G table): returns the value this connector currently
    /// exposes, propagating into persistence where role/direction allow.
    pub async fn provide(&self) -> MiddlewareResult<Value> {
        match self.role {
            SyncRole::GroundTruth => {
                let value = self.connector.provide().await?;
                if self.direction.allows_write_to_persistence() {
                    let transformed = self.transform(&value)?;
                    self.persistence.consume(Some(transformed)).await?;
                }
                Ok(value)
            }
            SyncRole::ReadOnly => {
                if self.direction.allows_read_from_persistence() {
                    if let Ok(value) = self.persistence.provide().await {
                        return Ok(value);
                    }
                }
                self.connector.provide().await
            }
            SyncRole::ReadWrite | SyncRole::WriteOnly => {
                let value = if self.direction.allows_read_from_persistence() {
                    self.persistence.provide().await
                } else {
                    self.connector.provide().await
                }?;
                if self.direction.allows_write_to_persistence() {
                    let transformed = self.transform(&value)?;
                    self.persistence.consume(Some(transformed)).await?;
                }
                Ok(value)
            }
        }
    }

    /// Write path (§4.G): accepts a new value (or `None` to delete),
    /// coordinating with persistence per role/direction, and always
    /// forwards the final body to the underlying connector last.
    pub async fn consume(&self, body: Option<Value>) -> MiddlewareResult<()> {
        if matches!(self.role, SyncRole::ReadOnly) {
            return self.connector.consume(body).await;
        }

        let resolved = match body {
            None if self.direction.allows_read_from_persistence() => self.persistence.provide().await.ok(),
            other => other,
        };

        if let Some(value) = &resolved {
            if self.direction.allows_write_to_persistence() {
                let transformed = self.transform(value)?;
                self.persistence.consume(Some(transformed)).await?;
            }
        }

        self.connector.consume(resolved).await
    }
}

/// Registered peer used by a [`PersistedConnector`] to fan notifications
/// back out to every other synced connector bound to the same persistence id.
struct Peer {
    role: SyncRole,
    direction: SyncDirection,
    mapper: Option<Arc<dyn Mapper>>,
    formatter: Option<Arc<dyn Formatter>>,
    connector: Weak<dyn PersistenceConnector>,
}

/// Wraps a raw persistence connector so writes fan out to every registered
/// peer [`SyncedConnector`], and reads first pull from any `GroundTruth`
/// peer so persistence observes the latest truth (§4.G).
pub struct PersistedConnector {
    inner: Arc<dyn PersistenceConnector>,
    peers: RwLock<Vec<Peer>>,
    ground_truth_pulls: RwLock<Vec<Weak<dyn PersistenceConnector>>>,
    fanout_cap: Option<usize>,
    fanout_notified: AtomicUsize,
}

impl PersistedConnector {
    /// Wraps `inner` with unbounded fan-out.
    pub fn new(inner: Arc<dyn PersistenceConnector>) -> Self {
        Self {
            inner,
            peers: RwLock::new(Vec::new()),
            ground_truth_pulls: RwLock::new(Vec::new()),
            fanout_cap: None,
            fanout_notified: AtomicUsize::new(0),
        }
    }

    /// Wraps `inner`, notifying at most `cap` peers per write (§9).
    pub fn with_fanout_cap(inner: Arc<dyn PersistenceConnector>, cap: usize) -> Self {
        Self {
            fanout_cap: Some(cap),
            ..Self::new(inner)
        }
    }

    /// Registers a peer synced connector to receive reverse fan-out and,
    /// if it is `GroundTruth`, to be pulled from before reads.
    pub async fn register_peer(
        &self,
        connector: Weak<dyn PersistenceConnector>,
        role: SyncRole,
        direction: SyncDirection,
        mapper: Option<Arc<dyn Mapper>>,
        formatter: Option<Arc<dyn Formatter>>,
    ) {
        if role == SyncRole::GroundTruth {
            self.ground_truth_pulls.write().await.push(connector.clone());
        }
        self.peers.write().await.push(Peer {
            role,
            direction,
            mapper,
            formatter,
            connector,
        });
    }

    /// Drops every registered peer and ground-truth pull, used when this
    /// connection is removed from the [`crate::registry::PersistenceRegistry`]
    /// so stale peers don't keep receiving fan-out for a connection that no
    /// longer exists.
    pub async fn clear_peers(&self) {
        self.peers.write().await.clear();
        self.ground_truth_pulls.write().await.clear();
    }

    async fn pull_ground_truth(&self) {
        let pulls = self.ground_truth_pulls.read().await;
        for weak in pulls.iter() {
            if let Some(connector) = weak.upgrade() {
                if let Ok(value) = connector.provide().await {
                    let _ = self.inner.consume(Some(value)).await;
                }
            }
        }
    }

    async fn fan_out(&self, value: &Value) {
        let peers = self.peers.read().await;
        let mut notified = 0usize;
        for peer in peers.iter() {
            if peer.role == SyncRole::GroundTruth {
                continue;
            }
            if matches!(peer.direction, SyncDirection::ToPersistence) {
                continue;
            }
            if let Some(cap) = self.fanout_cap {
                if notified >= cap {
                    break;
                }
            }
            let Some(connector) = peer.connector.upgrade() else {
                continue;
            };
            let transformed = match &peer.mapper {
                Some(mapper) => mapper.map(value),
                None => Ok(value.clone()),
            };
            let transformed = match transformed.and_then(|v| match &peer.formatter {
                Some(fmt) => fmt.serialize(&v).and_then(|bytes| fmt.deserialize(&bytes)),
                None => Ok(v),
            }) {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(error = %err, "reverse fan-out transform failed");
                    continue;
                }
            };
            if let Err(err) = connector.consume(Some(transformed)).await {
                tracing::warn!(error = %err, "reverse fan-out to peer failed");
            } else {
                notified += 1;
            }
        }
        self.fanout_notified.fetch_add(notified, Ordering::Relaxed);
    }

    /// Total peers successfully notified across this connector's lifetime,
    /// exposed for tests and diagnostics.
    pub fn fanout_notified_count(&self) -> usize {
        self.fanout_notified.load(Ordering::Relaxed)
    }
}

impl Lifecycle for PersistedConnector {}

#[async_trait::async_trait]
impl Provider for PersistedConnector {
    async fn provide(&self) -> MiddlewareResult<Value> {
        self.pull_ground_truth().await;
        self.inner.provide().await
    }
}

#[async_trait::async_trait]
impl Consumer for PersistedConnector {
    async fn consume(&self, value: Option<Value>) -> MiddlewareResult<()> {
        self.inner.consume(value.clone()).await?;
        if let Some(value) = value {
            self.fan_out(&value).await;
        }
        Ok(())
    }
}

/// Governs how many peers a [`PersistedConnector`] notifies per write
/// across an entire data model (§9).
pub struct SyncManager {
    fanout_cap: Option<usize>,
}

impl SyncManager {
    /// Unbounded fan-out, the default.
    pub fn new() -> Self {
        Self { fanout_cap: None }
    }

    /// Bounds fan-out to `cap` peers per persistence id.
    pub fn new_with_fanout_cap(cap: usize) -> Self {
        Self { fanout_cap: Some(cap) }
    }

    /// Wraps a raw connector per this manager's fan-out policy.
    pub fn wrap(&self, inner: Arc<dyn PersistenceConnector>) -> PersistedConnector {
        match self.fanout_cap {
            Some(cap) => PersistedConnector::with_fanout_cap(inner, cap),
            None => PersistedConnector::new(inner),
        }
    }
}

impl Default for SyncManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::MemoryConnector;
    use crate::mapper::IdentityMapper;
    use serde_json::json;

    #[tokio::test]
    async fn ground_truth_push_propagates_read_into_persistence() {
        let store = Arc::new(MemoryConnector::new()) as Arc<dyn PersistenceConnector>;
        let persisted = Arc::new(PersistedConnector::new(store));
        let source = Arc::new(MemoryConnector::with_value(json!({"v": 1}))) as Arc<dyn PersistenceConnector>;

        let synced = SyncedConnector::new(
            "source",
            source,
            persisted.clone(),
            SyncRole::GroundTruth,
            SyncDirection::Bidirectional,
        );
        let value = synced.provide().await.unwrap();
        assert_eq!(value, json!({"v": 1}));
        assert_eq!(persisted.provide().await.unwrap(), json!({"v": 1}));
    }

    #[tokio::test]
    async fn read_only_never_writes_persistence() {
        let store = Arc::new(MemoryConnector::with_value(json!("persisted"))) as Arc<dyn PersistenceConnector>;
        let persisted = Arc::new(PersistedConnector::new(store));
        let sink = Arc::new(MemoryConnector::new()) as Arc<dyn PersistenceConnector>;

        let synced = SyncedConnector::new(
            "ro",
            sink.clone(),
            persisted.clone(),
            SyncRole::ReadOnly,
            SyncDirection::Bidirectional,
        );
        let value = synced.provide().await.unwrap();
        assert_eq!(value, json!("persisted"));
        synced.consume(Some(json!("attempted write"))).await.unwrap();
        assert_eq!(persisted.provide().await.unwrap(), json!("persisted"));
    }

    #[tokio::test]
    async fn consume_none_with_from_persistence_pulls_then_forwards() {
        let store = Arc::new(MemoryConnector::with_value(json!("from persistence"))) as Arc<dyn PersistenceConnector>;
        let persisted = Arc::new(PersistedConnector::new(store));
        let sink = Arc::new(MemoryConnector::new());

        let synced = SyncedConnector::new(
            "rw",
            sink.clone(),
            persisted,
            SyncRole::ReadWrite,
            SyncDirection::FromPersistence,
        );
        synced.consume(None).await.unwrap();
        assert_eq!(sink.provide().await.unwrap(), json!("from persistence"));
    }

    #[tokio::test]
    async fn reverse_fan_out_notifies_non_ground_truth_peers() {
        let store = Arc::new(MemoryConnector::new()) as Arc<dyn PersistenceConnector>;
        let persisted = Arc::new(PersistedConnector::new(store));

        let peer_connector = Arc::new(MemoryConnector::new()) as Arc<dyn PersistenceConnector>;
        persisted
            .register_peer(
                Arc::downgrade(&peer_connector),
                SyncRole::ReadWrite,
                SyncDirection::Bidirectional,
                Some(Arc::new(IdentityMapper)),
                None,
            )
            .await;

        persisted.consume(Some(json!({"v": 2}))).await.unwrap();
        assert_eq!(peer_connector.provide().await.unwrap(), json!({"v": 2}));
        assert_eq!(persisted.fanout_notified_count(), 1);
    }

    #[tokio::test]
    async fn reverse_fan_out_skips_ground_truth_and_to_persistence_only_peers() {
        let store = Arc::new(MemoryConnector::new()) as Arc<dyn PersistenceConnector>;
        let persisted = Arc::new(PersistedConnector::new(store));

        let gt_peer = Arc::new(MemoryConnector::new()) as Arc<dyn PersistenceConnector>;
        persisted
            .register_peer(
                Arc::downgrade(&gt_peer),
                SyncRole::GroundTruth,
                SyncDirection::Bidirectional,
                None,
                None,
            )
            .await;
        let write_only_peer = Arc::new(MemoryConnector::new()) as Arc<dyn PersistenceConnector>;
        persisted
            .register_peer(
                Arc::downgrade(&write_only_peer),
                SyncRole::ReadWrite,
                SyncDirection::ToPersistence,
                None,
                None,
            )
            .await;

        persisted.consume(Some(json!(1))).await.unwrap();
        assert_eq!(persisted.fanout_notified_count(), 0);
    }

    #[tokio::test]
    async fn fanout_cap_bounds_notified_peers() {
        let store = Arc::new(MemoryConnector::new()) as Arc<dyn PersistenceConnector>;
        let persisted = Arc::new(PersistedConnector::with_fanout_cap(store, 1));

        let peer_a = Arc::new(MemoryConnector::new()) as Arc<dyn PersistenceConnector>;
        let peer_b = Arc::new(MemoryConnector::new()) as Arc<dyn PersistenceConnector>;
        for peer in [peer_a.clone(), peer_b.clone()] {
            persisted
                .register_peer(
                    Arc::downgrade(&peer),
                    SyncRole::ReadWrite,
                    SyncDirection::Bidirectional,
                    None,
                    None,
                )
                .await;
        }

        persisted.consume(Some(json!(1))).await.unwrap();
        assert_eq!(persisted.fanout_notified_count(), 1);
    }

    #[tokio::test]
    async fn clear_peers_stops_further_fan_out() {
        let store = Arc::new(MemoryConnector::new()) as Arc<dyn PersistenceConnector>;
        let persisted = Arc::new(PersistedConnector::new(store));

        let peer = Arc::new(MemoryConnector::new()) as Arc<dyn PersistenceConnector>;
        persisted
            .register_peer(Arc::downgrade(&peer), SyncRole::ReadWrite, SyncDirection::Bidirectional, None, None)
            .await;

        persisted.clear_peers().await;
        persisted.consume(Some(json!(1))).await.unwrap();
        assert_eq!(persisted.fanout_notified_count(), 0);
    }
}
