// Copyright 2026 Modelmesh Contributors.

//! Connector capability traits and the reference in-memory/interval adapters (§4.D).

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Duration;
use futures::StreamExt as _;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::MiddlewareResult;

/// A source a value can be pulled from on demand.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Fetches the current value. May block on I/O; may fail.
    async fn provide(&self) -> MiddlewareResult<Value>;
}

/// A sink a value can be pushed into.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Applies `value` to the underlying system. `None` is interpreted as a
    /// delete by connectors that support it; others may ignore it.
    async fn consume(&self, value: Option<Value>) -> MiddlewareResult<()>;
}

/// An unbounded pull-based source of values, honoring cancellation.
#[async_trait]
pub trait Receiver: Send + Sync {
    /// Returns a boxed stream of values that ends when `token` is cancelled.
    fn receive(&self, token: CancellationToken) -> std::pin::Pin<Box<dyn Stream<Item = Value> + Send>>;
}

/// A topic-addressed [`Consumer`].
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes `value` under `topic`.
    async fn publish(&self, topic: &str, value: Value) -> MiddlewareResult<()>;
}

/// A topic-addressed [`Receiver`].
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Returns a boxed stream of values published under `topic`.
    fn subscribe(&self, topic: &str, token: CancellationToken) -> std::pin::Pin<Box<dyn Stream<Item = Value> + Send>>;
}

/// Anything usable as a persistence backend: readable, writable, and
/// life-cycled. Blanket-implemented for any type satisfying all three.
pub trait PersistenceConnector: Provider + Consumer + Lifecycle {}
impl<T: Provider + Consumer + Lifecycle> PersistenceConnector for T {}

/// Resource lifetime bracket implemented by every connector. Both methods
/// must be idempotent: calling `connect` twice or `disconnect` without a
/// prior `connect` is not an error.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Acquires whatever resource the connector needs (socket, handle, …).
    async fn connect(&self) -> MiddlewareResult<()> {
        Ok(())
    }

    /// Releases that resource.
    async fn disconnect(&self) -> MiddlewareResult<()> {
        Ok(())
    }
}

/// Reference Provider+Consumer backed by a single in-process slot.
///
/// Shipped for demonstration and testing, not as a production wire adapter.
pub struct MemoryConnector {
    slot: Arc<RwLock<Option<Value>>>,
}

impl MemoryConnector {
    /// Creates an empty connector.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(RwLock::new(None)),
        }
    }

    /// Creates a connector pre-populated with `value`.
    pub fn with_value(value: Value) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Some(value))),
        }
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle for MemoryConnector {}

#[async_trait]
impl Provider for MemoryConnector {
    async fn provide(&self) -> MiddlewareResult<Value> {
        Ok(self.slot.read().await.clone().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl Consumer for MemoryConnector {
    async fn consume(&self, value: Option<Value>) -> MiddlewareResult<()> {
        *self.slot.write().await = value;
        Ok(())
    }
}

/// Polling adapter that turns any [`Provider`] into a [`Receiver`] by
/// sampling it on a fixed interval.
pub struct IntervalReceiver<P: Provider + 'static> {
    provider: Arc<P>,
    period: Duration,
}

impl<P: Provider + 'static> IntervalReceiver<P> {
    /// Wraps `provider`, sampling it every `period`.
    pub fn new(provider: Arc<P>, period: Duration) -> Self {
        Self { provider, period }
    }
}

#[async_trait]
impl<P: Provider + 'static> Receiver for IntervalReceiver<P> {
    fn receive(&self, token: CancellationToken) -> std::pin::Pin<Box<dyn Stream<Item = Value> + Send>> {
        let provider = self.provider.clone();
        let ticks = IntervalStream::new(tokio::time::interval(self.period));
        let gate = Arc::new(Mutex::new(()));

        let stream = ticks.take_until(token.cancelled_owned()).then(move |_| {
            let provider = provider.clone();
            let gate = gate.clone();
            async move {
                let _permit = gate.lock().await;
                provider.provide().await.unwrap_or(Value::Null)
            }
        });
        Box::pin(stream)
    }
}
