// Copyright 2026 Modelmesh Contributors.

//! Workflow engine: named, pool-bounded, optionally interval-scheduled
//! user functions (§4.H).

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{MiddlewareError, MiddlewareResult};

/// The mutually-exclusive concurrency policy a workflow is defined with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Exactly one concurrent run; a second call is rejected.
    Default,
    /// Up to `pool_size` concurrent runs; calls beyond that are rejected.
    Blocking,
    /// Up to `pool_size` concurrent runs; calls beyond that wait FIFO for a slot.
    Queueing,
    /// One run, re-triggered every `interval` until cancelled.
    Interval,
}

/// A workflow's static configuration, analogous to a route description.
#[derive(Clone)]
pub struct WorkflowDescription {
    /// The workflow's registered name.
    pub name: String,
    /// Re-run period, set only for [`ExecutionMode::Interval`] workflows.
    pub interval: Option<std::time::Duration>,
    /// Whether a run is fired automatically when the facade starts up.
    pub on_startup: bool,
    /// Whether `interrupt()` is called automatically when the facade shuts down.
    pub on_shutdown: bool,
    /// This workflow's concurrency policy.
    pub mode: ExecutionMode,
    /// Concurrent run budget under [`ExecutionMode::Blocking`]/[`ExecutionMode::Queueing`].
    pub pool_size: usize,
}

impl WorkflowDescription {
    /// A non-blocking, non-queued, single-slot workflow — the default shape.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interval: None,
            on_startup: false,
            on_shutdown: false,
            mode: ExecutionMode::Default,
            pool_size: 1,
        }
    }

    /// Allows `pool_size` concurrent runs, rejecting calls past that.
    pub fn blocking(mut self, pool_size: usize) -> Self {
        self.mode = ExecutionMode::Blocking;
        self.pool_size = pool_size;
        self
    }

    /// Allows `pool_size` concurrent runs, queueing calls past that.
    pub fn queueing(mut self, pool_size: usize) -> Self {
        self.mode = ExecutionMode::Queueing;
        self.pool_size = pool_size;
        self
    }

    /// Re-runs on a fixed period until cancelled.
    pub fn interval(mut self, period: std::time::Duration) -> Self {
        self.mode = ExecutionMode::Interval;
        self.interval = Some(period);
        self
    }

    /// Fires this workflow once automatically when the facade starts.
    pub fn on_startup(mut self) -> Self {
        self.on_startup = true;
        self
    }

    /// Interrupts any active run automatically when the facade shuts down.
    pub fn on_shutdown(mut self) -> Self {
        self.on_shutdown = true;
        self
    }
}

/// Snapshot of a workflow's current state, returned by `describe()`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatus {
    /// The workflow's name.
    pub name: String,
    /// Whether at least one run is currently active.
    pub running: bool,
    /// Number of active runs.
    pub active_runs: usize,
    /// Re-run period, if any.
    pub interval: Option<std::time::Duration>,
    /// When the most recently started active run began, if any are active.
    pub last_started_at: Option<chrono::DateTime<chrono::Utc>>,
}

type WorkflowBody = Arc<dyn Fn(Value, CancellationToken) -> BoxFuture<'static, MiddlewareResult<Value>> + Send + Sync>;

struct ActiveRun {
    handle: Option<JoinHandle<()>>,
    token: CancellationToken,
    started_at: chrono::DateTime<chrono::Utc>,
}

/// A single registered workflow: its description, typed-argument body, and
/// the bookkeeping needed to enforce its concurrency policy.
pub struct Workflow {
    description: WorkflowDescription,
    body: WorkflowBody,
    semaphore: Arc<Semaphore>,
    runs: RwLock<HashMap<Uuid, ActiveRun>>,
}

impl Workflow {
    /// Registers a workflow whose body is a typed async function over `A`.
    pub fn new<A, F, Fut>(description: WorkflowDescription, body: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        F: Fn(A, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = MiddlewareResult<Value>> + Send + 'static,
    {
        let permits = match description.mode {
            ExecutionMode::Blocking | ExecutionMode::Queueing => description.pool_size.max(1),
            _ => 1,
        };
        let body: WorkflowBody = Arc::new(move |args, token| {
            let body = &body;
            let parsed = serde_json::from_value::<A>(args).map_err(|e| MiddlewareError::MappingError(e.to_string()));
            let fut = match parsed {
                Ok(args) => Some(body(args, token)),
                Err(_) => None,
            };
            Box::pin(async move {
                match fut {
                    Some(fut) => fut.await,
                    None => Err(MiddlewareError::MappingError("argument validation failed".into())),
                }
            })
        });
        Self {
            description,
            body,
            semaphore: Arc::new(Semaphore::new(permits)),
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Runs the workflow body to completion, enforcing this workflow's
    /// concurrency policy, and returns its result.
    pub async fn execute(&self, args: Value) -> MiddlewareResult<Value> {
        let (permit, run_id, token) = self.acquire().await?;
        self.runs.write().await.insert(
            run_id,
            ActiveRun {
                handle: None,
                token: token.clone(),
                started_at: chrono::Utc::now(),
            },
        );
        let result = (self.body)(args, token).await;
        drop(permit);
        self.runs.write().await.remove(&run_id);
        result
    }

    /// Fires the workflow body without waiting for it, returning immediately.
    pub async fn execute_background(self: &Arc<Self>, args: Value) -> MiddlewareResult<String> {
        let (permit, run_id, token) = self.acquire().await?;
        let body = self.body.clone();
        let name = self.description.name.clone();
        let spawned_token = token.clone();
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = body(args, spawned_token).await {
                tracing::error!(workflow = %name, error = %err, "background workflow run failed");
            }
            this.runs.write().await.remove(&run_id);
        });
        self.runs.write().await.insert(
            run_id,
            ActiveRun {
                handle: Some(handle),
                token,
                started_at: chrono::Utc::now(),
            },
        );
        Ok(format!("workflow '{}' started as {run_id}", self.description.name))
    }

    /// Starts an [`ExecutionMode::Interval`] workflow's repeating loop, returning
    /// the token controlling it. Intended to be called once, at facade startup.
    pub async fn execute_interval(&self, args: Value) -> MiddlewareResult<()> {
        let Some(period) = self.description.interval else {
            return Err(MiddlewareError::WorkflowError(format!(
                "'{}' is not an interval workflow",
                self.description.name
            )));
        };
        let (permit, run_id, token) = self.acquire().await?;
        let body = self.body.clone();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = body(args.clone(), loop_token.clone()).await {
                            tracing::warn!(error = %err, "interval workflow run failed");
                        }
                    }
                }
            }
        });
        self.runs.write().await.insert(
            run_id,
            ActiveRun {
                handle: Some(handle),
                token,
                started_at: chrono::Utc::now(),
            },
        );
        Ok(())
    }

    async fn acquire(&self) -> MiddlewareResult<(tokio::sync::OwnedSemaphorePermit, Uuid, CancellationToken)> {
        let permit = match self.description.mode {
            ExecutionMode::Queueing => self.semaphore.clone().acquire_owned().await.expect("semaphore not closed"),
            _ => self
                .semaphore
                .clone()
                .try_acquire_owned()
                .map_err(|_| MiddlewareError::AlreadyRunning(self.description.name.clone()))?,
        };
        let run_id = Uuid::new_v4();
        Ok((permit, run_id, CancellationToken::new()))
    }

    /// Cancels every active run of this workflow. Fails with `NotRunning`
    /// if none are active.
    pub async fn interrupt(&self) -> MiddlewareResult<()> {
        let mut runs = self.runs.write().await;
        if runs.is_empty() {
            return Err(MiddlewareError::NotRunning(self.description.name.clone()));
        }
        for (_, run) in runs.drain() {
            run.token.cancel();
            if let Some(handle) = run.handle {
                handle.abort();
            }
        }
        Ok(())
    }

    /// Current status snapshot.
    pub async fn describe(&self) -> WorkflowStatus {
        let runs = self.runs.read().await;
        let last_started_at = runs.values().map(|run| run.started_at).max();
        WorkflowStatus {
            name: self.description.name.clone(),
            running: !runs.is_empty(),
            active_runs: runs.len(),
            interval: self.description.interval,
            last_started_at,
        }
    }
}

/// Registry of workflows known to a [`crate::facade::Middleware`] instance.
#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: RwLock<HashMap<String, Arc<Workflow>>>,
}

impl WorkflowRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `workflow` under its own name, rejecting duplicates.
    pub async fn register(&self, workflow: Workflow) -> MiddlewareResult<Arc<Workflow>> {
        let name = workflow.description.name.clone();
        let arc = Arc::new(workflow);
        let mut workflows = self.workflows.write().await;
        if workflows.contains_key(&name) {
            return Err(MiddlewareError::TypeNameCollision(name));
        }
        workflows.insert(name, arc.clone());
        Ok(arc)
    }

    /// Looks up a workflow by name.
    pub async fn get(&self, name: &str) -> MiddlewareResult<Arc<Workflow>> {
        self.workflows
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| MiddlewareError::NotFound(name.to_string()))
    }

    /// Runs every `on_startup` workflow once, and starts every interval workflow's loop.
    pub async fn start_all(&self) -> MiddlewareResult<()> {
        for workflow in self.workflows.read().await.values() {
            if workflow.description.mode == ExecutionMode::Interval {
                workflow.execute_interval(Value::Null).await?;
            } else if workflow.description.on_startup {
                workflow.execute(Value::Null).await?;
            }
        }
        Ok(())
    }

    /// Interrupts every workflow marked `on_shutdown`.
    pub async fn shutdown_all(&self) {
        for workflow in self.workflows.read().await.values() {
            if workflow.description.on_shutdown || workflow.description.mode == ExecutionMode::Interval {
                let _ = workflow.interrupt().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Deserialize)]
    struct Args {
        n: i64,
    }

    #[tokio::test]
    async fn default_mode_rejects_concurrent_calls() {
        let workflow = Arc::new(Workflow::new(WorkflowDescription::new("slow"), |args: Args, _token| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(json!(args.n))
        }));

        let w2 = workflow.clone();
        let handle = tokio::spawn(async move { w2.execute(json!({"n": 1})).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = workflow.execute(json!({"n": 2})).await;
        assert!(matches!(second, Err(MiddlewareError::AlreadyRunning(_))));
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn blocking_mode_allows_pool_size_concurrent_runs() {
        let workflow = Arc::new(Workflow::new(
            WorkflowDescription::new("pool").blocking(2),
            |args: Args, _token| async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(json!(args.n))
            },
        ));

        let a = { let w = workflow.clone(); tokio::spawn(async move { w.execute(json!({"n": 1})).await }) };
        let b = { let w = workflow.clone(); tokio::spawn(async move { w.execute(json!({"n": 2})).await }) };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let third = workflow.execute(json!({"n": 3})).await;
        assert!(matches!(third, Err(MiddlewareError::AlreadyRunning(_))));
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn queueing_mode_blocks_the_caller_until_a_slot_frees() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let workflow = Arc::new(Workflow::new(
            WorkflowDescription::new("queue").queueing(1),
            move |args: Args, _token| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(json!(args.n))
                }
            },
        ));

        let w2 = workflow.clone();
        let first = tokio::spawn(async move { w2.execute(json!({"n": 1})).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = workflow.execute(json!({"n": 2})).await.unwrap();
        assert_eq!(second, json!(2));
        first.await.unwrap().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn interrupt_cancels_interval_runs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let workflow = Workflow::new(
            WorkflowDescription::new("tick").interval(Duration::from_millis(5)),
            move |_args: Args, _token| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                }
            },
        );
        workflow.execute_interval(json!({"n": 0})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        workflow.interrupt().await.unwrap();
        let observed = counter.load(Ordering::SeqCst);
        assert!(observed > 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), observed);
    }

    #[tokio::test]
    async fn interrupt_without_active_runs_fails() {
        let workflow = Workflow::new(WorkflowDescription::new("idle"), |_args: Args, _token| async move { Ok(Value::Null) });
        assert!(matches!(workflow.interrupt().await, Err(MiddlewareError::NotRunning(_))));
    }

    #[tokio::test]
    async fn malformed_arguments_surface_as_mapping_error() {
        let workflow = Workflow::new(WorkflowDescription::new("typed"), |_args: Args, _token| async move { Ok(Value::Null) });
        let result = workflow.execute(json!({"n": "not a number"})).await;
        assert!(matches!(result, Err(MiddlewareError::MappingError(_))));
    }

    #[tokio::test]
    async fn registry_rejects_duplicate_names() {
        let registry = WorkflowRegistry::new();
        registry
            .register(Workflow::new(WorkflowDescription::new("dup"), |_args: Args, _token| async move {
                Ok(Value::Null)
            }))
            .await
            .unwrap();
        let result = registry
            .register(Workflow::new(WorkflowDescription::new("dup"), |_args: Args, _token| async move {
                Ok(Value::Null)
            }))
            .await;
        assert!(matches!(result, Err(MiddlewareError::TypeNameCollision(_))));
    }
}
