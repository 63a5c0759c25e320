// Copyright 2026 Modelmesh Contributors.

//! Model-driven integration middleware: ingest a typed data-model graph from
//! arbitrary JSON, synchronize it against external connectors, schedule
//! workflows over it, and serve it through generated REST and GraphQL APIs.

pub mod config;
pub mod connection_info;
pub mod connector;
pub mod error;
pub mod facade;
pub mod graphql;
pub mod identifier;
pub mod mapper;
pub mod model;
pub mod reference;
pub mod registry;
pub mod rest;
pub mod sync;
pub mod workflow;

pub use config::{MiddlewareConfig, PersistenceFactorySeed};
pub use connection_info::{ConnectionInfo, ConnectionType};
pub use connector::{Consumer, Lifecycle, MemoryConnector, PersistenceConnector, Provider, Publisher, Receiver, Subscriber};
pub use error::{MiddlewareError, MiddlewareResult};
pub use facade::Middleware;
pub use mapper::{Formatter, IdentityMapper, JsonFormatter, Mapper};
pub use model::{DataModel, SharedEntity};
pub use registry::{ConnectorFactory, PersistenceRegistry};
pub use sync::{PersistedConnector, SyncDirection, SyncRole, SyncedConnector, SyncManager};
pub use workflow::{ExecutionMode, Workflow, WorkflowDescription, WorkflowRegistry, WorkflowStatus};
