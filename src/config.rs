// Copyright 2026 Modelmesh Contributors.

//! Static configuration: persistence-factory seeds, server bind address, and
//! log filter, loaded from a file path or an inline literal (§4.L).

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{MiddlewareError, MiddlewareResult};

/// A single data model's persistence-factory seed: enough connection
/// parameters for the facade to register a default factory at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceFactorySeed {
    /// Name of the data model this seed provisions a factory for.
    pub data_model_name: String,
    /// Host of the upstream AAS (asset administration shell) service.
    pub aas_host: String,
    /// Port of the upstream AAS service.
    pub aas_port: u16,
    /// Host of the upstream submodel service.
    pub submodel_host: String,
    /// Port of the upstream submodel service.
    pub submodel_port: u16,
}

/// Top-level configuration for a middleware instance.
#[derive(Debug, Clone, Deserialize)]
pub struct MiddlewareConfig {
    /// Address the REST/GraphQL server binds to.
    pub bind_address: SocketAddr,
    /// `tracing_subscriber::EnvFilter` directive string.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Persistence-factory seeds, turned into registrations at startup.
    #[serde(default)]
    pub persistence_seeds: Vec<PersistenceFactorySeed>,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl MiddlewareConfig {
    /// Loads configuration from a file at `path`. JSON is tried first, then
    /// TOML, by content rather than extension, matching how the core has no
    /// other opinion on file naming.
    pub fn from_file(path: impl AsRef<Path>) -> MiddlewareResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MiddlewareError::ConnectionError(format!("reading config: {e}")))?;
        Self::from_str(&contents)
    }

    /// Parses configuration from an inline JSON or TOML literal.
    pub fn from_str(contents: &str) -> MiddlewareResult<Self> {
        if let Ok(cfg) = serde_json::from_str::<Self>(contents) {
            return Ok(cfg);
        }
        toml::from_str(contents).map_err(|e| MiddlewareError::MappingError(format!("invalid config: {e}")))
    }
}
