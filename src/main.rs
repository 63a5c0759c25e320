// Copyright 2026 Modelmesh Contributors.

//! Binary entry point: load configuration, register persistence factories
//! from its seeds, and serve the middleware's generated router.

use std::sync::Arc;

use modelmesh::config::MiddlewareConfig;
use modelmesh::connector::MemoryConnector;
use modelmesh::{ConnectionInfo, ConnectorFactory, Middleware, PersistenceConnector};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let config = match config_path {
        Some(path) => MiddlewareConfig::from_file(&path)?,
        None => MiddlewareConfig::from_str(r#"{"bind_address": "127.0.0.1:8080"}"#)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_filter))
        .json()
        .init();

    let middleware = Arc::new(Middleware::new());
    for seed in &config.persistence_seeds {
        register_seed(&middleware, seed).await?;
    }

    middleware.start().await?;

    let router = middleware.into_router().await;
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    tracing::info!(address = %config.bind_address, "modelmesh listening");

    let shutdown_middleware = middleware.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown_middleware.shutdown().await;
        })
        .await?;

    Ok(())
}

async fn register_seed(
    middleware: &Arc<Middleware>,
    seed: &modelmesh::PersistenceFactorySeed,
) -> anyhow::Result<()> {
    // Reference default factory: an in-process slot per connection info.
    // Real deployments register factories that dial `seed.aas_host`/`seed.submodel_host`
    // against a concrete connector implementation before calling this binary.
    let factory: ConnectorFactory =
        Arc::new(|_seed| Ok(Arc::new(MemoryConnector::new()) as Arc<dyn PersistenceConnector>));
    middleware
        .registry()
        .add_persistence_factory(ConnectionInfo::for_data_model(seed.data_model_name.clone()), None, factory)
        .await;
    Ok(())
}
