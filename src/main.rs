//! # Resource Gateway - Main Entry Point
//!
//! Boots the control plane:
//! 1. load process settings and initialise logging
//! 2. install the resource registry
//! 3. open the configured adapter and install the initial configuration
//! 4. run the watch and reload pipeline next to the admin API
//! 5. on Ctrl+C stop the admin API, then the pipeline

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use resource_gateway::admin::{AdminRouter, AdminState};
use resource_gateway::configman::{build_adapter, ConfigLoader, LoaderSettings};
use resource_gateway::core::error::GatewayError;
use resource_gateway::observability::init_logging;
use resource_gateway::sources::builtin::builtin_registry;
use resource_gateway::sources::LocalHost;
use resource_gateway::{GatewayConfig, GatewayResult, SourceRegistry};

#[tokio::main]
async fn main() {
    let config = match GatewayConfig::load_from_file(GatewayConfig::config_path()).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load gateway settings: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);
    info!("🚀 Starting Resource Gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config).await {
        error!(error = %e, "Gateway stopped with an error");
        std::process::exit(1);
    }

    info!("✅ Resource Gateway shutdown complete");
}

async fn run(config: GatewayConfig) -> GatewayResult<()> {
    let registry = SourceRegistry::install(builtin_registry()?)?;
    info!(kinds = registry.len(), "Resource registry installed");

    let adapter = build_adapter(&config.loader.adapter).await?;
    let host = Arc::new(LocalHost::new(config.providers.iter().cloned()));

    let loader = ConfigLoader::start(
        adapter,
        registry,
        host,
        LoaderSettings::from(&config.loader),
    )
    .await?;

    let cancel = CancellationToken::new();
    let pipeline = loader.spawn(cancel.clone());

    let address = config.admin.socket_address();
    let listener = TcpListener::bind(&address).await.map_err(|e| {
        GatewayError::fatal(format!("failed to bind admin API on {}: {}", address, e))
    })?;
    info!(address = %address, "Admin API listening");

    let router = AdminRouter::create_router(AdminState::new(loader));
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("🛑 Stopping config loader...");
    cancel.cancel();
    if let Err(e) = pipeline.await {
        error!(error = %e, "Config loader task failed");
    }

    served.map_err(GatewayError::from)
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, starting graceful shutdown"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}
