//! # Provisioner Server
//!
//! Loads configuration, recovers interrupted clusters, starts the expiry
//! sweeper and serves the HTTP API until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn};

use provisioner_core::config::ConfigManager;
use provisioner_core::database::create_pool;
use provisioner_core::logging::init_tracing;
use provisioner_core::orchestration::{
    ExpirySweeper, LifecycleService, LifecycleSettings, ProvisioningEngine, TerraformEngine,
};
use provisioner_core::web::{create_app, AppState};

#[derive(Parser)]
#[command(name = "provisioner-server")]
#[command(about = "Cluster provisioning service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// YAML configuration file; environment overrides use PROVISIONER_<SECTION>__<KEY>
    #[arg(short, long, env = "PROVISIONER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let manager = ConfigManager::load(cli.config.as_deref()).context("loading configuration")?;
    let config = manager.config();
    init_tracing(&config.logging);

    let root = info_span!("provisioner");
    info!(
        parent: &root,
        source = ?manager.source_file(),
        config = %manager.sanitized(),
        "Configuration loaded"
    );

    let pool = create_pool(&config.database)
        .await
        .context("connecting to the database")?;

    let engine = TerraformEngine::from_config(config).context("configuring the engine")?;
    match engine.version().await {
        Ok(version) => info!(parent: &root, version = %version, "Engine available"),
        Err(e) => warn!(parent: &root, error = %e, "Engine version check failed"),
    }

    let service = LifecycleService::new(
        pool,
        Arc::new(engine),
        LifecycleSettings::from_config(config).context("configuring the lifecycle service")?,
        root.clone(),
    );

    let recovered = service
        .recover_interrupted()
        .await
        .context("recovering interrupted clusters")?;
    if recovered > 0 {
        warn!(parent: &root, recovered, "Recovered clusters interrupted by the previous run");
    }

    let shutdown = CancellationToken::new();
    let sweeper = ExpirySweeper::from_config(service.clone(), config, root.clone())
        .context("configuring the expiry sweeper")?
        .spawn(shutdown.clone());

    let address = config.server.socket_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!(parent: &root, address = %address, "HTTP server listening");

    let app = create_app(AppState::new(service.clone()));
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await
        .context("serving HTTP")?;

    shutdown.cancel();
    let _ = sweeper.await;
    service.wait_for_background().await;
    info!(parent: &root, "Provisioner stopped");
    Ok(())
}
