//! Conveyor - Main Entry Point
//! Job orchestration daemon: SQLite queue engine, per-queue workers, JSON-RPC control plane

mod config;
mod services;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import workspace crates
use config::{DaemonConfig, LogFormat};
use conveyor_api_rpc::{RpcServer, RpcServerConfig};
use conveyor_core::application::{HandlerRegistry, JobOrchestrator, JobPolicy, OrchestratorConfig};
use conveyor_core::port::id_provider::UuidProvider;
use conveyor_core::port::time_provider::SystemTimeProvider;
use conveyor_infra_sqlite::{create_pool, run_migrations, SqliteQueueEngine};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config = DaemonConfig::from_env()?;

    // 2. Initialize logging
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("conveyor=info"))
        .context("Failed to create env filter")?;

    let (otel_layer, otel_error) = match telemetry::telemetry_layer() {
        Ok(layer) => (layer, None),
        Err(e) => (None, Some(e)),
    };

    let registry = tracing_subscriber::registry().with(otel_layer).with(env_filter);
    match config.log_format {
        // Production: JSON structured logging
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        // Development: Pretty formatting with colors
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
    }

    info!("Conveyor v{} starting...", VERSION);
    if let Some(e) = otel_error {
        warn!(error = ?e, "Failed to initialize OpenTelemetry (continuing without it)");
    }

    // 3. Initialize database
    let db_path = config.db_path.display().to_string();
    info!(db_path = %db_path, "Initializing database...");

    if let Some(dir) = config.db_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
    }

    let pool = create_pool(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let engine = Arc::new(SqliteQueueEngine::new(
        pool.clone(),
        Arc::new(SystemTimeProvider),
        Arc::new(UuidProvider),
    ));

    // 5. Jobs left active by a crashed process go back to waiting
    info!("Running crash recovery...");
    match engine.recover_orphaned().await {
        Ok(count) => info!(recovered_jobs = count, "Crash recovery completed"),
        Err(e) => error!(error = ?e, "Crash recovery failed"),
    }

    // 6. Register handlers; a missing or duplicate binding aborts startup
    let registry = HandlerRegistry::setup(&services::providers())?;
    info!(handlers = registry.len(), "Job handlers registered");

    // 7. Start workers
    info!("Starting workers...");
    let mut orchestrator = JobOrchestrator::new(
        registry,
        engine,
        JobPolicy::default(),
        OrchestratorConfig {
            poll_interval: config.poll_interval,
            barrier_interval: config.barrier_interval,
            clean_batch_limit: config.clean_batch_limit,
        },
    );
    orchestrator.start();

    for (queue, concurrency) in &config.concurrency {
        orchestrator.set_concurrency(*queue, *concurrency)?;
        info!(queue = %queue, concurrency, "Concurrency configured");
    }
    let orchestrator = Arc::new(orchestrator);

    // 8. Start JSON-RPC server
    info!("Starting JSON-RPC server...");
    let rpc_config = RpcServerConfig {
        port: config.rpc_port,
        ..Default::default()
    };
    let rpc_handle = RpcServer::new(rpc_config, orchestrator.clone())
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!("System ready. Waiting for jobs...");
    info!("Press Ctrl+C to shutdown");

    // 9. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 10. Graceful shutdown: stop accepting requests, then let in-flight jobs finish
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, orchestrator.stop())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Workers did not stop in time"
        );
    }
    pool.close().await;
    telemetry::shutdown();

    info!("Shutdown complete.");

    Ok(())
}
