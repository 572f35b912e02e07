//! Cloudlift agent - host overload monitor with one-shot cloud migration
//!
//! Samples host CPU, memory and disk utilization, and moves the machine's
//! disk to the configured cloud provider once overload is sustained.

use agent_lib::{
    config::MigrationConfig,
    health::HealthRegistry,
    load::{LoadGenerator, MemoryBallast},
    migration::{MigrationOrchestrator, SystemCommandRunner},
    monitor::{LoopExit, MonitorLoopBuilder},
    observability::{AgentMetrics, StructuredLogger},
    sampler::HostSampler,
    status::{MonitorStatus, StatusBoard},
};
use anyhow::{Context, Result};
use cloudlift_agent::{api, config::AgentConfig};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// JSON logs to stdout, plus an optional append-only log file
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AgentConfig::load().context("Invalid agent configuration")?;
    init_tracing(config.log_file.as_deref())?;

    info!("Starting cloudlift-agent");

    let migration_config = MigrationConfig::load(&config.migration_config_path)
        .context("Failed to load migration config")?;
    let migration_config = Arc::new(migration_config);
    info!(
        host_name = %config.host_name,
        provider = %migration_config.cloud_provider,
        threshold = config.threshold_percent,
        consecutive_checks = config.consecutive_checks,
        "Agent configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();

    let metrics = AgentMetrics::new();

    // Initialize structured logger
    let logger = StructuredLogger::new(&config.host_name);
    logger.log_startup(AGENT_VERSION, &migration_config.cloud_provider);

    let status = StatusBoard::new(MonitorStatus::new(
        migration_config.cloud_provider.clone(),
        config.threshold_percent,
        config.consecutive_checks,
    ));

    let sampler = Arc::new(
        HostSampler::new(config.disk_mount_point.clone())
            .with_averaging_window(config.sample_window()),
    );

    let orchestrator = Arc::new(
        MigrationOrchestrator::new(Arc::new(SystemCommandRunner::new()), logger.clone())
            .with_status(status.clone()),
    );

    let load = LoadGenerator::new(
        MemoryBallast::new(config.ballast_block_bytes(), config.max_ballast_blocks),
        logger.clone(),
    );

    let monitor = MonitorLoopBuilder::new()
        .sampler(sampler.clone())
        .orchestrator(orchestrator)
        .migration_config(migration_config)
        .interval(config.check_interval())
        .threshold(config.threshold_percent)
        .consecutive_checks(config.consecutive_checks)
        .status(status.clone())
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()?;

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        status,
        sampler,
        load.clone(),
    ));

    // Start dashboard, health and metrics server
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Mark agent as ready after initialization
    health_registry.mark_ready();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut monitor_handle = tokio::spawn(monitor.run(shutdown_rx));

    tokio::select! {
        exit = &mut monitor_handle => {
            match exit {
                Ok(LoopExit::Migrated(result)) => {
                    info!(
                        instance = ?result.instance_name,
                        duration_ms = result.duration_ms,
                        "Monitoring stopped after migration, API stays up until interrupted"
                    );
                }
                Ok(LoopExit::Shutdown) => {}
                Err(e) => error!(error = %e, "Monitor loop task failed"),
            }
            tokio::signal::ctrl_c().await?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            // Let an in-flight migration finish before exiting
            let _ = shutdown_tx.send(());
            if let Err(e) = monitor_handle.await {
                error!(error = %e, "Monitor loop task failed");
            }
        }
    }

    logger.log_shutdown("SIGINT received");
    load.stop_cpu();
    load.free_memory();
    api_handle.abort();
    info!("Shutting down");

    Ok(())
}
