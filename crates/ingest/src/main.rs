//! RAN Ingest - snapshot collection endpoint
//!
//! Accepts snapshots POSTed by the vendor log parsers and serves them back
//! to monitors, alongside health and Prometheus endpoints.

use anyhow::Result;
use monitor_lib::{
    health::{components, HealthRegistry},
    observability::{MonitorMetrics, StructuredLogger},
};
use ran_ingest::{api, AppState, IngestBuffer, IngestConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const INGEST_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = IngestConfig::load()?;
    info!(
        port = config.port,
        capacity = config.capacity,
        route = %config.route,
        "Ingest configured"
    );

    let health_registry =
        HealthRegistry::with_stale_after(Duration::from_secs(config.stale_after_secs));
    health_registry.register(components::INGEST).await;

    let metrics = MonitorMetrics::new();
    metrics.set_ingest_buffer_entries(0);

    let logger = StructuredLogger::new(&config.instance);
    logger.log_startup(INGEST_VERSION, "ingest");

    let state = Arc::new(AppState::new(
        IngestBuffer::new(config.capacity),
        health_registry.clone(),
        metrics,
    ));

    health_registry.set_ready(true).await;

    let shutdown_logger = logger.clone();
    api::serve(config.port, &config.route, state, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        shutdown_logger.log_shutdown("SIGINT received");
    })
    .await?;

    info!("Shutting down");
    Ok(())
}
