//! Resource Predictor - host usage forecasting daemon
//!
//! Periodically forecasts disk, CPU and memory usage 15 minutes ahead from
//! Prometheus history and pushes the forecasts to a Pushgateway.

use anyhow::{Context, Result};
use predictor_lib::{
    api::{self, AppState},
    fetcher::{BackendConnection, PrometheusClient},
    health::{components, HealthRegistry},
    models::MetricSpec,
    observability::{PredictorMetrics, StructuredLogger},
    predictor::{PredictionCycle, PredictionScheduler},
    publisher::{PushgatewaySink, ResultPublisher},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const PREDICTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = config::PredictorConfig::load()?;
    let forecaster = config.model()?.build();
    let specs = MetricSpec::default_set();

    let metrics = PredictorMetrics::new();
    let logger = StructuredLogger::new(&config.predictor_job);
    logger.log_startup(PREDICTOR_VERSION, forecaster.name(), specs.len());
    info!(
        prometheus_url = %config.prometheus_url,
        pushgateway_url = %config.pushgateway_url,
        interval_secs = config.predictor_interval_secs,
        "Predictor configured"
    );

    let health_registry = HealthRegistry::new(config.stall_after());
    health_registry.register(components::BACKEND).await;
    health_registry.register(components::FORECASTER).await;
    health_registry.register(components::PUBLISHER).await;

    // Start health and metrics server
    let app_state = Arc::new(AppState::new(health_registry.clone(), metrics.clone()));
    let api_port = config.predictor_api_port;
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, app_state).await {
            error!(error = %e, "API server stopped");
        }
    });

    info!(
        delay_secs = config.predictor_startup_delay_secs,
        "Waiting for dependencies to come up"
    );
    tokio::time::sleep(config.startup_delay()).await;

    let client = PrometheusClient::new(&config.prometheus_url, config.request_timeout())
        .context("Invalid PROMETHEUS_URL")?;
    let connection = Arc::new(BackendConnection::new(
        Arc::new(client),
        config.connect_config(),
    ));
    let state = connection.connect().await;
    metrics.set_connection_state(state.as_gauge());
    if !state.is_connected() {
        health_registry
            .set_degraded(components::BACKEND, "Backend unreachable at startup")
            .await;
    }

    let sink = PushgatewaySink::new(&config.pushgateway_url, config.request_timeout())
        .context("Invalid PUSHGATEWAY_URL")?;
    let publisher = ResultPublisher::new(Arc::new(sink), &config.predictor_job, logger.clone());
    let cycle = PredictionCycle::new(specs, connection.clone(), forecaster, logger.clone());

    let scheduler = Arc::new(PredictionScheduler::new(
        cycle,
        publisher,
        Some(connection),
        health_registry,
        config.scheduler_config(),
    ));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(());
    scheduler_handle.await?;

    Ok(())
}
