//! Operational HTTP surface of the predictor daemon
//!
//! `/healthz` fails once the scheduler has gone a stall window without
//! finishing a cycle or a component reports unhealthy. `/readyz` turns
//! ready once the first cycle has run through publishing. `/metrics` exposes
//! the predictor's own counters and timings, not the forecasts themselves,
//! which only go to the Pushgateway.

use crate::health::{ComponentStatus, HealthRegistry};
use crate::observability::PredictorMetrics;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{error, info};

const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// State shared by the handlers
///
/// The scheduler writes to the same registry and metrics handles.
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: PredictorMetrics,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: PredictorMetrics) -> Self {
        Self {
            health_registry,
            metrics,
        }
    }
}

/// Liveness of the prediction loop
///
/// A degraded backend or publisher keeps the process alive; only a stalled
/// scheduler or an unhealthy component returns 503.
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
    };

    (status_code, Json(health))
}

/// 503 until the first cycle has finished and while any component is unhealthy
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = match readiness.ready {
        true => StatusCode::OK,
        false => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(readiness))
}

/// Cycle durations, fetch latencies, failure counts and connection state
async fn self_metrics() -> impl IntoResponse {
    match render_self_metrics() {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)], body),
        Err(e) => {
            error!(error = %e, "Failed to encode self-metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)],
                Vec::new(),
            )
        }
    }
}

fn render_self_metrics() -> prometheus::Result<Vec<u8>> {
    let mut body = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut body)?;
    Ok(body)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(self_metrics))
        .with_state(state)
}

/// Serve the health and self-metrics endpoints on all interfaces
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Health and metrics endpoints listening");

    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
