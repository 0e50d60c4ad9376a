//! Integration tests for the predictor API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use predictor_lib::{
    api::{create_router, AppState},
    health::{components, ComponentHealth, HealthRegistry},
    observability::PredictorMetrics,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new(Duration::from_secs(360));
    health_registry.register(components::BACKEND).await;
    health_registry.register(components::FORECASTER).await;
    health_registry.register(components::PUBLISHER).await;

    let metrics = PredictorMetrics::new();
    let state = Arc::new(AppState::new(health_registry, metrics));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["cycles_completed"], 0);
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    // Unreachable backend still leaves the process alive
    state
        .health_registry
        .set_degraded(components::BACKEND, "Backend unreachable")
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["backend"]["message"],
        "Backend unreachable"
    );
}

#[tokio::test]
async fn test_healthz_returns_503_when_scheduler_stalled() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .record_cycle_at(chrono::Utc::now().timestamp() - 3600)
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
    assert!(health["components"]["scheduler"].is_object());
}

#[tokio::test]
async fn test_readyz_returns_503_before_first_cycle() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_after_cycle() {
    let (app, state) = setup_test_app().await;

    state.health_registry.record_cycle().await;

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_returns_503_when_cycled_but_unhealthy() {
    let (app, state) = setup_test_app().await;

    state.health_registry.record_cycle().await;
    state
        .health_registry
        .update(components::PUBLISHER, ComponentHealth::unhealthy("Failed"))
        .await;

    let (status, _body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;

    state.metrics.observe_cycle_duration(0.25);
    state.metrics.observe_fetch_latency("disk", 0.01);
    state.metrics.record_forecast("disk", 42.0);
    state.metrics.record_failure("cpu", "insufficient_data");
    state.metrics.set_connection_state(2);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("resource_predictor_cycle_duration_seconds_bucket"));
    assert!(metrics_text.contains("resource_predictor_cycle_duration_seconds_count"));
    assert!(metrics_text.contains("resource_predictor_fetch_latency_seconds"));
    assert!(metrics_text.contains("resource_predictor_cycles_total"));
    assert!(metrics_text.contains("resource_predictor_last_forecast_percent{metric=\"disk\"} 42"));
    assert!(metrics_text.contains("resource_predictor_metric_failures_total{"));
    assert!(metrics_text.contains("kind=\"insufficient_data\""));
    assert!(metrics_text.contains("resource_predictor_backend_connection_state 2"));
}

#[tokio::test]
async fn test_healthz_includes_component_details() {
    let (app, _state) = setup_test_app().await;

    let (_status, body) = get(app, "/healthz").await;
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert!(health["components"].is_object());
    assert!(health["components"]["backend"].is_object());
    assert!(health["components"]["forecaster"].is_object());
    assert!(health["components"]["publisher"].is_object());
}
