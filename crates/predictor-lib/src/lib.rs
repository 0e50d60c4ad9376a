//! Resource usage predictor library
//!
//! This crate provides the core functionality for:
//! - Ranged queries against a Prometheus-compatible backend
//! - Resampling and gap filling of the fetched series
//! - Per-metric usage forecasts 15 minutes ahead
//! - Publishing forecasts to a Pushgateway
//! - Health checks and observability

pub mod api;
pub mod error;
pub mod fetcher;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod publisher;

pub use error::{PredictionError, PredictionResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{PredictorMetrics, StructuredLogger};
