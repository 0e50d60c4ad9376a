//! Observability infrastructure for the resource predictor
//!
//! Provides:
//! - Prometheus self-metrics (cycle duration, fetch latency, failures by kind,
//!   last forecast per metric, backend connection state)
//! - Structured JSON logging of domain events with tracing

use crate::error::PredictionError;
use prometheus::{
    register_gauge_vec, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge, GaugeVec, Histogram, HistogramVec, IntCounter,
    IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for backend round trips (in seconds)
const FETCH_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Histogram buckets for whole cycles (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PredictorMetricsInner> = OnceLock::new();

struct PredictorMetricsInner {
    cycle_duration_seconds: Histogram,
    fetch_latency_seconds: HistogramVec,
    cycles_total: IntCounter,
    forecasts_total: IntCounterVec,
    metric_failures_total: IntCounterVec,
    publish_failures_total: IntCounter,
    last_forecast_percent: GaugeVec,
    backend_connection_state: IntGauge,
}

impl PredictorMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "resource_predictor_cycle_duration_seconds",
                "Time spent running one multi-metric prediction cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            fetch_latency_seconds: register_histogram_vec!(
                "resource_predictor_fetch_latency_seconds",
                "Time spent querying the backend for one metric",
                &["metric"],
                FETCH_BUCKETS.to_vec()
            )
            .expect("Failed to register fetch_latency_seconds"),

            cycles_total: register_int_counter!(
                "resource_predictor_cycles_total",
                "Total number of prediction cycles run"
            )
            .expect("Failed to register cycles_total"),

            forecasts_total: register_int_counter_vec!(
                "resource_predictor_forecasts_total",
                "Total number of forecasts computed",
                &["metric"]
            )
            .expect("Failed to register forecasts_total"),

            metric_failures_total: register_int_counter_vec!(
                "resource_predictor_metric_failures_total",
                "Total number of per-metric failures replaced by the sentinel",
                &["metric", "kind"]
            )
            .expect("Failed to register metric_failures_total"),

            publish_failures_total: register_int_counter!(
                "resource_predictor_publish_failures_total",
                "Total number of failed pushes to the metrics sink"
            )
            .expect("Failed to register publish_failures_total"),

            last_forecast_percent: register_gauge_vec!(
                "resource_predictor_last_forecast_percent",
                "Most recent published forecast per metric",
                &["metric"]
            )
            .expect("Failed to register last_forecast_percent"),

            backend_connection_state: register_int_gauge!(
                "resource_predictor_backend_connection_state",
                "Backend connection state (0 disconnected, 1 connecting, 2 connected, 3 degraded)"
            )
            .expect("Failed to register backend_connection_state"),
        }
    }
}

/// Predictor self-metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct PredictorMetrics {
    _private: (),
}

impl Default for PredictorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PredictorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PredictorMetricsInner {
        GLOBAL_METRICS.get_or_init(PredictorMetricsInner::new)
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
        self.inner().cycles_total.inc();
    }

    pub fn observe_fetch_latency(&self, metric: &str, duration_secs: f64) {
        self.inner()
            .fetch_latency_seconds
            .with_label_values(&[metric])
            .observe(duration_secs);
    }

    pub fn record_forecast(&self, metric: &str, value: f64) {
        self.inner().forecasts_total.with_label_values(&[metric]).inc();
        self.inner()
            .last_forecast_percent
            .with_label_values(&[metric])
            .set(value);
    }

    pub fn record_failure(&self, metric: &str, kind: &str) {
        self.inner()
            .metric_failures_total
            .with_label_values(&[metric, kind])
            .inc();
        self.inner()
            .last_forecast_percent
            .with_label_values(&[metric])
            .set(crate::models::SENTINEL_VALUE);
    }

    pub fn inc_publish_failures(&self) {
        self.inner().publish_failures_total.inc();
    }

    pub fn set_connection_state(&self, state: i64) {
        self.inner().backend_connection_state.set(state);
    }

    pub fn failures(&self, metric: &str, kind: &str) -> u64 {
        self.inner()
            .metric_failures_total
            .with_label_values(&[metric, kind])
            .get()
    }
}

/// Structured logger for predictor events
#[derive(Clone)]
pub struct StructuredLogger {
    job: String,
}

impl StructuredLogger {
    pub fn new(job: impl Into<String>) -> Self {
        Self { job: job.into() }
    }

    pub fn log_startup(&self, version: &str, model: &str, metrics: usize) {
        info!(
            event = "predictor_started",
            job = %self.job,
            version = %version,
            model = %model,
            metrics = metrics,
            "Resource predictor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "predictor_shutdown",
            job = %self.job,
            reason = %reason,
            "Resource predictor shutting down"
        );
    }

    pub fn log_cycle_start(&self, metrics: usize) {
        info!(
            event = "cycle_started",
            job = %self.job,
            metrics = metrics,
            "Running multi-metric prediction cycle"
        );
    }

    pub fn log_forecast(&self, metric: &str, raw: f64, clamped: f64, samples: usize, model: &str) {
        info!(
            event = "forecast_generated",
            job = %self.job,
            metric = %metric,
            raw_prediction = raw,
            prediction = %format!("{:.2}", clamped),
            samples = samples,
            model = %model,
            "{} predicted: {:.2}%",
            metric,
            clamped
        );
    }

    /// Insufficient data is expected while a host warms up and logs as a
    /// warning; every other failure logs as an error.
    pub fn log_forecast_failure(&self, metric: &str, err: &PredictionError) {
        if err.is_insufficient_data() {
            warn!(
                event = "forecast_failed",
                job = %self.job,
                metric = %metric,
                kind = err.kind(),
                error = %err,
                "{}: not enough data, publishing 0",
                metric
            );
        } else {
            error!(
                event = "forecast_failed",
                job = %self.job,
                metric = %metric,
                kind = err.kind(),
                error = %err,
                "Error predicting {}, publishing 0",
                metric
            );
        }
    }

    pub fn log_cycle_complete(&self, metrics: usize, failed: usize, duration_ms: u128) {
        info!(
            event = "cycle_completed",
            job = %self.job,
            metrics = metrics,
            failed = failed,
            duration_ms = duration_ms as u64,
            "Prediction cycle complete"
        );
    }

    pub fn log_published(&self, metrics: usize) {
        info!(
            event = "predictions_published",
            job = %self.job,
            metrics = metrics,
            "Pushed predictions to metrics sink"
        );
    }

    pub fn log_publish_failure(&self, err: &PredictionError) {
        error!(
            event = "publish_failed",
            job = %self.job,
            kind = err.kind(),
            error = %err,
            "Failed to push predictions to metrics sink"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predictor_metrics_creation() {
        let metrics = PredictorMetrics::new();

        metrics.observe_cycle_duration(0.5);
        metrics.observe_fetch_latency("disk", 0.01);
        metrics.record_forecast("disk", 42.0);
        metrics.inc_publish_failures();
        metrics.set_connection_state(2);
    }

    #[test]
    fn test_failure_counter_by_kind() {
        let metrics = PredictorMetrics::new();
        let before = metrics.failures("observability-test", "model_fit");

        metrics.record_failure("observability-test", "model_fit");
        metrics.record_failure("observability-test", "model_fit");

        assert_eq!(metrics.failures("observability-test", "model_fit"), before + 2);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("predictor");
        assert_eq!(logger.job, "predictor");
    }
}
