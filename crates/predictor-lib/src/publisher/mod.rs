//! Publishing of cycle outcomes to the metrics sink
//!
//! Each publish renders the outcome into a fresh registry, one gauge per
//! metric, and replaces everything the sink holds for the job.

mod pushgateway;

pub use pushgateway::PushgatewaySink;

use crate::error::{PredictionError, PredictionResult};
use crate::models::{gauge_help, gauge_name, PredictionOutcome};
use crate::observability::{PredictorMetrics, StructuredLogger};
use prometheus::{Encoder, Gauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

pub use async_trait::async_trait;

/// A rendered set of gauges ready to be pushed
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsPayload {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Trait for push-based metrics sinks
///
/// A push replaces every value previously stored for `job`.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn push(&self, job: &str, payload: MetricsPayload) -> PredictionResult<()>;
}

/// Pushes prediction outcomes under a job label
pub struct ResultPublisher {
    sink: Arc<dyn MetricsSink>,
    job: String,
    metrics: PredictorMetrics,
    logger: StructuredLogger,
}

impl ResultPublisher {
    pub fn new(sink: Arc<dyn MetricsSink>, job: impl Into<String>, logger: StructuredLogger) -> Self {
        Self {
            sink,
            job: job.into(),
            metrics: PredictorMetrics::new(),
            logger,
        }
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    /// Push the outcome, logging and swallowing any failure
    ///
    /// Returns whether the push succeeded; the next cycle simply tries again.
    pub async fn publish(&self, outcome: PredictionOutcome) -> bool {
        match self.try_publish(outcome).await {
            Ok(count) => {
                self.logger.log_published(count);
                true
            }
            Err(e) => {
                self.metrics.inc_publish_failures();
                self.logger.log_publish_failure(&e);
                false
            }
        }
    }

    /// Push the outcome, returning the number of gauges sent
    ///
    /// An empty outcome is not pushed, since that would wipe the job group.
    pub async fn try_publish(&self, outcome: PredictionOutcome) -> PredictionResult<usize> {
        if outcome.is_empty() {
            return Ok(0);
        }
        let payload = render(&outcome)?;
        self.sink.push(&self.job, payload).await?;
        Ok(outcome.len())
    }
}

/// Render an outcome in the Prometheus text exposition format
pub fn render(outcome: &PredictionOutcome) -> PredictionResult<MetricsPayload> {
    let registry = Registry::new();

    for (metric, result) in outcome.iter() {
        let gauge = Gauge::with_opts(Opts::new(gauge_name(metric), gauge_help(metric)))
            .map_err(|e| PredictionError::publish(format!("Invalid gauge for {}: {}", metric, e)))?;
        gauge.set(result.value);
        registry
            .register(Box::new(gauge))
            .map_err(|e| PredictionError::publish(format!("Failed to register {}: {}", metric, e)))?;
    }

    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    encoder
        .encode(&registry.gather(), &mut body)
        .map_err(|e| PredictionError::publish(format!("Failed to encode gauges: {}", e)))?;

    Ok(MetricsPayload {
        content_type: encoder.format_type().to_string(),
        body,
    })
}
