//! Prometheus Pushgateway sink
//!
//! A `PUT` to `/metrics/job/<job>` replaces every metric of the job group,
//! which gives publishes their last-write-wins semantics.

use super::{async_trait, MetricsPayload, MetricsSink};
use crate::error::{PredictionError, PredictionResult};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP client for a Pushgateway
#[derive(Debug, Clone)]
pub struct PushgatewaySink {
    client: Client,
    base_url: Url,
}

impl PushgatewaySink {
    pub fn new(base_url: &str, timeout: Duration) -> PredictionResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PredictionError::publish(format!("Failed to create HTTP client: {}", e)))?;
        let base_url = Url::parse(base_url)
            .map_err(|e| PredictionError::publish(format!("Invalid sink URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(PredictionError::publish(format!(
                "Sink URL {} cannot carry a path",
                base_url
            )));
        }

        Ok(Self { client, base_url })
    }

    /// URL of the job group, with the job label percent-encoded as one segment
    pub fn job_url(&self, job: &str) -> PredictionResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PredictionError::publish("Sink URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["metrics", "job", job]);
        Ok(url)
    }
}

#[async_trait]
impl MetricsSink for PushgatewaySink {
    async fn push(&self, job: &str, payload: MetricsPayload) -> PredictionResult<()> {
        let url = self.job_url(job)?;

        let response = self
            .client
            .put(url.clone())
            .header(CONTENT_TYPE, payload.content_type)
            .body(payload.body)
            .send()
            .await
            .map_err(|e| PredictionError::publish(format!("Push to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PredictionError::publish(format!(
                "Sink error ({}): {}",
                status,
                body.trim()
            )));
        }

        debug!(url = %url, status = %status, "Pushed metrics");
        Ok(())
    }
}
