//! Prometheus HTTP API client
//!
//! Speaks the `/api/v1/query` and `/api/v1/query_range` endpoints and
//! converts matrix answers into [`RangeSeries`].

use super::{async_trait, RangeSeries, SeriesSource};
use crate::error::{PredictionError, PredictionResult};
use crate::models::{QueryWindow, RawSample};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default HTTP request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Envelope shared by every Prometheus API answer
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: String,
    data: Option<T>,
    #[serde(rename = "errorType")]
    error_type: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MatrixData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: Vec<MatrixSeries>,
}

#[derive(Debug, Deserialize)]
struct MatrixSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

/// Client for a Prometheus-compatible query API
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    client: Client,
    base_url: Url,
}

impl PrometheusClient {
    /// Create a client for the API rooted at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> PredictionResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PredictionError::connectivity(format!("Failed to create HTTP client: {}", e)))?;

        let mut base_url = Url::parse(base_url)
            .map_err(|e| PredictionError::backend(format!("Invalid backend URL {}: {}", base_url, e)))?;
        // Url::join drops the last path segment unless it ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> PredictionResult<T> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| PredictionError::backend(format!("Invalid path {}: {}", path, e)))?;

        let response = self.client.get(url).query(params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        // Prometheus reports query errors as JSON even on 4xx/5xx
        let parsed: Result<ApiResponse<T>, _> = serde_json::from_str(&body);
        match parsed {
            Ok(api) if api.status == "success" && status.is_success() => api
                .data
                .ok_or_else(|| PredictionError::backend("Response has no data")),
            Ok(api) => Err(PredictionError::backend(format!(
                "{} ({}): {}",
                api.error_type.unwrap_or_else(|| "error".to_string()),
                status,
                api.error.unwrap_or_default()
            ))),
            Err(e) if status.is_success() => Err(PredictionError::backend(format!(
                "Failed to parse response: {}",
                e
            ))),
            Err(_) => Err(PredictionError::backend(format!(
                "HTTP {}: {}",
                status,
                body.trim()
            ))),
        }
    }
}

/// Unix seconds with millisecond precision, as the query API expects
fn format_timestamp(ts: DateTime<Utc>) -> String {
    format!("{:.3}", ts.timestamp_millis() as f64 / 1000.0)
}

#[async_trait]
impl SeriesSource for PrometheusClient {
    async fn query_range(
        &self,
        query: &str,
        window: &QueryWindow,
    ) -> PredictionResult<Vec<RangeSeries>> {
        let params = [
            ("query", query.to_string()),
            ("start", format_timestamp(window.start)),
            ("end", format_timestamp(window.end)),
            ("step", format!("{}s", window.step_secs)),
        ];

        let data: MatrixData = self.get("api/v1/query_range", &params).await?;
        if data.result_type != "matrix" {
            return Err(PredictionError::backend(format!(
                "Unexpected result type '{}' for range query",
                data.result_type
            )));
        }

        debug!(series = data.result.len(), "Range query answered");

        Ok(data
            .result
            .into_iter()
            .map(|s| RangeSeries {
                labels: s.metric,
                samples: s
                    .values
                    .into_iter()
                    .map(|(ts, value)| RawSample::new(ts, value))
                    .collect(),
            })
            .collect())
    }

    async fn probe(&self) -> PredictionResult<()> {
        let _: serde_json::Value = self
            .get("api/v1/query", &[("query", "up".to_string())])
            .await?;
        Ok(())
    }
}
