//! Time-series retrieval from the query backend
//!
//! A [`SeriesSource`] answers ranged queries; the [`BackendConnection`]
//! gates a source behind the startup connection state machine and the
//! [`SeriesFetcher`] turns an answer into raw samples or an
//! insufficient-data error.

mod connection;
mod prometheus_api;

pub use connection::{BackendConnection, ConnectConfig, ConnectionState};
pub use prometheus_api::{PrometheusClient, DEFAULT_REQUEST_TIMEOUT};

use crate::error::{DataStage, PredictionError, PredictionResult};
use crate::models::{QueryWindow, RawSample, MIN_SAMPLES};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use async_trait::async_trait;

/// One series of a ranged query answer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeSeries {
    pub labels: BTreeMap<String, String>,
    pub samples: Vec<RawSample>,
}

/// Trait for backends answering ranged time-series queries
#[async_trait]
pub trait SeriesSource: Send + Sync {
    /// Evaluate `query` over `window`, returning every matching series
    async fn query_range(
        &self,
        query: &str,
        window: &QueryWindow,
    ) -> PredictionResult<Vec<RangeSeries>>;

    /// Cheap request proving the backend is reachable
    async fn probe(&self) -> PredictionResult<()>;
}

/// Fetches the raw samples of one metric for a cycle's window
pub struct SeriesFetcher {
    source: Arc<dyn SeriesSource>,
    min_samples: usize,
}

impl SeriesFetcher {
    pub fn new(source: Arc<dyn SeriesSource>) -> Self {
        Self {
            source,
            min_samples: MIN_SAMPLES,
        }
    }

    /// Raw samples of the first series matching `query`
    ///
    /// Fails with `InsufficientData` when the backend has no series or the
    /// first one holds fewer than the minimum number of samples. Backend
    /// and connectivity errors are passed through unchanged.
    pub async fn fetch(&self, query: &str, window: &QueryWindow) -> PredictionResult<Vec<RawSample>> {
        let series = self.source.query_range(query, window).await?;

        let samples = series
            .into_iter()
            .next()
            .map(|s| s.samples)
            .unwrap_or_default();

        if samples.len() < self.min_samples {
            return Err(PredictionError::insufficient(
                DataStage::Fetch,
                samples.len(),
                self.min_samples,
            ));
        }

        Ok(samples)
    }
}
