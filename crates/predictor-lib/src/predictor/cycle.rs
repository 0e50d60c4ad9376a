//! One multi-metric prediction cycle
//!
//! Every configured metric goes through fetch, prepare and forecast on its
//! own. A failure at any step is logged and replaced by the sentinel, so
//! the outcome always holds exactly the configured metrics.
//!
//! Preparation and model fitting run on the blocking pool; a panic there
//! fails only the metric being modeled.

use super::{Forecaster, SeriesPreparer};
use crate::error::{PredictionError, PredictionResult};
use crate::fetcher::{SeriesFetcher, SeriesSource};
use crate::models::{ForecastResult, MetricSpec, PredictionOutcome, QueryWindow};
use crate::observability::{PredictorMetrics, StructuredLogger};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Fetch, prepare and forecast for a fixed set of metrics
pub struct PredictionCycle {
    specs: Vec<MetricSpec>,
    fetcher: SeriesFetcher,
    preparer: SeriesPreparer,
    forecaster: Arc<dyn Forecaster>,
    metrics: PredictorMetrics,
    logger: StructuredLogger,
}

/// Successful prediction of one metric before clamping
struct MetricForecast {
    value: f64,
    samples: usize,
}

impl PredictionCycle {
    /// Metric names must be unique; a repeated name keeps its first spec
    pub fn new(
        specs: Vec<MetricSpec>,
        source: Arc<dyn SeriesSource>,
        forecaster: Arc<dyn Forecaster>,
        logger: StructuredLogger,
    ) -> Self {
        let mut seen = HashSet::new();
        let specs = specs
            .into_iter()
            .filter(|spec| {
                let first = seen.insert(spec.name.clone());
                if !first {
                    warn!(metric = %spec.name, query = %spec.query, "Ignoring duplicate metric name");
                }
                first
            })
            .collect();

        Self {
            specs,
            fetcher: SeriesFetcher::new(source),
            preparer: SeriesPreparer::default(),
            forecaster,
            metrics: PredictorMetrics::new(),
            logger,
        }
    }

    pub fn specs(&self) -> &[MetricSpec] {
        &self.specs
    }

    /// Run the cycle for a window ending at `now`
    ///
    /// Never fails; failed metrics carry the sentinel value.
    pub async fn run(&self, now: DateTime<Utc>) -> PredictionOutcome {
        let start = Instant::now();
        let window = QueryWindow::ending_at(now);
        let mut outcome = PredictionOutcome::new(now);

        self.logger.log_cycle_start(self.specs.len());

        for spec in &self.specs {
            let result = match self.predict_metric(spec, &window).await {
                Ok(forecast) => {
                    let result = ForecastResult::computed(forecast.value);
                    self.logger.log_forecast(
                        &spec.name,
                        forecast.value,
                        result.value,
                        forecast.samples,
                        self.forecaster.name(),
                    );
                    self.metrics.record_forecast(&spec.name, result.value);
                    result
                }
                Err(e) => {
                    self.logger.log_forecast_failure(&spec.name, &e);
                    self.metrics.record_failure(&spec.name, e.kind());
                    ForecastResult::failed()
                }
            };
            outcome.insert(spec.name.clone(), result);
        }

        let elapsed = start.elapsed();
        self.metrics.observe_cycle_duration(elapsed.as_secs_f64());
        self.logger
            .log_cycle_complete(outcome.len(), outcome.failed_count(), elapsed.as_millis());

        outcome
    }

    async fn predict_metric(
        &self,
        spec: &MetricSpec,
        window: &QueryWindow,
    ) -> PredictionResult<MetricForecast> {
        let fetch_start = Instant::now();
        let fetched = self.fetcher.fetch(&spec.query, window).await;
        self.metrics
            .observe_fetch_latency(&spec.name, fetch_start.elapsed().as_secs_f64());
        let raw = fetched?;

        let raw_samples = raw.len();
        let preparer = self.preparer.clone();
        let forecaster = Arc::clone(&self.forecaster);
        let model = forecaster.name().to_string();

        let forecast = tokio::task::spawn_blocking(move || -> PredictionResult<MetricForecast> {
            let series = preparer.prepare(&raw)?;
            let value = forecaster.forecast(&series)?;
            Ok(MetricForecast {
                value,
                samples: series.len(),
            })
        })
        .await
        .map_err(|e| PredictionError::model_fit(&model, format!("model task failed: {}", e)))??;

        if !forecast.value.is_finite() {
            return Err(PredictionError::model_fit(
                &model,
                format!("prediction is not finite: {}", forecast.value),
            ));
        }

        debug!(
            metric = %spec.name,
            raw_samples = raw_samples,
            prepared_samples = forecast.samples,
            "Series modeled"
        );
        Ok(forecast)
    }
}
