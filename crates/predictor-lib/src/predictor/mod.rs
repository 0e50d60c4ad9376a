//! Prediction pipeline
//!
//! Prepares fetched series, fits a forecasting model per metric and runs
//! the whole sequence once per scheduler tick.

mod cycle;
mod ets;
mod prepare;
mod scheduler;
mod trend;


pub use cycle::PredictionCycle;
pub use ets::EtsForecaster;
pub use prepare::SeriesPreparer;
pub use scheduler::{PredictionScheduler, SchedulerConfig, DEFAULT_PREDICTION_INTERVAL};
pub use trend::LinearTrendForecaster;

use crate::error::PredictionResult;
use crate::models::PreparedSeries;
use serde::Deserialize;
use std::sync::Arc;

/// Number of one-minute steps between the last observation and the forecast
pub const HORIZON_STEPS: usize = 15;

/// Trait for forecasting models
///
/// A model is fitted from scratch on every call; implementations hold no
/// state between cycles.
pub trait Forecaster: Send + Sync {
    /// Point forecast `HORIZON_STEPS` past the last point of `series`
    fn forecast(&self, series: &PreparedSeries) -> PredictionResult<f64>;

    /// Model name for logs
    fn name(&self) -> &str;
}

/// Selectable forecasting model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Automatic exponential smoothing without seasonal components
    #[default]
    Ets,
    /// Least-squares linear trend
    Linear,
}

impl ModelKind {
    pub fn build(self) -> Arc<dyn Forecaster> {
        match self {
            ModelKind::Ets => Arc::new(EtsForecaster::new(HORIZON_STEPS)),
            ModelKind::Linear => Arc::new(LinearTrendForecaster::new(HORIZON_STEPS)),
        }
    }
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ets" => Ok(ModelKind::Ets),
            "linear" => Ok(ModelKind::Linear),
            other => Err(format!("unknown forecasting model '{}'", other)),
        }
    }
}

/// The value of a series whose points are all equal, if it is one
///
/// Fitting such a series is pointless and degenerates for likelihood-based
/// models, so every forecaster returns it directly.
pub(crate) fn constant_value(values: &[f64]) -> Option<f64> {
    let first = *values.first()?;
    values
        .iter()
        .all(|v| (v - first).abs() <= f64::EPSILON * first.abs().max(1.0))
        .then_some(first)
}

#[cfg(test)]
mod model_tests {
    use super::*;

    #[test]
    fn test_model_kind_parsing() {
        assert_eq!("ets".parse::<ModelKind>().unwrap(), ModelKind::Ets);
        assert_eq!(" Linear ".parse::<ModelKind>().unwrap(), ModelKind::Linear);
        assert!("prophet".parse::<ModelKind>().is_err());
        assert_eq!(ModelKind::default(), ModelKind::Ets);
    }

    #[test]
    fn test_model_kind_builds_named_forecaster() {
        assert_eq!(ModelKind::Ets.build().name(), "ets");
        assert_eq!(ModelKind::Linear.build().name(), "linear");
    }

    #[test]
    fn test_constant_value() {
        assert_eq!(constant_value(&[50.0; 20]), Some(50.0));
        assert_eq!(constant_value(&[0.0, 0.0]), Some(0.0));
        assert_eq!(constant_value(&[50.0, 50.1]), None);
        assert_eq!(constant_value(&[]), None);
    }
}
