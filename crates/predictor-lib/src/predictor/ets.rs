//! Exponential smoothing model
//!
//! Uses `augurs` AutoETS without seasonal components. Error, trend and
//! damping are selected automatically on every fit.

use super::{constant_value, Forecaster};
use crate::error::{PredictionError, PredictionResult};
use crate::models::PreparedSeries;
use augurs::ets::AutoETS;
use augurs::prelude::*;

/// Non-seasonal AutoETS forecaster
#[derive(Debug, Clone)]
pub struct EtsForecaster {
    horizon: usize,
}

impl EtsForecaster {
    pub fn new(horizon: usize) -> Self {
        Self {
            horizon: horizon.max(1),
        }
    }
}

impl Forecaster for EtsForecaster {
    fn forecast(&self, series: &PreparedSeries) -> PredictionResult<f64> {
        if series.is_empty() {
            return Err(PredictionError::model_fit(self.name(), "empty series"));
        }
        let values = series.values();
        if let Some(v) = constant_value(&values) {
            return Ok(v);
        }

        let model = AutoETS::non_seasonal()
            .fit(&values)
            .map_err(|e| PredictionError::model_fit(self.name(), format!("fit: {}", e)))?;
        let forecast = model
            .predict(self.horizon, 0.95)
            .map_err(|e| PredictionError::model_fit(self.name(), format!("predict: {}", e)))?;

        match forecast.point.last().copied() {
            Some(v) if v.is_finite() => Ok(v),
            Some(v) => Err(PredictionError::model_fit(
                self.name(),
                format!("prediction is not finite: {}", v),
            )),
            None => Err(PredictionError::model_fit(self.name(), "empty forecast")),
        }
    }

    fn name(&self) -> &str {
        "ets"
    }
}
