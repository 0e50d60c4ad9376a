//! Least-squares linear trend model

use super::{constant_value, Forecaster};
use crate::error::{PredictionError, PredictionResult};
use crate::models::PreparedSeries;

/// Fits `value = intercept + slope * index` and evaluates it past the end
#[derive(Debug, Clone)]
pub struct LinearTrendForecaster {
    horizon: usize,
}

impl LinearTrendForecaster {
    pub fn new(horizon: usize) -> Self {
        Self { horizon }
    }
}

impl Forecaster for LinearTrendForecaster {
    fn forecast(&self, series: &PreparedSeries) -> PredictionResult<f64> {
        let values = series.values();
        if values.len() < 2 {
            return Err(PredictionError::model_fit(
                self.name(),
                format!("need at least 2 points, got {}", values.len()),
            ));
        }
        if let Some(v) = constant_value(&values) {
            return Ok(v);
        }

        let (intercept, slope) = linear_fit(&values);
        let x = (values.len() - 1 + self.horizon) as f64;
        let prediction = intercept + slope * x;

        if !prediction.is_finite() {
            return Err(PredictionError::model_fit(
                self.name(),
                "prediction is not finite",
            ));
        }
        Ok(prediction)
    }

    fn name(&self) -> &str {
        "linear"
    }
}

/// Ordinary least squares over the point index, returns (intercept, slope)
fn linear_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let (sxy, sxx) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sxy, sxx), (i, y)| {
            let dx = i as f64 - mean_x;
            (sxy + dx * (y - mean_y), sxx + dx * dx)
        });

    if sxx.abs() < f64::EPSILON {
        return (mean_y, 0.0);
    }
    let slope = sxy / sxx;
    (mean_y - slope * mean_x, slope)
}
