//! Series preparation
//!
//! Turns raw backend samples into a [`PreparedSeries`]: values are coerced
//! to numbers, averaged into fixed-width buckets aligned to the Unix epoch,
//! and gaps are filled by linear interpolation. Boundary gaps take the
//! nearest known value; nothing is extrapolated.

use crate::error::{DataStage, PredictionError, PredictionResult};
use crate::models::{PreparedSeries, RawSample, SeriesPoint, MIN_SAMPLES, STEP_SECS};
use chrono::{DateTime, Utc};

/// Upper bound on grid buckets, well above a one-hour window at any sane step
const MAX_GRID_POINTS: i64 = 100_000;

/// Resamples and gap-fills raw samples
#[derive(Debug, Clone)]
pub struct SeriesPreparer {
    step_secs: i64,
    min_samples: usize,
}

impl Default for SeriesPreparer {
    fn default() -> Self {
        Self::new(STEP_SECS, MIN_SAMPLES)
    }
}

impl SeriesPreparer {
    pub fn new(step_secs: i64, min_samples: usize) -> Self {
        Self {
            step_secs: step_secs.max(1),
            min_samples,
        }
    }

    pub fn prepare(&self, samples: &[RawSample]) -> PredictionResult<PreparedSeries> {
        let bucketed: Vec<(i64, Option<f64>)> = samples
            .iter()
            .filter_map(|s| Some((self.bucket_of(s.timestamp)?, s.numeric_value())))
            .collect();

        let (first, last) = match (
            bucketed.iter().map(|(b, _)| *b).min(),
            bucketed.iter().map(|(b, _)| *b).max(),
        ) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(self.insufficient(0)),
        };

        let len = last
            .checked_sub(first)
            .map(|span| span / self.step_secs + 1)
            .filter(|len| *len <= MAX_GRID_POINTS)
            .ok_or_else(|| {
                PredictionError::backend(format!(
                    "Samples span {}..{}, more than {} buckets of {}s",
                    first, last, MAX_GRID_POINTS, self.step_secs
                ))
            })?;

        let mut sums = vec![0.0; len as usize];
        let mut counts = vec![0usize; len as usize];
        for (bucket, value) in &bucketed {
            if let Some(v) = value {
                let idx = ((bucket - first) / self.step_secs) as usize;
                sums[idx] += v;
                counts[idx] += 1;
            }
        }

        let grid: Vec<Option<f64>> = sums
            .iter()
            .zip(&counts)
            .map(|(sum, &count)| (count > 0).then(|| sum / count as f64))
            .collect();

        let points: Vec<SeriesPoint> = interpolate(&grid)
            .into_iter()
            .enumerate()
            .filter_map(|(i, value)| {
                value.map(|value| SeriesPoint {
                    timestamp: first + i as i64 * self.step_secs,
                    value,
                })
            })
            .collect();

        if points.len() < self.min_samples {
            return Err(self.insufficient(points.len()));
        }

        Ok(PreparedSeries::new(points))
    }

    /// Start of the bucket holding `timestamp`, `None` when it is not a
    /// representable instant
    fn bucket_of(&self, timestamp: f64) -> Option<i64> {
        let secs = timestamp.floor();
        let min = DateTime::<Utc>::MIN_UTC.timestamp() as f64;
        let max = DateTime::<Utc>::MAX_UTC.timestamp() as f64;
        if !(min..=max).contains(&secs) {
            return None;
        }
        (secs as i64)
            .div_euclid(self.step_secs)
            .checked_mul(self.step_secs)
    }

    fn insufficient(&self, found: usize) -> PredictionError {
        PredictionError::insufficient(DataStage::Prepare, found, self.min_samples)
    }
}

/// Fill missing values linearly between known neighbours
///
/// Leading and trailing gaps take the first and last known value. A grid
/// without any known value is returned unchanged.
fn interpolate(grid: &[Option<f64>]) -> Vec<Option<f64>> {
    let known: Vec<(usize, f64)> = grid
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .collect();

    if known.is_empty() {
        return grid.to_vec();
    }

    let mut filled = Vec::with_capacity(grid.len());
    let mut next = 0;
    for (i, value) in grid.iter().enumerate() {
        if let Some(v) = value {
            filled.push(Some(*v));
            continue;
        }
        while next < known.len() && known[next].0 < i {
            next += 1;
        }
        let before = next.checked_sub(1).map(|k| known[k]);
        let after = known.get(next).copied();
        let v = match (before, after) {
            (Some((i0, v0)), Some((i1, v1))) => {
                v0 + (v1 - v0) * (i - i0) as f64 / (i1 - i0) as f64
            }
            (Some((_, v0)), None) => v0,
            (None, Some((_, v1))) => v1,
            (None, None) => continue,
        };
        filled.push(Some(v));
    }
    filled
}
