//! Core data models for the resource predictor

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sampling step of both the backend query and the prepared series
pub const STEP_SECS: i64 = 60;

/// Length of the look-back window queried every cycle
pub const WINDOW_SECS: i64 = 60 * 60;

/// Minimum number of observations before a series may be modeled
pub const MIN_SAMPLES: usize = 10;

/// Value published for a metric whose forecast failed
pub const SENTINEL_VALUE: f64 = 0.0;

/// Gauge name of a metric's published forecast
pub fn gauge_name(metric: &str) -> String {
    format!("{}_percentage_predicted_in_15_min", metric)
}

/// Help text of a metric's published forecast
pub fn gauge_help(metric: &str) -> String {
    format!("Predicted {} usage % in next 15 minutes.", metric)
}

/// A metric to forecast: a short name plus the backend expression producing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    pub query: String,
}

impl MetricSpec {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
        }
    }

    /// Name of the gauge this metric is published under
    pub fn gauge_name(&self) -> String {
        gauge_name(&self.name)
    }

    /// Help text of the published gauge
    pub fn gauge_help(&self) -> String {
        gauge_help(&self.name)
    }

    /// Disk, CPU and memory usage percentages of a Windows host exporter
    pub fn default_set() -> Vec<MetricSpec> {
        vec![
            MetricSpec::new(
                "disk",
                r#"100 * (1 - (windows_logical_disk_free_bytes{volume="C:"} / windows_logical_disk_size_bytes{volume="C:"}))"#,
            ),
            MetricSpec::new(
                "cpu",
                r#"100 * (1 - avg(rate(windows_cpu_time_total{mode="idle"}[1m])))"#,
            ),
            MetricSpec::new(
                "memory",
                "100 * (1 - (windows_memory_available_bytes / windows_memory_physical_total_bytes))",
            ),
        ]
    }
}

/// A single raw sample as returned by the backend
///
/// The value is kept as the backend's text so that coercion to a number
/// happens in one place, the series preparer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Unix timestamp in (fractional) seconds
    pub timestamp: f64,
    pub value: String,
}

impl RawSample {
    pub fn new(timestamp: f64, value: impl Into<String>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }

    /// Numeric value, or `None` when the value is not a finite number
    pub fn numeric_value(&self) -> Option<f64> {
        self.value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }
}

/// The time window shared by every metric of one prediction cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step_secs: i64,
}

impl QueryWindow {
    /// The `[now - 1h, now]` window at the standard 60s step
    pub fn ending_at(end: DateTime<Utc>) -> Self {
        Self {
            start: end - Duration::seconds(WINDOW_SECS),
            end,
            step_secs: STEP_SECS,
        }
    }
}

/// A point of a prepared series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    /// Unix timestamp in seconds, a multiple of the series step
    pub timestamp: i64,
    pub value: f64,
}

/// A uniformly spaced, gap-free series ready to be modeled
///
/// Only the series preparer constructs one, which guarantees the step
/// spacing, the absence of missing values and the minimum length.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSeries {
    points: Vec<SeriesPoint>,
}

impl PreparedSeries {
    pub(crate) fn new(points: Vec<SeriesPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Forecast of one metric for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastResult {
    /// Clamped usage percentage, or the sentinel when the forecast failed
    pub value: f64,
    /// Whether `value` is a real forecast rather than the sentinel
    pub computed: bool,
}

impl ForecastResult {
    pub fn computed(value: f64) -> Self {
        Self {
            value: value.clamp(0.0, 100.0),
            computed: true,
        }
    }

    pub fn failed() -> Self {
        Self {
            value: SENTINEL_VALUE,
            computed: false,
        }
    }
}

/// The complete result set of one prediction cycle
///
/// Contains an entry for every configured metric; a failed metric holds
/// the sentinel rather than being omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PredictionOutcome {
    pub generated_at: i64,
    results: BTreeMap<String, ForecastResult>,
}

impl PredictionOutcome {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at: generated_at.timestamp(),
            results: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, metric: impl Into<String>, result: ForecastResult) {
        self.results.insert(metric.into(), result);
    }

    pub fn get(&self, metric: &str) -> Option<&ForecastResult> {
        self.results.get(metric)
    }

    /// Forecast value of a metric, the sentinel if it is unknown
    pub fn value(&self, metric: &str) -> f64 {
        self.get(metric).map(|r| r.value).unwrap_or(SENTINEL_VALUE)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ForecastResult)> {
        self.results.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of metrics whose forecast fell back to the sentinel
    pub fn failed_count(&self) -> usize {
        self.results.values().filter(|r| !r.computed).count()
    }
}
