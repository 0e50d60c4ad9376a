//! Predictor configuration

use anyhow::{anyhow, Context, Result};
use predictor_lib::fetcher::{ConnectConfig, DEFAULT_REQUEST_TIMEOUT};
use predictor_lib::predictor::{ModelKind, SchedulerConfig, DEFAULT_PREDICTION_INTERVAL};
use serde::Deserialize;
use std::time::Duration;

/// Predictor configuration, read from the environment
#[derive(Debug, Clone, Deserialize)]
pub struct PredictorConfig {
    /// Query backend endpoint
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    /// Pushgateway endpoint
    #[serde(default = "default_pushgateway_url")]
    pub pushgateway_url: String,

    /// Job label the forecasts are published under
    #[serde(default = "default_job")]
    pub predictor_job: String,

    #[serde(default = "default_interval")]
    pub predictor_interval_secs: u64,

    #[serde(default = "default_startup_delay")]
    pub predictor_startup_delay_secs: u64,

    #[serde(default = "default_connect_attempts")]
    pub predictor_connect_attempts: u32,

    #[serde(default = "default_connect_backoff")]
    pub predictor_connect_backoff_secs: u64,

    /// 0 disables reconnection while degraded
    #[serde(default = "default_reconnect_interval")]
    pub predictor_reconnect_interval_secs: u64,

    /// Forecasting model, `ets` or `linear`
    #[serde(default = "default_model")]
    pub predictor_model: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub predictor_api_port: u16,

    #[serde(default = "default_request_timeout")]
    pub predictor_request_timeout_secs: u64,
}

fn default_prometheus_url() -> String {
    "http://prometheus:9090".to_string()
}

fn default_pushgateway_url() -> String {
    "http://pushgateway:9091".to_string()
}

fn default_job() -> String {
    "predictor".to_string()
}

fn default_interval() -> u64 {
    DEFAULT_PREDICTION_INTERVAL.as_secs()
}

fn default_startup_delay() -> u64 {
    10
}

fn default_connect_attempts() -> u32 {
    5
}

fn default_connect_backoff() -> u64 {
    5
}

fn default_reconnect_interval() -> u64 {
    300
}

fn default_model() -> String {
    "ets".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

impl PredictorConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::default())
    }

    fn from_environment(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(environment.try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        let parsed: Self = config
            .try_deserialize()
            .context("Invalid configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    #[cfg(test)]
    fn from_vars(vars: std::collections::HashMap<String, String>) -> Result<Self> {
        Self::from_environment(config::Environment::default().source(Some(vars)))
    }

    fn validate(&self) -> Result<()> {
        self.model()?;
        if self.predictor_interval_secs == 0 {
            return Err(anyhow!("PREDICTOR_INTERVAL_SECS must be positive"));
        }
        if self.predictor_job.trim().is_empty() {
            return Err(anyhow!("PREDICTOR_JOB must not be empty"));
        }
        Ok(())
    }

    pub fn model(&self) -> Result<ModelKind> {
        self.predictor_model
            .parse::<ModelKind>()
            .map_err(|e| anyhow!("Invalid PREDICTOR_MODEL: {}", e))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.predictor_interval_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.predictor_startup_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.predictor_request_timeout_secs)
    }

    /// Time without a finished cycle after which liveness fails
    pub fn stall_after(&self) -> Duration {
        self.interval() * 3
    }

    pub fn connect_config(&self) -> ConnectConfig {
        ConnectConfig {
            max_attempts: self.predictor_connect_attempts,
            backoff: Duration::from_secs(self.predictor_connect_backoff_secs),
            reconnect_interval: match self.predictor_reconnect_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: self.interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = PredictorConfig::from_vars(HashMap::new()).unwrap();

        assert_eq!(config.prometheus_url, "http://prometheus:9090");
        assert_eq!(config.pushgateway_url, "http://pushgateway:9091");
        assert_eq!(config.predictor_job, "predictor");
        assert_eq!(config.interval(), Duration::from_secs(120));
        assert_eq!(config.startup_delay(), Duration::from_secs(10));
        assert_eq!(config.model().unwrap(), ModelKind::Ets);
        assert_eq!(config.predictor_api_port, 8080);
        assert_eq!(config.stall_after(), Duration::from_secs(360));

        let connect = config.connect_config();
        assert_eq!(connect.max_attempts, 5);
        assert_eq!(connect.backoff, Duration::from_secs(5));
        assert_eq!(connect.reconnect_interval, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_overrides() {
        let config = PredictorConfig::from_vars(vars(&[
            ("PROMETHEUS_URL", "http://localhost:9090"),
            ("PREDICTOR_JOB", "windows-host"),
            ("PREDICTOR_INTERVAL_SECS", "60"),
            ("PREDICTOR_RECONNECT_INTERVAL_SECS", "0"),
            ("PREDICTOR_MODEL", "linear"),
        ]))
        .unwrap();

        assert_eq!(config.prometheus_url, "http://localhost:9090");
        assert_eq!(config.predictor_job, "windows-host");
        assert_eq!(config.scheduler_config().interval, Duration::from_secs(60));
        assert_eq!(config.connect_config().reconnect_interval, None);
        assert_eq!(config.model().unwrap(), ModelKind::Linear);
    }

    #[test]
    fn test_unknown_model_fails() {
        let err = PredictorConfig::from_vars(vars(&[("PREDICTOR_MODEL", "prophet")])).unwrap_err();
        assert!(err.to_string().contains("PREDICTOR_MODEL"));
    }

    #[test]
    fn test_unparseable_number_fails() {
        assert!(PredictorConfig::from_vars(vars(&[("PREDICTOR_INTERVAL_SECS", "soon")])).is_err());
    }

    #[test]
    fn test_zero_interval_fails() {
        assert!(PredictorConfig::from_vars(vars(&[("PREDICTOR_INTERVAL_SECS", "0")])).is_err());
    }
}
