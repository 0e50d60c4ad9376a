//! Prediction scheduling loop
//!
//! Runs one prediction cycle immediately and then once per interval,
//! publishing every outcome and keeping the health registry current.

use super::PredictionCycle;
use crate::fetcher::{BackendConnection, ConnectionState};
use crate::health::{components, HealthRegistry};
use crate::models::PredictionOutcome;
use crate::observability::PredictorMetrics;
use crate::publisher::ResultPublisher;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Default time between two prediction cycles
pub const DEFAULT_PREDICTION_INTERVAL: Duration = Duration::from_secs(2 * 60);

/// Configuration for the prediction scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PREDICTION_INTERVAL,
        }
    }
}

/// Drives the prediction cycle and publishes its outcomes
pub struct PredictionScheduler {
    cycle: PredictionCycle,
    publisher: ResultPublisher,
    connection: Option<Arc<BackendConnection>>,
    health: HealthRegistry,
    metrics: PredictorMetrics,
    config: SchedulerConfig,
}

impl PredictionScheduler {
    pub fn new(
        cycle: PredictionCycle,
        publisher: ResultPublisher,
        connection: Option<Arc<BackendConnection>>,
        health: HealthRegistry,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            cycle,
            publisher,
            connection,
            health,
            metrics: PredictorMetrics::new(),
            config,
        }
    }

    /// Run until a shutdown signal arrives
    ///
    /// The first cycle starts immediately. A cycle that overruns the
    /// interval delays the next one instead of triggering a burst.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            metrics = self.cycle.specs().len(),
            job = %self.publisher.job(),
            "Starting prediction scheduler"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down prediction scheduler");
                    break;
                }
            }
        }
    }

    /// Run and publish a single cycle
    pub async fn tick(&self) -> PredictionOutcome {
        self.refresh_backend().await;

        let outcome = self.cycle.run(Utc::now()).await;

        let failed = outcome.failed_count();
        if failed == 0 {
            self.health.set_healthy(components::FORECASTER).await;
        } else {
            self.health
                .set_degraded(
                    components::FORECASTER,
                    format!("{} of {} metrics published the sentinel", failed, outcome.len()),
                )
                .await;
        }

        if self.publisher.publish(outcome.clone()).await {
            self.health.set_healthy(components::PUBLISHER).await;
        } else {
            self.health
                .set_degraded(components::PUBLISHER, "Last publish failed")
                .await;
        }

        self.health.record_cycle().await;
        outcome
    }

    async fn refresh_backend(&self) {
        let Some(connection) = &self.connection else {
            return;
        };

        connection.maybe_reconnect().await;
        let state = connection.state().await;
        self.metrics.set_connection_state(state.as_gauge());

        match state {
            ConnectionState::Connected => self.health.set_healthy(components::BACKEND).await,
            ConnectionState::Degraded { last_error } => {
                self.health
                    .set_degraded(components::BACKEND, format!("Backend unreachable: {}", last_error))
                    .await
            }
            other => {
                self.health
                    .set_degraded(components::BACKEND, format!("Backend {:?}", other))
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PredictionError, PredictionResult};
    use crate::fetcher::{async_trait, ConnectConfig, RangeSeries, SeriesSource};
    use crate::health::ComponentStatus;
    use crate::models::{MetricSpec, QueryWindow, RawSample};
    use crate::observability::StructuredLogger;
    use crate::predictor::ModelKind;
    use crate::publisher::{MetricsPayload, MetricsSink};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Flat series for every query, probe outcome switchable at runtime
    struct FlatSource {
        up: AtomicBool,
    }

    #[async_trait]
    impl SeriesSource for FlatSource {
        async fn query_range(
            &self,
            _query: &str,
            window: &QueryWindow,
        ) -> PredictionResult<Vec<RangeSeries>> {
            let start = window.start.timestamp() as f64;
            let samples = (0..60)
                .map(|i| RawSample::new(start + 60.0 * i as f64, "50"))
                .collect();
            Ok(vec![RangeSeries {
                samples,
                ..Default::default()
            }])
        }

        async fn probe(&self) -> PredictionResult<()> {
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(PredictionError::connectivity("connection refused"))
            }
        }
    }

    #[derive(Default)]
    struct CountingSink {
        pushes: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl MetricsSink for CountingSink {
        async fn push(&self, _job: &str, _payload: MetricsPayload) -> PredictionResult<()> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(PredictionError::publish("gateway down"))
            } else {
                Ok(())
            }
        }
    }

    fn scheduler(
        source: Arc<dyn SeriesSource>,
        connection: Option<Arc<BackendConnection>>,
        sink: Arc<CountingSink>,
        health: HealthRegistry,
    ) -> PredictionScheduler {
        let logger = StructuredLogger::new("predictor");
        let cycle = PredictionCycle::new(
            MetricSpec::default_set(),
            source,
            ModelKind::Linear.build(),
            logger.clone(),
        );
        let publisher = ResultPublisher::new(sink, "predictor", logger);
        PredictionScheduler::new(
            cycle,
            publisher,
            connection,
            health,
            SchedulerConfig {
                interval: Duration::from_secs(3600),
            },
        )
    }

    fn health() -> HealthRegistry {
        HealthRegistry::new(Duration::from_secs(3 * 3600))
    }

    #[test]
    fn test_default_interval() {
        assert_eq!(SchedulerConfig::default().interval, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_tick_publishes_outcome() {
        let source = Arc::new(FlatSource {
            up: AtomicBool::new(true),
        });
        let sink = Arc::new(CountingSink::default());
        let health = health();
        let scheduler = scheduler(source, None, sink.clone(), health.clone());

        let outcome = scheduler.tick().await;

        assert_eq!(outcome.len(), 3);
        assert_eq!(outcome.failed_count(), 0);
        assert_eq!(outcome.value("disk"), 50.0);
        assert_eq!(sink.pushes.load(Ordering::SeqCst), 1);

        let status = health.health().await;
        assert_eq!(status.status, ComponentStatus::Healthy);
        assert_eq!(status.cycles_completed, 1);
        assert!(health.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_degraded_backend_publishes_sentinels() {
        let source = Arc::new(FlatSource {
            up: AtomicBool::new(false),
        });
        let connection = Arc::new(BackendConnection::new(
            source.clone(),
            ConnectConfig {
                max_attempts: 2,
                backoff: Duration::ZERO,
                reconnect_interval: None,
            },
        ));
        connection.connect().await;

        let sink = Arc::new(CountingSink::default());
        let health = health();
        let scheduler = scheduler(connection.clone(), Some(connection), sink.clone(), health.clone());

        let outcome = scheduler.tick().await;

        assert_eq!(outcome.failed_count(), 3);
        assert!(outcome.iter().all(|(_, r)| r.value == 0.0));
        assert_eq!(sink.pushes.load(Ordering::SeqCst), 1);

        let status = health.health().await;
        assert_eq!(status.status, ComponentStatus::Degraded);
        assert_eq!(
            status.components[components::BACKEND].status,
            ComponentStatus::Degraded
        );
        assert_eq!(
            status.components[components::FORECASTER].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_reconnect_restores_forecasts() {
        let source = Arc::new(FlatSource {
            up: AtomicBool::new(false),
        });
        let connection = Arc::new(BackendConnection::new(
            source.clone(),
            ConnectConfig {
                max_attempts: 1,
                backoff: Duration::ZERO,
                reconnect_interval: Some(Duration::ZERO),
            },
        ));
        connection.connect().await;

        let sink = Arc::new(CountingSink::default());
        let health = health();
        let scheduler = scheduler(connection.clone(), Some(connection), sink, health.clone());

        assert_eq!(scheduler.tick().await.failed_count(), 3);

        source.up.store(true, Ordering::SeqCst);
        let outcome = scheduler.tick().await;

        assert_eq!(outcome.failed_count(), 0);
        assert_eq!(health.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_running() {
        let source = Arc::new(FlatSource {
            up: AtomicBool::new(true),
        });
        let sink = Arc::new(CountingSink::default());
        sink.fail.store(true, Ordering::SeqCst);
        let health = health();
        let scheduler = scheduler(source, None, sink.clone(), health.clone());

        scheduler.tick().await;
        scheduler.tick().await;

        assert_eq!(sink.pushes.load(Ordering::SeqCst), 2);
        let status = health.health().await;
        assert_eq!(status.cycles_completed, 2);
        assert_eq!(
            status.components[components::PUBLISHER].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_run_fires_immediately_and_stops_on_shutdown() {
        let source = Arc::new(FlatSource {
            up: AtomicBool::new(true),
        });
        let sink = Arc::new(CountingSink::default());
        let health = health();
        let scheduler = Arc::new(scheduler(source, None, sink.clone(), health.clone()));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        tokio::time::timeout(Duration::from_secs(5), async {
            while health.health().await.cycles_completed == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("first cycle did not run");

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        assert_eq!(sink.pushes.load(Ordering::SeqCst), 1);
    }
}
