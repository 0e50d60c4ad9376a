//! Backend connection state machine
//!
//! Startup walks `Disconnected -> Connecting(attempt) -> Connected`, or ends
//! in `Degraded` once the attempts are exhausted. A degraded connection
//! answers every query with an immediate connectivity error and probes the
//! backend again at most once per reconnect interval.

use super::{async_trait, RangeSeries, SeriesSource};
use crate::error::{PredictionError, PredictionResult};
use crate::models::QueryWindow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{info, warn};

/// Connection retry settings
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Probe attempts made by [`BackendConnection::connect`]
    pub max_attempts: u32,
    /// Fixed pause between two failed attempts
    pub backoff: Duration,
    /// Minimum time between reconnection probes while degraded, `None` to never reconnect
    pub reconnect_interval: Option<Duration>,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(5),
            reconnect_interval: Some(Duration::from_secs(300)),
        }
    }
}

/// State of the connection to the query backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
    Degraded { last_error: String },
}

impl ConnectionState {
    /// Numeric encoding used by the connection-state gauge
    pub fn as_gauge(&self) -> i64 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting { .. } => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Degraded { .. } => 3,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

struct Inner {
    state: ConnectionState,
    last_probe: Option<Instant>,
}

/// A [`SeriesSource`] gated by the connection state machine
pub struct BackendConnection {
    source: Arc<dyn SeriesSource>,
    config: ConnectConfig,
    inner: RwLock<Inner>,
}

impl BackendConnection {
    pub fn new(source: Arc<dyn SeriesSource>, config: ConnectConfig) -> Self {
        Self {
            source,
            config,
            inner: RwLock::new(Inner {
                state: ConnectionState::Disconnected,
                last_probe: None,
            }),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.read().await.state.clone()
    }

    async fn set_state(&self, state: ConnectionState) {
        let mut inner = self.inner.write().await;
        inner.state = state;
        inner.last_probe = Some(Instant::now());
    }

    /// Probe the backend up to `max_attempts` times with a fixed backoff
    ///
    /// Never fails: exhausting the attempts leaves the connection degraded.
    pub async fn connect(&self) -> ConnectionState {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            self.set_state(ConnectionState::Connecting { attempt }).await;

            match self.source.probe().await {
                Ok(()) => {
                    info!(attempt = attempt, "Connected to query backend");
                    self.set_state(ConnectionState::Connected).await;
                    return ConnectionState::Connected;
                }
                Err(e) => {
                    warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Connection attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.backoff).await;
                    }
                }
            }
        }

        warn!(
            max_attempts = max_attempts,
            error = %last_error,
            "Query backend unreachable, continuing in degraded mode"
        );
        let state = ConnectionState::Degraded { last_error };
        self.set_state(state.clone()).await;
        state
    }

    /// Probe a degraded backend once if the reconnect interval has elapsed
    ///
    /// Returns true when the connection is usable afterwards.
    pub async fn maybe_reconnect(&self) -> bool {
        let due = {
            let inner = self.inner.read().await;
            match (&inner.state, self.config.reconnect_interval) {
                (ConnectionState::Connected, _) => return true,
                (ConnectionState::Degraded { .. }, Some(interval)) => inner
                    .last_probe
                    .map(|last| last.elapsed() >= interval)
                    .unwrap_or(true),
                _ => false,
            }
        };

        if !due {
            return false;
        }

        match self.source.probe().await {
            Ok(()) => {
                info!("Reconnected to query backend");
                self.set_state(ConnectionState::Connected).await;
                true
            }
            Err(e) => {
                warn!(error = %e, "Reconnection probe failed, staying degraded");
                self.set_state(ConnectionState::Degraded {
                    last_error: e.to_string(),
                })
                .await;
                false
            }
        }
    }
}

#[async_trait]
impl SeriesSource for BackendConnection {
    async fn query_range(
        &self,
        query: &str,
        window: &QueryWindow,
    ) -> PredictionResult<Vec<RangeSeries>> {
        match self.state().await {
            ConnectionState::Connected => self.source.query_range(query, window).await,
            ConnectionState::Degraded { last_error } => Err(PredictionError::connectivity(
                format!("backend connection degraded: {}", last_error),
            )),
            other => Err(PredictionError::connectivity(format!(
                "backend not connected ({:?})",
                other
            ))),
        }
    }

    async fn probe(&self) -> PredictionResult<()> {
        self.source.probe().await
    }
}
