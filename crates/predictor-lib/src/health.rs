//! Health tracking for the predictor daemon
//!
//! Components report their own status; the registry additionally watches
//! the scheduler heartbeat so a stalled loop turns the process unhealthy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Working, but publishing sentinels or retrying
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_timestamp: Option<i64>,
    pub cycles_completed: u64,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const BACKEND: &str = "backend";
    pub const FORECASTER: &str = "forecaster";
    pub const PUBLISHER: &str = "publisher";
    /// Synthesized from the cycle heartbeat, never registered directly
    pub const SCHEDULER: &str = "scheduler";
}

#[derive(Debug, Default)]
struct Heartbeat {
    last_cycle_timestamp: Option<i64>,
    cycles_completed: u64,
}

/// Health registry shared between the scheduler and the API server
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    heartbeat: Arc<RwLock<Heartbeat>>,
    stall_after: Duration,
}

impl HealthRegistry {
    /// `stall_after` is how long the scheduler may go without finishing a
    /// cycle before it is reported unhealthy
    pub fn new(stall_after: Duration) -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            heartbeat: Arc::new(RwLock::new(Heartbeat::default())),
            stall_after,
        }
    }

    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    /// Record a finished prediction cycle
    pub async fn record_cycle(&self) {
        self.record_cycle_at(chrono::Utc::now().timestamp()).await;
    }

    pub async fn record_cycle_at(&self, timestamp: i64) {
        let mut heartbeat = self.heartbeat.write().await;
        heartbeat.last_cycle_timestamp = Some(timestamp);
        heartbeat.cycles_completed += 1;
    }

    pub async fn health(&self) -> HealthResponse {
        let mut components = self.components.read().await.clone();
        let (last_cycle_timestamp, cycles_completed) = {
            let heartbeat = self.heartbeat.read().await;
            (heartbeat.last_cycle_timestamp, heartbeat.cycles_completed)
        };

        if let Some(last) = last_cycle_timestamp {
            let age = chrono::Utc::now().timestamp() - last;
            if age > self.stall_after.as_secs() as i64 {
                components.insert(
                    components::SCHEDULER.to_string(),
                    ComponentHealth::unhealthy(format!("No prediction cycle for {}s", age)),
                );
            }
        }

        let status = overall_status(&components);
        HealthResponse {
            status,
            components,
            last_cycle_timestamp,
            cycles_completed,
        }
    }

    /// Ready once a cycle has completed and nothing is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let health = self.health().await;

        let reason = if health.cycles_completed == 0 {
            Some("No prediction cycle completed yet")
        } else if health.status == ComponentStatus::Unhealthy {
            Some("Component unhealthy")
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}

fn overall_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
    components
        .values()
        .map(|c| c.status)
        .fold(ComponentStatus::Healthy, |acc, status| match (acc, status) {
            (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                ComponentStatus::Unhealthy
            }
            (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                ComponentStatus::Degraded
            }
            _ => ComponentStatus::Healthy,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> HealthRegistry {
        HealthRegistry::new(Duration::from_secs(360))
    }

    #[tokio::test]
    async fn test_initial_state() {
        let health = registry().health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
        assert_eq!(health.cycles_completed, 0);
    }

    #[tokio::test]
    async fn test_degraded_backend_degrades_overall() {
        let registry = registry();
        registry.register(components::BACKEND).await;
        registry.register(components::PUBLISHER).await;

        registry
            .set_degraded(components::BACKEND, "5 connection attempts failed")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::BACKEND].message.as_deref(),
            Some("5 connection attempts failed")
        );
    }

    #[tokio::test]
    async fn test_unhealthy_wins_over_degraded() {
        let registry = registry();
        registry.set_degraded(components::BACKEND, "slow").await;
        registry
            .update(components::PUBLISHER, ComponentHealth::unhealthy("down"))
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_not_ready_before_first_cycle() {
        let registry = registry();
        registry.register(components::BACKEND).await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.unwrap().contains("No prediction cycle"));
    }

    #[tokio::test]
    async fn test_ready_after_cycle() {
        let registry = registry();
        registry.register(components::BACKEND).await;
        registry.record_cycle().await;

        let readiness = registry.readiness().await;
        assert!(readiness.ready);
        assert_eq!(registry.health().await.cycles_completed, 1);
    }

    #[tokio::test]
    async fn test_ready_while_degraded() {
        let registry = registry();
        registry.set_degraded(components::BACKEND, "degraded").await;
        registry.record_cycle().await;

        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_stalled_scheduler_is_unhealthy() {
        let registry = registry();
        registry.register(components::BACKEND).await;
        registry
            .record_cycle_at(chrono::Utc::now().timestamp() - 3600)
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert!(health.components.contains_key(components::SCHEDULER));
        assert!(!registry.readiness().await.ready);
    }
}
