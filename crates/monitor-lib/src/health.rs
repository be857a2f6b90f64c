//! Health tracking for monitor components
//!
//! Tracks per-component status plus data freshness. A source that stops
//! delivering never crashes the poller; instead the time since the last
//! accepted snapshot grows and health degrades once it passes the
//! staleness threshold.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Default age after which data counts as stale
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Operational but serving stale or partial data
    Degraded,
    Unhealthy,
}

/// One component's last reported state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix milliseconds of the last status change
    pub updated_at: i64,
}

impl ComponentHealth {
    fn with(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn healthy() -> Self {
        Self::with(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    /// Milliseconds since the last snapshot was accepted, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_age_ms: Option<i64>,
    pub stale: bool,
    pub components: HashMap<String, ComponentHealth>,
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
    pub const POLLER: &str = "poller";
    pub const STORE: &str = "store";
    pub const INGEST: &str = "ingest";
}

#[derive(Debug)]
struct RegistryState {
    components: HashMap<String, ComponentHealth>,
    ready: bool,
    last_update_ms: Option<i64>,
}

/// Shared health registry
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
    stale_after: Duration,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::with_stale_after(DEFAULT_STALE_AFTER)
    }

    pub fn with_stale_after(stale_after: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState {
                components: HashMap::new(),
                ready: false,
                last_update_ms: None,
            })),
            stale_after,
        }
    }

    /// Register a component as healthy
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut state = self.state.write().await;
        state.components.insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    /// Note that fresh data arrived at `timestamp_ms`
    pub async fn record_update(&self, timestamp_ms: i64) {
        let mut state = self.state.write().await;
        state.last_update_ms = Some(state.last_update_ms.map_or(timestamp_ms, |t| t.max(timestamp_ms)));
    }

    pub async fn health(&self) -> HealthResponse {
        self.health_at(chrono::Utc::now().timestamp_millis()).await
    }

    /// Health as seen at `now_ms`
    pub async fn health_at(&self, now_ms: i64) -> HealthResponse {
        let state = self.state.read().await;
        let last_update_age_ms = state.last_update_ms.map(|t| (now_ms - t).max(0));
        let stale = last_update_age_ms
            .map(|age| age > self.stale_after.as_millis() as i64)
            .unwrap_or(false);

        let mut status = ComponentStatus::Healthy;
        for health in state.components.values() {
            match health.status {
                ComponentStatus::Unhealthy => {
                    status = ComponentStatus::Unhealthy;
                    break;
                }
                ComponentStatus::Degraded => status = ComponentStatus::Degraded,
                ComponentStatus::Healthy => {}
            }
        }
        if stale && status == ComponentStatus::Healthy {
            status = ComponentStatus::Degraded;
        }

        HealthResponse {
            status,
            last_update_age_ms,
            stale,
            components: state.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = self.state.read().await.ready;
        let health = self.health().await;

        if !ready {
            ReadinessResponse {
                ready: false,
                reason: Some("Monitor not yet initialized".to_string()),
            }
        } else if health.status == ComponentStatus::Unhealthy {
            ReadinessResponse {
                ready: false,
                reason: Some("Critical component unhealthy".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}
