//! Liveness and readiness of the agent's moving parts
//!
//! Every component keeps a streak of consecutive failures. The sampler turns
//! unhealthy after a run of failed reads. A failed migration or load request
//! leaves the host usable, so those components only ever degrade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Failed reads in a row before the sampler is reported unhealthy
pub const SAMPLER_UNHEALTHY_AFTER: u32 = 5;

/// Parts of the agent whose health is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Sampler,
    Orchestrator,
    LoadGenerator,
}

impl Component {
    pub const ALL: [Component; 3] = [
        Component::Sampler,
        Component::Orchestrator,
        Component::LoadGenerator,
    ];

    /// Failure streak that makes this component unhealthy, if any
    pub fn unhealthy_after(self) -> Option<u32> {
        match self {
            Component::Sampler => Some(SAMPLER_UNHEALTHY_AFTER),
            Component::Orchestrator | Component::LoadGenerator => None,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Sampler => write!(f, "sampler"),
            Component::Orchestrator => write!(f, "orchestrator"),
            Component::LoadGenerator => write!(f, "load_generator"),
        }
    }
}

/// Ordered from best to worst so the overall status is the maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub consecutive_failures: u32,
    /// Most recent failure; kept after recovery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When `status` last changed
    pub since: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            status: ComponentStatus::Healthy,
            consecutive_failures: 0,
            last_error: None,
            since: now,
        }
    }

    fn succeed(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.transition(ComponentStatus::Healthy, now);
    }

    fn fail(&mut self, component: Component, error: String, now: DateTime<Utc>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error);

        let status = match component.unhealthy_after() {
            Some(limit) if self.consecutive_failures >= limit => ComponentStatus::Unhealthy,
            _ => ComponentStatus::Degraded,
        };
        self.transition(status, now);
    }

    fn transition(&mut self, status: ComponentStatus, now: DateTime<Utc>) {
        if self.status != status {
            self.status = status;
            self.since = now;
        }
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Shared health state, cloned into the monitor loop and the API
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<Component, ComponentHealth>>>,
    ready: Arc<AtomicBool>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Every component starts healthy; the agent starts not ready
    pub fn new() -> Self {
        let now = Utc::now();
        let components = Component::ALL
            .into_iter()
            .map(|c| (c, ComponentHealth::new(now)))
            .collect();

        Self {
            components: Arc::new(RwLock::new(components)),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// End a failure streak
    pub async fn record_success(&self, component: Component) {
        let mut components = self.components.write().await;
        if let Some(health) = components.get_mut(&component) {
            health.succeed(Utc::now());
        }
    }

    /// Extend a failure streak, escalating when the component allows it
    pub async fn record_failure(&self, component: Component, error: impl Into<String>) {
        let mut components = self.components.write().await;
        if let Some(health) = components.get_mut(&component) {
            health.fail(component, error.into(), Utc::now());
        }
    }

    /// Called once startup wiring is done
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub async fn component(&self, component: Component) -> Option<ComponentHealth> {
        self.components.read().await.get(&component).cloned()
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse { status, components }
    }

    /// Ready once marked, and only while nothing is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        if !self.ready.load(Ordering::SeqCst) {
            return ReadinessResponse {
                ready: false,
                reason: Some("agent not yet initialized".to_string()),
            };
        }

        let components = self.components.read().await;
        let unhealthy = components
            .iter()
            .find(|(_, h)| h.status == ComponentStatus::Unhealthy);

        match unhealthy {
            Some((component, health)) => ReadinessResponse {
                ready: false,
                reason: Some(format!(
                    "{} unhealthy after {} failures: {}",
                    component,
                    health.consecutive_failures,
                    health.last_error.as_deref().unwrap_or("unknown error")
                )),
            },
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}
