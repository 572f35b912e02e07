//! Monitor status board
//!
//! The monitor loop owns the usage history; readers such as the dashboard
//! only ever see the snapshot published here.

use crate::models::{MigrationPhase, Sample};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Coarse agent phase shown on the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorPhase {
    /// No sample recorded yet
    Starting,
    Monitoring,
    Migrating,
    /// A migration succeeded; monitoring has stopped
    Completed,
    /// The loop exited on shutdown
    Stopped,
}

impl MonitorPhase {
    /// Human-readable label used by the dashboard
    pub fn label(&self) -> &'static str {
        match self {
            MonitorPhase::Starting => "Starting",
            MonitorPhase::Monitoring => "Monitoring",
            MonitorPhase::Migrating => "Migration in progress",
            MonitorPhase::Completed => "Migration completed",
            MonitorPhase::Stopped => "Stopped",
        }
    }
}

/// Snapshot of the monitor state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub phase: MonitorPhase,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration_phase: Option<MigrationPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_sample: Option<Sample>,
    pub samples_recorded: u64,
    pub history_len: usize,
    pub trailing_breaches: usize,
    pub threshold_percent: f64,
    pub consecutive_checks: usize,
    pub migration_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<String>,
    pub provider: String,
    pub updated_at: i64,
}

impl MonitorStatus {
    pub fn new(
        provider: impl Into<String>,
        threshold_percent: f64,
        consecutive_checks: usize,
    ) -> Self {
        Self {
            phase: MonitorPhase::Starting,
            label: MonitorPhase::Starting.label().to_string(),
            migration_phase: None,
            latest_sample: None,
            samples_recorded: 0,
            history_len: 0,
            trailing_breaches: 0,
            threshold_percent,
            consecutive_checks,
            migration_attempts: 0,
            last_failure: None,
            provider: provider.into(),
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    fn set_phase(&mut self, phase: MonitorPhase) {
        self.phase = phase;
        self.label = phase.label().to_string();
    }
}

/// Shared, synchronized holder of the latest `MonitorStatus`
#[derive(Debug, Clone)]
pub struct StatusBoard {
    inner: Arc<RwLock<MonitorStatus>>,
}

impl StatusBoard {
    pub fn new(initial: MonitorStatus) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Copy of the current status
    pub async fn snapshot(&self) -> MonitorStatus {
        self.inner.read().await.clone()
    }

    /// Apply an update and stamp the time
    pub async fn update(&self, f: impl FnOnce(&mut MonitorStatus)) {
        let mut status = self.inner.write().await;
        f(&mut status);
        status.updated_at = chrono::Utc::now().timestamp();
    }

    /// Publish a recorded sample and the detector state
    pub async fn record_sample(
        &self,
        sample: Sample,
        history_len: usize,
        trailing_breaches: usize,
    ) {
        self.update(|status| {
            if status.phase == MonitorPhase::Starting {
                status.set_phase(MonitorPhase::Monitoring);
            }
            status.latest_sample = Some(sample);
            status.samples_recorded += 1;
            status.history_len = history_len;
            status.trailing_breaches = trailing_breaches;
        })
        .await;
    }

    /// Enter the migrating phase for a new attempt
    pub async fn migration_started(&self) {
        self.update(|status| {
            status.set_phase(MonitorPhase::Migrating);
            status.migration_phase = Some(MigrationPhase::Idle);
            status.migration_attempts += 1;
        })
        .await;
    }

    pub async fn set_migration_phase(&self, phase: MigrationPhase) {
        self.update(|status| status.migration_phase = Some(phase)).await;
    }

    pub async fn migration_succeeded(&self) {
        self.update(|status| {
            status.set_phase(MonitorPhase::Completed);
            status.migration_phase = Some(MigrationPhase::Completed);
            status.last_failure = None;
        })
        .await;
    }

    /// Back to monitoring with an empty history
    pub async fn migration_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.update(|status| {
            status.set_phase(MonitorPhase::Monitoring);
            status.migration_phase = Some(MigrationPhase::Failed);
            status.last_failure = Some(reason);
            status.history_len = 0;
            status.trailing_breaches = 0;
        })
        .await;
    }

    pub async fn stopped(&self) {
        self.update(|status| {
            if status.phase != MonitorPhase::Completed {
                status.set_phase(MonitorPhase::Stopped);
            }
        })
        .await;
    }
}
