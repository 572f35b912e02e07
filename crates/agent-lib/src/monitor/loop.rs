//! Monitor loop
//!
//! A single sequential task: one sample per tick, then the overload check.
//! A migration runs inside the tick and blocks further sampling; shutdown
//! is only observed between ticks, so an attempt in flight always finishes.

use crate::config::MigrationConfig;
use crate::detector::{OverloadDetector, DEFAULT_CONSECUTIVE_CHECKS, DEFAULT_THRESHOLD_PERCENT};
use crate::health::{Component, HealthRegistry};
use crate::migration::MigrationOrchestrator;
use crate::models::{MigrationResult, Sample};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::sampler::{SampleError, UsageSampler};
use crate::status::{MonitorStatus, StatusBoard};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Configuration for the monitor loop
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay between checks (default: 60 seconds)
    pub interval: Duration,
    /// Utilization a resource must strictly exceed (default: 75%)
    pub threshold_percent: f64,
    /// High samples in a row required to migrate (default: 5)
    pub consecutive_checks: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            consecutive_checks: DEFAULT_CONSECUTIVE_CHECKS,
        }
    }
}

/// What a single cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The sample could not be read; nothing was recorded
    Skipped,
    /// Sample recorded, no sustained overload
    Recorded,
    MigrationSucceeded(MigrationResult),
    /// History was cleared and monitoring continues
    MigrationFailed(MigrationResult),
}

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit {
    Migrated(MigrationResult),
    Shutdown,
}

/// The monitor loop; owns the usage history exclusively
pub struct MonitorLoop {
    sampler: Arc<dyn UsageSampler>,
    orchestrator: Arc<MigrationOrchestrator>,
    migration_config: Arc<MigrationConfig>,
    detector: OverloadDetector,
    config: MonitorConfig,
    status: StatusBoard,
    health: HealthRegistry,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl MonitorLoop {
    /// Create a new monitor loop
    pub fn new(
        sampler: Arc<dyn UsageSampler>,
        orchestrator: Arc<MigrationOrchestrator>,
        migration_config: Arc<MigrationConfig>,
        config: MonitorConfig,
    ) -> Self {
        let status = StatusBoard::new(MonitorStatus::new(
            migration_config.cloud_provider.clone(),
            config.threshold_percent,
            config.consecutive_checks,
        ));

        Self {
            sampler,
            orchestrator,
            migration_config,
            detector: OverloadDetector::new(config.threshold_percent, config.consecutive_checks),
            config,
            status,
            health: HealthRegistry::new(),
            metrics: AgentMetrics::new(),
            logger: StructuredLogger::new("localhost"),
        }
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn detector(&self) -> &OverloadDetector {
        &self.detector
    }

    /// Run until a migration succeeds or shutdown is signalled
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> LoopExit {
        info!(
            interval_secs = self.config.interval.as_secs(),
            threshold = self.config.threshold_percent,
            consecutive_checks = self.config.consecutive_checks,
            "Starting monitor loop"
        );

        let mut ticker = interval(self.config.interval);
        // A migration can take far longer than one interval
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let CycleOutcome::MigrationSucceeded(result) = self.run_cycle().await {
                        info!("Migration succeeded, stopping monitor loop");
                        return LoopExit::Migrated(result);
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down monitor loop");
                    self.status.stopped().await;
                    return LoopExit::Shutdown;
                }
            }
        }
    }

    /// Sample once and act on the result
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        match self.sampler.sample().await {
            Ok(sample) => self.handle_sample(sample).await,
            Err(e) => {
                self.handle_sampling_error(&e).await;
                CycleOutcome::Skipped
            }
        }
    }

    async fn handle_sampling_error(&self, error: &SampleError) {
        let message = error.to_string();
        self.metrics.inc_sampling_errors();
        self.logger.log_sampling_failed(&message);
        self.health.record_failure(Component::Sampler, message).await;
    }

    async fn handle_sample(&mut self, sample: Sample) -> CycleOutcome {
        self.health.record_success(Component::Sampler).await;

        self.detector.record(sample);
        self.logger
            .log_sample(sample.cpu_percent, sample.memory_percent, sample.disk_percent);
        self.metrics
            .observe_sample(sample.cpu_percent, sample.memory_percent, sample.disk_percent);
        self.publish_detector_state(sample).await;

        if !self.detector.should_migrate() {
            return CycleOutcome::Recorded;
        }

        let breached = sample
            .breached_resources(self.detector.threshold())
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.metrics.inc_overload_detections();
        self.logger.log_overload_detected(
            self.detector.threshold(),
            self.detector.consecutive_checks(),
            &breached,
        );

        self.status.migration_started().await;
        let result = self.orchestrator.migrate(&self.migration_config).await;

        if result.succeeded {
            self.status.migration_succeeded().await;
            self.health.record_success(Component::Orchestrator).await;
            CycleOutcome::MigrationSucceeded(result)
        } else {
            let reason = result
                .failure_reason
                .clone()
                .unwrap_or_else(|| "migration failed".to_string());

            // Fresh window required before another attempt
            self.detector.reset();
            self.metrics.set_detector_state(0, 0);
            self.status.migration_failed(reason.clone()).await;
            self.health
                .record_failure(Component::Orchestrator, reason)
                .await;
            self.logger.log_monitoring_resumed();
            CycleOutcome::MigrationFailed(result)
        }
    }

    async fn publish_detector_state(&self, sample: Sample) {
        let history_len = self.detector.len();
        let trailing = self.detector.trailing_breaches();
        self.metrics.set_detector_state(history_len, trailing);
        self.status.record_sample(sample, history_len, trailing).await;
    }
}

/// Builder for creating the monitor loop
pub struct MonitorLoopBuilder {
    sampler: Option<Arc<dyn UsageSampler>>,
    orchestrator: Option<Arc<MigrationOrchestrator>>,
    migration_config: Option<Arc<MigrationConfig>>,
    config: MonitorConfig,
    status: Option<StatusBoard>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl MonitorLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            sampler: None,
            orchestrator: None,
            migration_config: None,
            config: MonitorConfig::default(),
            status: None,
            health: None,
            logger: None,
        }
    }

    pub fn sampler(mut self, sampler: Arc<dyn UsageSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn orchestrator(mut self, orchestrator: Arc<MigrationOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn migration_config(mut self, config: Arc<MigrationConfig>) -> Self {
        self.migration_config = Some(config);
        self
    }

    /// Set the check interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn threshold(mut self, percent: f64) -> Self {
        self.config.threshold_percent = percent;
        self
    }

    pub fn consecutive_checks(mut self, checks: usize) -> Self {
        self.config.consecutive_checks = checks;
        self
    }

    /// Publish to an existing status board instead of a private one
    pub fn status(mut self, status: StatusBoard) -> Self {
        self.status = Some(status);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the monitor loop
    pub fn build(self) -> Result<MonitorLoop> {
        let sampler = self
            .sampler
            .ok_or_else(|| anyhow::anyhow!("Sampler is required"))?;
        let orchestrator = self
            .orchestrator
            .ok_or_else(|| anyhow::anyhow!("Orchestrator is required"))?;
        let migration_config = self
            .migration_config
            .ok_or_else(|| anyhow::anyhow!("Migration config is required"))?;

        if self.config.interval.is_zero() {
            anyhow::bail!("interval must be non-zero");
        }
        if self.config.consecutive_checks == 0 {
            anyhow::bail!("consecutive_checks must be at least 1");
        }
        if !(self.config.threshold_percent > 0.0 && self.config.threshold_percent <= 100.0) {
            anyhow::bail!("threshold must be within (0, 100]");
        }

        let mut monitor = MonitorLoop::new(sampler, orchestrator, migration_config, self.config);
        if let Some(status) = self.status {
            monitor.status = status;
        }
        if let Some(health) = self.health {
            monitor.health = health;
        }
        if let Some(logger) = self.logger {
            monitor.logger = logger;
        }
        Ok(monitor)
    }
}

impl Default for MonitorLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
