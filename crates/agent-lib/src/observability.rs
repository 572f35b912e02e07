//! Observability infrastructure for the host agent
//!
//! Provides:
//! - Prometheus metrics (host utilization, detector state, migration attempts, load generator)
//! - Structured JSON logging with tracing
//!
//! Log consumers pattern-match on the message phrases below, so they must
//! stay stable.

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter, register_int_gauge, GaugeVec,
    HistogramVec, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Logged once per attempt when a migration starts
pub const MIGRATION_STARTED_PHRASE: &str = "initiating cloud migration";

/// Logged once per attempt on success
pub const MIGRATION_COMPLETED_PHRASE: &str = "Migration completed successfully";

/// Logged once per attempt on failure
pub const MIGRATION_FAILED_PHRASE: &str = "Migration failed";

/// Logged when the detector fires
pub const OVERLOAD_DETECTED_PHRASE: &str = "High resource usage detected";

/// Histogram buckets for migration step durations (in seconds)
const STEP_DURATION_BUCKETS: &[f64] = &[
    1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0, 7200.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct AgentMetricsInner {
    host_usage_percent: GaugeVec,
    history_len: IntGauge,
    trailing_breaches: IntGauge,
    samples_recorded: IntCounter,
    sampling_errors: IntCounter,
    overload_detections: IntCounter,
    migration_attempts: IntCounter,
    migration_failures: IntCounter,
    migration_step_seconds: HistogramVec,
    cpu_load_workers: IntGauge,
    memory_ballast_bytes: IntGauge,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            host_usage_percent: register_gauge_vec!(
                "cloudlift_host_usage_percent",
                "Most recent host utilization by resource",
                &["resource"]
            )
            .expect("Failed to register host_usage_percent"),

            history_len: register_int_gauge!(
                "cloudlift_usage_history_len",
                "Number of samples retained by the overload detector"
            )
            .expect("Failed to register usage_history_len"),

            trailing_breaches: register_int_gauge!(
                "cloudlift_trailing_breaches",
                "Consecutive most recent samples above the threshold"
            )
            .expect("Failed to register trailing_breaches"),

            samples_recorded: register_int_counter!(
                "cloudlift_samples_recorded_total",
                "Total number of host samples recorded"
            )
            .expect("Failed to register samples_recorded"),

            sampling_errors: register_int_counter!(
                "cloudlift_sampling_errors_total",
                "Total number of failed host samples"
            )
            .expect("Failed to register sampling_errors"),

            overload_detections: register_int_counter!(
                "cloudlift_overload_detections_total",
                "Total number of sustained overload detections"
            )
            .expect("Failed to register overload_detections"),

            migration_attempts: register_int_counter!(
                "cloudlift_migration_attempts_total",
                "Total number of migration attempts"
            )
            .expect("Failed to register migration_attempts"),

            migration_failures: register_int_counter!(
                "cloudlift_migration_failures_total",
                "Total number of failed migration attempts"
            )
            .expect("Failed to register migration_failures"),

            migration_step_seconds: register_histogram_vec!(
                "cloudlift_migration_step_seconds",
                "Time spent in each migration step",
                &["step"],
                STEP_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register migration_step_seconds"),

            cpu_load_workers: register_int_gauge!(
                "cloudlift_cpu_load_workers",
                "Synthetic CPU load worker threads currently running"
            )
            .expect("Failed to register cpu_load_workers"),

            memory_ballast_bytes: register_int_gauge!(
                "cloudlift_memory_ballast_bytes",
                "Bytes held by the synthetic memory ballast"
            )
            .expect("Failed to register memory_ballast_bytes"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    /// Record the latest host utilization
    pub fn observe_sample(&self, cpu: f64, memory: f64, disk: f64) {
        let gauge = &self.inner().host_usage_percent;
        gauge.with_label_values(&["cpu"]).set(cpu);
        gauge.with_label_values(&["memory"]).set(memory);
        gauge.with_label_values(&["disk"]).set(disk);
        self.inner().samples_recorded.inc();
    }

    /// Update detector state gauges
    pub fn set_detector_state(&self, history_len: usize, trailing_breaches: usize) {
        self.inner().history_len.set(history_len as i64);
        self.inner().trailing_breaches.set(trailing_breaches as i64);
    }

    pub fn inc_sampling_errors(&self) {
        self.inner().sampling_errors.inc();
    }

    pub fn inc_overload_detections(&self) {
        self.inner().overload_detections.inc();
    }

    pub fn inc_migration_attempts(&self) {
        self.inner().migration_attempts.inc();
    }

    pub fn inc_migration_failures(&self) {
        self.inner().migration_failures.inc();
    }

    /// Record how long a migration step took
    pub fn observe_step_duration(&self, step: &str, duration_secs: f64) {
        self.inner()
            .migration_step_seconds
            .with_label_values(&[step])
            .observe(duration_secs);
    }

    pub fn set_cpu_load_workers(&self, workers: usize) {
        self.inner().cpu_load_workers.set(workers as i64);
    }

    pub fn set_memory_ballast_bytes(&self, bytes: usize) {
        self.inner().memory_ballast_bytes.set(bytes as i64);
    }
}

/// Structured logger for agent events
///
/// Provides consistent JSON-formatted logging for samples, overload
/// decisions and migration transitions.
#[derive(Clone)]
pub struct StructuredLogger {
    host: String,
}

impl StructuredLogger {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Log a recorded sample
    pub fn log_sample(&self, cpu: f64, memory: f64, disk: f64) {
        info!(
            event = "sample_recorded",
            host = %self.host,
            cpu_percent = cpu,
            memory_percent = memory,
            disk_percent = disk,
            "CPU: {:.1}%, Memory: {:.1}%, Disk: {:.1}%",
            cpu,
            memory,
            disk
        );
    }

    /// Log a skipped sampling cycle
    pub fn log_sampling_failed(&self, error: &str) {
        warn!(
            event = "sampling_failed",
            host = %self.host,
            error = %error,
            "Failed to read host usage, skipping this cycle"
        );
    }

    /// Log the detector firing
    pub fn log_overload_detected(&self, threshold: f64, consecutive_checks: usize, breached: &str) {
        warn!(
            event = "overload_detected",
            host = %self.host,
            threshold = threshold,
            consecutive_checks = consecutive_checks,
            breached = %breached,
            "{}",
            OVERLOAD_DETECTED_PHRASE
        );
    }

    /// Log the start of a migration attempt
    pub fn log_migration_started(&self, provider: &str, attempt: u32) {
        warn!(
            event = "migration_started",
            host = %self.host,
            provider = %provider,
            attempt = attempt,
            "{} to {}",
            MIGRATION_STARTED_PHRASE,
            provider
        );
    }

    /// Log entry into a migration phase
    pub fn log_migration_step(&self, provider: &str, step: &str) {
        info!(
            event = "migration_step",
            host = %self.host,
            provider = %provider,
            step = %step,
            "Migration step started"
        );
    }

    /// Log a successful attempt
    pub fn log_migration_completed(&self, provider: &str, instance: &str, duration_ms: u64) {
        info!(
            event = "migration_completed",
            host = %self.host,
            provider = %provider,
            instance = %instance,
            duration_ms = duration_ms,
            "{}",
            MIGRATION_COMPLETED_PHRASE
        );
    }

    /// Log a failed attempt
    pub fn log_migration_failed(&self, provider: &str, step: &str, reason: &str) {
        error!(
            event = "migration_failed",
            host = %self.host,
            provider = %provider,
            step = %step,
            reason = %reason,
            "{}: {}",
            MIGRATION_FAILED_PHRASE,
            reason
        );
    }

    /// Log an artifact left behind in object storage
    pub fn log_orphaned_artifact(&self, provider: &str, artifact: &str) {
        warn!(
            event = "artifact_orphaned",
            host = %self.host,
            provider = %provider,
            artifact = %artifact,
            "Uploaded artifact is not cleaned up automatically"
        );
    }

    /// Log monitoring resuming after a failed attempt
    pub fn log_monitoring_resumed(&self) {
        info!(
            event = "monitoring_resumed",
            host = %self.host,
            "Usage history cleared, continuing monitoring"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, provider: &str) {
        info!(
            event = "agent_started",
            host = %self.host,
            agent_version = %version,
            provider = %provider,
            "VM monitoring service started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            host = %self.host,
            reason = %reason,
            "Host agent shutting down"
        );
    }

    /// Log a load generator action
    pub fn log_load_action(&self, action: &str, detail: &str) {
        info!(
            event = "load_generator",
            host = %self.host,
            action = %action,
            detail = %detail,
            "Synthetic load changed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_metrics_creation() {
        let metrics = AgentMetrics::new();

        metrics.observe_sample(10.0, 20.0, 30.0);
        metrics.set_detector_state(4, 2);
        metrics.inc_sampling_errors();
        metrics.inc_overload_detections();
        metrics.inc_migration_attempts();
        metrics.inc_migration_failures();
        metrics.observe_step_duration("imaging", 12.5);
        metrics.set_cpu_load_workers(4);
        metrics.set_memory_ballast_bytes(1024);

        // A second handle shares the same registry
        let other = AgentMetrics::new();
        other.inc_migration_attempts();
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-host");
        assert_eq!(logger.host(), "test-host");
    }

    #[test]
    fn test_stable_phrases() {
        assert_eq!(MIGRATION_STARTED_PHRASE, "initiating cloud migration");
        assert_eq!(MIGRATION_COMPLETED_PHRASE, "Migration completed successfully");
    }
}
