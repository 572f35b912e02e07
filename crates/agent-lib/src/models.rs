//! Core data models for the host agent

use serde::{Deserialize, Serialize};
use std::fmt;

/// One host utilization reading, all values in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub timestamp: i64,
}

impl Sample {
    /// Build a sample stamped with the current time. Values are clamped to [0, 100].
    pub fn new(cpu_percent: f64, memory_percent: f64, disk_percent: f64) -> Self {
        Self::at(
            chrono::Utc::now().timestamp(),
            cpu_percent,
            memory_percent,
            disk_percent,
        )
    }

    /// Build a sample with an explicit timestamp
    pub fn at(timestamp: i64, cpu_percent: f64, memory_percent: f64, disk_percent: f64) -> Self {
        Self {
            cpu_percent: clamp_percent(cpu_percent),
            memory_percent: clamp_percent(memory_percent),
            disk_percent: clamp_percent(disk_percent),
            timestamp,
        }
    }

    /// True if any resource is strictly above the threshold
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.cpu_percent > threshold
            || self.memory_percent > threshold
            || self.disk_percent > threshold
    }

    /// Resources strictly above the threshold
    pub fn breached_resources(&self, threshold: f64) -> Vec<Resource> {
        Resource::ALL
            .into_iter()
            .filter(|r| self.value(*r) > threshold)
            .collect()
    }

    pub fn value(&self, resource: Resource) -> f64 {
        match resource {
            Resource::Cpu => self.cpu_percent,
            Resource::Memory => self.memory_percent,
            Resource::Disk => self.disk_percent,
        }
    }
}

fn clamp_percent(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Host resources watched by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Cpu,
    Memory,
    Disk,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Cpu, Resource::Memory, Resource::Disk];
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Cpu => write!(f, "cpu"),
            Resource::Memory => write!(f, "memory"),
            Resource::Disk => write!(f, "disk"),
        }
    }
}

/// Phases of a single migration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    Idle,
    Imaging,
    Uploading,
    RemoteProvisioning,
    Completed,
    Failed,
}

impl MigrationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationPhase::Completed | MigrationPhase::Failed)
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationPhase::Idle => write!(f, "idle"),
            MigrationPhase::Imaging => write!(f, "imaging"),
            MigrationPhase::Uploading => write!(f, "uploading"),
            MigrationPhase::RemoteProvisioning => write!(f, "remote provisioning"),
            MigrationPhase::Completed => write!(f, "completed"),
            MigrationPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one migration attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Phase in which the attempt stopped; `None` on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<MigrationPhase>,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    pub duration_ms: u64,
}

impl MigrationResult {
    pub fn success(
        provider: impl Into<String>,
        instance_name: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            succeeded: true,
            failure_reason: None,
            failed_phase: None,
            provider: provider.into(),
            instance_name: Some(instance_name.into()),
            duration_ms,
        }
    }

    pub fn failure(
        provider: impl Into<String>,
        phase: MigrationPhase,
        reason: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        let mut reason = reason.into();
        if reason.trim().is_empty() {
            reason = format!("{} failed without an error message", phase);
        }
        Self {
            succeeded: false,
            failure_reason: Some(reason),
            failed_phase: Some(phase),
            provider: provider.into(),
            instance_name: None,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_clamps_values() {
        let sample = Sample::at(0, 120.0, -3.0, 50.0);
        assert_eq!(sample.cpu_percent, 100.0);
        assert_eq!(sample.memory_percent, 0.0);
        assert_eq!(sample.disk_percent, 50.0);
    }

    #[test]
    fn test_sample_exceeds_is_strict() {
        let at_threshold = Sample::at(0, 75.0, 75.0, 75.0);
        assert!(!at_threshold.exceeds(75.0));

        let disk_only = Sample::at(0, 10.0, 10.0, 75.1);
        assert!(disk_only.exceeds(75.0));
        assert_eq!(disk_only.breached_resources(75.0), vec![Resource::Disk]);
    }

    #[test]
    fn test_failure_reason_never_empty() {
        let result = MigrationResult::failure("gcp", MigrationPhase::Uploading, "  ", 10);
        assert!(!result.succeeded);
        assert!(!result.failure_reason.unwrap().is_empty());
    }
}
