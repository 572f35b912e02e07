//! Host utilization sampling
//!
//! Provides the sampler used by the monitor loop and the dashboard. The
//! production implementation reads CPU, memory and disk utilization through
//! `sysinfo`; tests drive the loop with scripted samplers.

mod host;

pub use host::{select_disk_usage, usage_percent, HostSampler, MIN_AVERAGING_WINDOW};

use crate::models::Sample;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reading host utilization. All of them are recoverable per cycle.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("{0} usage is unavailable")]
    Unavailable(&'static str),

    #[error("no disk mounted at {0}")]
    DiskNotFound(PathBuf),

    #[error("sampler failed: {0}")]
    Other(String),
}

/// Trait for host utilization samplers
#[async_trait]
pub trait UsageSampler: Send + Sync {
    /// Take one reading; blocks for the CPU averaging window
    async fn sample(&self) -> Result<Sample, SampleError>;
}
