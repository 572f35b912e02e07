//! `sysinfo`-backed host sampler

use super::{SampleError, UsageSampler};
use async_trait::async_trait;
use crate::models::Sample;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{Disks, System};
use tokio::sync::Mutex;
use tracing::debug;

/// Shortest CPU averaging window accepted by the sampler
pub const MIN_AVERAGING_WINDOW: Duration = Duration::from_secs(1);

/// Reads whole-host CPU, memory and disk utilization
pub struct HostSampler {
    system: Mutex<System>,
    averaging_window: Duration,
    mount_point: PathBuf,
}

impl HostSampler {
    /// Create a sampler for the disk mounted at `mount_point`
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            system: Mutex::new(System::new()),
            averaging_window: MIN_AVERAGING_WINDOW,
            mount_point: mount_point.into(),
        }
    }

    /// Set the CPU averaging window (never below one second)
    pub fn with_averaging_window(mut self, window: Duration) -> Self {
        self.averaging_window = window
            .max(MIN_AVERAGING_WINDOW)
            .max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self
    }

    pub fn averaging_window(&self) -> Duration {
        self.averaging_window
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    async fn read_cpu(&self, system: &mut System) -> Result<f64, SampleError> {
        // CPU usage is the delta between two refreshes
        system.refresh_cpu();
        tokio::time::sleep(self.averaging_window).await;
        system.refresh_cpu();

        let cpu = system.global_cpu_info().cpu_usage() as f64;
        if !cpu.is_finite() {
            return Err(SampleError::Unavailable("cpu"));
        }
        Ok(cpu)
    }

    fn read_memory(system: &mut System) -> Result<f64, SampleError> {
        system.refresh_memory();
        let total = system.total_memory();
        let available = system.available_memory();
        usage_percent(total.saturating_sub(available), total)
            .ok_or(SampleError::Unavailable("memory"))
    }

    fn read_disk(&self) -> Result<f64, SampleError> {
        let disks = Disks::new_with_refreshed_list();
        select_disk_usage(
            disks
                .list()
                .iter()
                .map(|d| (d.mount_point(), d.total_space(), d.available_space())),
            &self.mount_point,
        )
        .ok_or_else(|| SampleError::DiskNotFound(self.mount_point.clone()))
    }
}

#[async_trait]
impl UsageSampler for HostSampler {
    async fn sample(&self) -> Result<Sample, SampleError> {
        let mut system = self.system.lock().await;

        let cpu = self.read_cpu(&mut system).await?;
        let memory = Self::read_memory(&mut system)?;
        let disk = self.read_disk()?;

        debug!(cpu = cpu, memory = memory, disk = disk, "Host sample read");

        Ok(Sample::new(cpu, memory, disk))
    }
}

/// `used / total` as a percentage, `None` when the total is zero
pub fn usage_percent(used: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some((used.min(total) as f64 / total as f64) * 100.0)
}

/// Utilization of the disk mounted exactly at `mount_point`
///
/// Input items are `(mount point, total bytes, available bytes)`.
pub fn select_disk_usage<'a>(
    disks: impl IntoIterator<Item = (&'a Path, u64, u64)>,
    mount_point: &Path,
) -> Option<f64> {
    disks
        .into_iter()
        .find(|(mount, _, _)| *mount == mount_point)
        .and_then(|(_, total, available)| usage_percent(total.saturating_sub(available), total))
}
