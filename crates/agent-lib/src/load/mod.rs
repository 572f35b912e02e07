//! Synthetic load generation for the dashboard
//!
//! Lets an operator push CPU and memory utilization up to exercise the
//! overload detector. Nothing here is used by the monitor loop itself.

mod ballast;
mod cpu;
mod stress;

pub use ballast::{MemoryBallast, DEFAULT_BLOCK_BYTES, DEFAULT_MAX_BLOCKS};
pub use cpu::{max_workers, CpuLoad, DEFAULT_CPU_WORKERS};
pub use stress::{StressLauncher, StressProfile};

use crate::observability::{AgentMetrics, StructuredLogger};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Load generator errors
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("memory ballast is full ({blocks} blocks, {bytes} bytes)")]
    BallastFull { blocks: usize, bytes: usize },

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start CPU worker: {0}")]
    Worker(#[source] std::io::Error),
}

/// Current synthetic load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadState {
    pub cpu_workers: usize,
    pub memory_blocks: usize,
    pub memory_bytes: usize,
    pub memory_max_blocks: usize,
    pub stress_runs: u64,
}

/// Facade over the CPU, memory and stress generators
#[derive(Clone)]
pub struct LoadGenerator {
    cpu: Arc<CpuLoad>,
    ballast: Arc<MemoryBallast>,
    stress: Arc<StressLauncher>,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl LoadGenerator {
    pub fn new(ballast: MemoryBallast, logger: StructuredLogger) -> Self {
        Self {
            cpu: Arc::new(CpuLoad::new()),
            ballast: Arc::new(ballast),
            stress: Arc::new(StressLauncher::new()),
            metrics: AgentMetrics::new(),
            logger,
        }
    }

    /// Replace the stress launcher (e.g. a different binary)
    pub fn with_stress_launcher(mut self, launcher: StressLauncher) -> Self {
        self.stress = Arc::new(launcher);
        self
    }

    pub fn state(&self) -> LoadState {
        LoadState {
            cpu_workers: self.cpu.workers(),
            memory_blocks: self.ballast.blocks(),
            memory_bytes: self.ballast.allocated_bytes(),
            memory_max_blocks: self.ballast.max_blocks(),
            stress_runs: self.stress.launched(),
        }
    }

    /// Start busy-loop workers; a no-op while workers are running
    pub fn start_cpu(&self, workers: usize) -> Result<LoadState, LoadError> {
        let started = self.cpu.start(workers)?;
        if started > 0 {
            self.logger
                .log_load_action("cpu_start", &format!("{} workers", started));
        }
        self.metrics.set_cpu_load_workers(self.cpu.workers());
        Ok(self.state())
    }

    pub fn stop_cpu(&self) -> LoadState {
        let stopped = self.cpu.stop();
        if stopped > 0 {
            self.logger
                .log_load_action("cpu_stop", &format!("{} workers", stopped));
        }
        self.metrics.set_cpu_load_workers(0);
        self.state()
    }

    /// Grow the memory ballast by one block
    pub fn allocate_memory(&self) -> Result<LoadState, LoadError> {
        let bytes = self.ballast.allocate()?;
        self.logger
            .log_load_action("memory_allocate", &format!("{} bytes held", bytes));
        self.metrics.set_memory_ballast_bytes(bytes);
        Ok(self.state())
    }

    /// Drop every ballast block
    pub fn free_memory(&self) -> LoadState {
        let freed = self.ballast.free_all();
        self.logger
            .log_load_action("memory_free", &format!("{} bytes released", freed));
        self.metrics.set_memory_ballast_bytes(0);
        self.state()
    }

    /// Launch the external stress tool in the background
    pub fn run_stress(&self, profile: &StressProfile) -> Result<LoadState, LoadError> {
        self.stress.launch(profile)?;
        self.logger
            .log_load_action("stress", &profile.command().to_string());
        Ok(self.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(max_blocks: usize) -> LoadGenerator {
        LoadGenerator::new(
            MemoryBallast::new(1024, max_blocks),
            StructuredLogger::new("test-host"),
        )
    }

    #[test]
    fn test_initial_state() {
        let state = generator(2).state();
        assert_eq!(state.cpu_workers, 0);
        assert_eq!(state.memory_blocks, 0);
        assert_eq!(state.memory_max_blocks, 2);
        assert_eq!(state.stress_runs, 0);
    }

    #[test]
    fn test_memory_allocate_and_free() {
        let generator = generator(2);
        assert_eq!(generator.allocate_memory().unwrap().memory_bytes, 1024);
        assert_eq!(generator.allocate_memory().unwrap().memory_blocks, 2);
        assert!(matches!(
            generator.allocate_memory(),
            Err(LoadError::BallastFull { blocks: 2, .. })
        ));

        let state = generator.free_memory();
        assert_eq!(state.memory_blocks, 0);
        assert_eq!(state.memory_bytes, 0);
    }

    #[test]
    fn test_cpu_start_stop() {
        let generator = generator(1);
        assert_eq!(generator.start_cpu(2).unwrap().cpu_workers, 2);
        // Second start while running does not add workers
        assert_eq!(generator.start_cpu(4).unwrap().cpu_workers, 2);
        assert_eq!(generator.stop_cpu().cpu_workers, 0);
    }

    #[tokio::test]
    async fn test_stress_missing_binary() {
        let generator = generator(1)
            .with_stress_launcher(StressLauncher::with_program("cloudlift-no-such-stress"));
        let result = generator.run_stress(&StressProfile::default());
        assert!(matches!(result, Err(LoadError::Spawn { .. })));
        assert_eq!(generator.state().stress_runs, 0);
    }
}
