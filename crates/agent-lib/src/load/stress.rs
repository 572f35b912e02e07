//! External `stress` tool launcher

use super::LoadError;
use crate::migration::CommandSpec;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Command;
use tracing::{debug, warn};

/// Arguments for one `stress` run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressProfile {
    pub cpu_workers: u32,
    pub vm_workers: u32,
    /// Per-worker allocation, in `stress` syntax (e.g. "500M")
    pub vm_bytes: String,
    pub timeout_secs: u64,
}

impl Default for StressProfile {
    fn default() -> Self {
        Self {
            cpu_workers: 8,
            vm_workers: 2,
            vm_bytes: "500M".to_string(),
            timeout_secs: 300,
        }
    }
}

impl StressProfile {
    pub fn command(&self) -> CommandSpec {
        self.command_for("stress")
    }

    fn command_for(&self, program: &str) -> CommandSpec {
        CommandSpec::new(program).args([
            "--cpu".to_string(),
            self.cpu_workers.to_string(),
            "--vm".to_string(),
            self.vm_workers.to_string(),
            "--vm-bytes".to_string(),
            self.vm_bytes.clone(),
            "--timeout".to_string(),
            self.timeout_secs.to_string(),
        ])
    }
}

/// Starts `stress` without waiting for it
pub struct StressLauncher {
    program: String,
    launched: AtomicU64,
}

impl StressLauncher {
    pub fn new() -> Self {
        Self::with_program("stress")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            launched: AtomicU64::new(0),
        }
    }

    /// Runs started since the agent came up
    pub fn launched(&self) -> u64 {
        self.launched.load(Ordering::Relaxed)
    }

    /// Spawn the tool and reap it in the background
    ///
    /// Must be called from within a tokio runtime.
    pub fn launch(&self, profile: &StressProfile) -> Result<(), LoadError> {
        let spec = profile.command_for(&self.program);
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| LoadError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        self.launched.fetch_add(1, Ordering::Relaxed);
        debug!(command = %spec, "stress started");

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!("stress run finished"),
                Ok(status) => warn!(status = %status, "stress exited with failure"),
                Err(e) => warn!(error = %e, "Failed to wait for stress"),
            }
        });
        Ok(())
    }
}

impl Default for StressLauncher {
    fn default() -> Self {
        Self::new()
    }
}
