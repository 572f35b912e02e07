//! Agent configuration

use agent_lib::config::DEFAULT_CONFIG_PATH;
use agent_lib::load::{DEFAULT_BLOCK_BYTES, DEFAULT_MAX_BLOCKS};
use agent_lib::sampler::MIN_AVERAGING_WINDOW;
use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Host name reported in logs
    #[serde(default = "default_host_name")]
    pub host_name: String,

    /// API server port for the dashboard, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Delay between overload checks in seconds
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Utilization a resource must strictly exceed
    #[serde(default = "default_threshold")]
    pub threshold_percent: f64,

    /// High samples in a row before migrating
    #[serde(default = "default_consecutive_checks")]
    pub consecutive_checks: usize,

    /// CPU averaging window in milliseconds
    #[serde(default = "default_sample_window")]
    pub sample_window_ms: u64,

    /// Mount point whose filesystem is reported as disk usage
    #[serde(default = "default_disk_mount_point")]
    pub disk_mount_point: PathBuf,

    #[serde(default = "default_migration_config_path")]
    pub migration_config_path: PathBuf,

    /// Also append JSON log lines to this file
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default = "default_max_ballast_blocks")]
    pub max_ballast_blocks: usize,

    #[serde(default = "default_ballast_block_mib")]
    pub ballast_block_mib: usize,
}

fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_check_interval() -> u64 {
    60
}

fn default_threshold() -> f64 {
    75.0
}

fn default_consecutive_checks() -> usize {
    5
}

fn default_sample_window() -> u64 {
    MIN_AVERAGING_WINDOW.as_millis() as u64
}

fn default_disk_mount_point() -> PathBuf {
    PathBuf::from("/")
}

fn default_migration_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

fn default_max_ballast_blocks() -> usize {
    DEFAULT_MAX_BLOCKS
}

fn default_ballast_block_mib() -> usize {
    DEFAULT_BLOCK_BYTES / (1024 * 1024)
}

impl AgentConfig {
    /// Load configuration from `CLOUDLIFT_*` environment variables
    pub fn load() -> Result<Self> {
        Self::from_env(None)
    }

    /// Load from an explicit variable map instead of the process environment
    pub fn from_env(vars: Option<HashMap<String, String>>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("CLOUDLIFT")
                    .try_parsing(true)
                    .source(vars),
            )
            .build()?;

        let config: AgentConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.consecutive_checks == 0 {
            bail!("consecutive_checks must be at least 1");
        }
        if !(self.threshold_percent > 0.0 && self.threshold_percent <= 100.0) {
            bail!(
                "threshold_percent must be within (0, 100], got {}",
                self.threshold_percent
            );
        }
        if self.sample_window() < MIN_AVERAGING_WINDOW {
            bail!(
                "sample_window_ms must be at least {}",
                MIN_AVERAGING_WINDOW.as_millis()
            );
        }
        if self.check_interval_secs == 0 {
            bail!("check_interval_secs must be at least 1");
        }
        if self.ballast_block_mib == 0 {
            bail!("ballast_block_mib must be at least 1");
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn sample_window(&self) -> Duration {
        Duration::from_millis(self.sample_window_ms)
    }

    pub fn ballast_block_bytes(&self) -> usize {
        self.ballast_block_mib * 1024 * 1024
    }
}
