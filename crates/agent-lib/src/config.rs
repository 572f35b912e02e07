//! Migration configuration
//!
//! Read once at startup from a JSON file and passed by reference to the
//! orchestrator. A missing or malformed file is fatal.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default location of the migration config file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/vm_monitor/config.json";

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for '{field}': {message}")]
    Validation { field: String, message: String },
}

/// Target cloud and migration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Provider name (gcp, aws, azure); resolved when a migration starts
    #[serde(default = "default_cloud_provider")]
    pub cloud_provider: String,

    /// Machine type for the new instance
    #[serde(default = "default_instance_type")]
    pub instance_type: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Block device that is imaged
    #[serde(default = "default_source_device")]
    pub source_device: String,

    /// Scratch directory for the raw image and its archive
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Prefix privileged commands with sudo
    #[serde(default = "default_use_sudo")]
    pub use_sudo: bool,

    /// Name of the bootable image registered with the provider
    #[serde(default = "default_image_name")]
    pub image_name: String,

    /// Name of the launched instance
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    #[serde(default)]
    pub gcp_bucket: Option<String>,

    #[serde(default)]
    pub gcp_project: Option<String>,

    /// Defaults to `<region>-a`
    #[serde(default)]
    pub gcp_zone: Option<String>,
}

fn default_cloud_provider() -> String {
    "gcp".to_string()
}

fn default_instance_type() -> String {
    "n1-standard-2".to_string()
}

fn default_region() -> String {
    "us-central1".to_string()
}

fn default_source_device() -> String {
    "/dev/sda".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_use_sudo() -> bool {
    true
}

fn default_image_name() -> String {
    "local-vm-image".to_string()
}

fn default_instance_name() -> String {
    "migrated-vm".to_string()
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            cloud_provider: default_cloud_provider(),
            instance_type: default_instance_type(),
            region: default_region(),
            source_device: default_source_device(),
            work_dir: default_work_dir(),
            use_sudo: default_use_sudo(),
            image_name: default_image_name(),
            instance_name: default_instance_name(),
            gcp_bucket: None,
            gcp_project: None,
            gcp_zone: None,
        }
    }
}

impl MigrationConfig {
    /// Load the configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let parse_error = |e: config::ConfigError| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let config = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Json).required(true))
            .build()
            .map_err(parse_error)?;

        let parsed: MigrationConfig = config.try_deserialize().map_err(parse_error)?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Reject values no provider can work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("cloud_provider", &self.cloud_provider),
            ("instance_type", &self.instance_type),
            ("region", &self.region),
            ("source_device", &self.source_device),
            ("image_name", &self.image_name),
            ("instance_name", &self.instance_name),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation {
                    field: field.to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// GCP zone, falling back to `<region>-a`
    pub fn gcp_zone(&self) -> String {
        self.gcp_zone
            .clone()
            .unwrap_or_else(|| format!("{}-a", self.region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_applies_defaults() {
        let file = write_config("{}");
        let config = MigrationConfig::load(file.path()).unwrap();

        assert_eq!(config.cloud_provider, "gcp");
        assert_eq!(config.instance_type, "n1-standard-2");
        assert_eq!(config.region, "us-central1");
        assert_eq!(config.gcp_zone(), "us-central1-a");
        assert!(config.use_sudo);
    }

    #[test]
    fn test_load_gcp_fields() {
        let file = write_config(
            r#"{
                "cloud_provider": "gcp",
                "instance_type": "e2-standard-2",
                "region": "europe-west1",
                "gcp_bucket": "vm-images",
                "gcp_project": "demo-project",
                "gcp_zone": "europe-west1-c"
            }"#,
        );
        let config = MigrationConfig::load(file.path()).unwrap();

        assert_eq!(config.instance_type, "e2-standard-2");
        assert_eq!(config.gcp_bucket.as_deref(), Some("vm-images"));
        assert_eq!(config.gcp_project.as_deref(), Some("demo-project"));
        assert_eq!(config.gcp_zone(), "europe-west1-c");
    }

    #[test]
    fn test_unknown_provider_loads() {
        // Unknown providers are rejected when a migration is dispatched
        let file = write_config(r#"{ "cloud_provider": "oracle" }"#);
        let config = MigrationConfig::load(file.path()).unwrap();
        assert_eq!(config.cloud_provider, "oracle");
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = MigrationConfig::load(Path::new("/nonexistent/cloudlift/config.json"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let file = write_config("{ not json");
        let result = MigrationConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_empty_required_field_is_error() {
        let file = write_config(r#"{ "region": "  " }"#);
        let result = MigrationConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }
}
