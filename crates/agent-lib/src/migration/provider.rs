//! Provider capability trait and dispatch

use super::command::{CommandError, CommandRunner, CommandSpec};
use crate::config::MigrationConfig;
use crate::models::MigrationPhase;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Name of the raw image file written by the imaging step
pub const RAW_IMAGE_FILE: &str = "disk.raw";

/// Supported provider names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Gcp,
    Aws,
    Azure,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gcp => "gcp",
            ProviderKind::Aws => "aws",
            ProviderKind::Azure => "azure",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gcp" => Ok(ProviderKind::Gcp),
            "aws" => Ok(ProviderKind::Aws),
            "azure" => Ok(ProviderKind::Azure),
            _ => Err(StepError::UnknownProvider(s.to_string())),
        }
    }
}

/// Failure of one migration step
#[derive(Debug, Error)]
pub enum StepError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("{provider} provider does not implement {operation}")]
    Unsupported {
        provider: ProviderKind,
        operation: &'static str,
    },

    #[error("missing configuration '{0}'")]
    MissingConfig(&'static str),

    #[error(transparent)]
    Command(#[from] CommandError),

    /// The transfer to object storage was started; a partial object may remain
    #[error("transfer to {uri} failed: {source}")]
    Transfer {
        uri: String,
        #[source]
        source: CommandError,
    },
}

impl StepError {
    /// Remote artifact that may have been left behind by this failure
    pub fn orphaned_artifact(&self) -> Option<&str> {
        match self {
            StepError::Transfer { uri, .. } => Some(uri),
            _ => None,
        }
    }
}

/// Everything a provider step needs from the outside
pub struct MigrationContext<'a> {
    pub config: &'a MigrationConfig,
    pub runner: &'a dyn CommandRunner,
}

impl<'a> MigrationContext<'a> {
    pub fn new(config: &'a MigrationConfig, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    /// Run a command, mapping failures into a step error
    pub async fn run(&self, command: CommandSpec) -> Result<(), StepError> {
        self.runner.run(&command).await?;
        Ok(())
    }

    pub fn raw_image_path(&self) -> PathBuf {
        self.config.work_dir.join(RAW_IMAGE_FILE)
    }
}

/// Compressed image stored in the provider's object storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedArtifact {
    pub local_path: PathBuf,
    pub uri: String,
}

/// Bootable image registered with the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredImage {
    pub name: String,
}

/// Instance launched from the registered image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedInstance {
    pub name: String,
    pub machine_type: String,
    pub zone: String,
}

/// Capability implemented once per cloud platform
///
/// Steps run strictly in declaration order; the orchestrator never calls a
/// step after an earlier one failed.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Check provider-specific configuration before anything is executed
    fn preflight(&self, _config: &MigrationConfig) -> Result<(), StepError> {
        Ok(())
    }

    /// Produce a raw block-level image of the system disk
    async fn image_disk(&self, ctx: &MigrationContext<'_>) -> Result<PathBuf, StepError>;

    /// Compress the image and transfer it to object storage
    async fn upload_image(
        &self,
        ctx: &MigrationContext<'_>,
        image: &Path,
    ) -> Result<UploadedArtifact, StepError>;

    /// Register the uploaded artifact as a bootable image
    async fn register_image(
        &self,
        ctx: &MigrationContext<'_>,
        artifact: &UploadedArtifact,
    ) -> Result<RegisteredImage, StepError>;

    /// Launch an instance from the registered image
    async fn launch_instance(
        &self,
        ctx: &MigrationContext<'_>,
        image: &RegisteredImage,
    ) -> Result<LaunchedInstance, StepError>;
}

/// Raw `dd` image of the configured source device
pub(crate) fn dd_image_command(config: &MigrationConfig, output: &Path) -> CommandSpec {
    CommandSpec::new("dd")
        .arg(format!("if={}", config.source_device))
        .arg(format!("of={}", output.display()))
        .args(["bs=4M", "conv=sparse"])
        .privileged(config.use_sudo)
}

/// Provider variants keyed by kind
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn CloudProvider>>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// GCP implemented, AWS and Azure declared but unsupported
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(super::GcpProvider::new()));
        registry.register(Arc::new(super::UnsupportedProvider::new(ProviderKind::Aws)));
        registry.register(Arc::new(super::UnsupportedProvider::new(ProviderKind::Azure)));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn CloudProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    /// Resolve a configured provider name
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn CloudProvider>, StepError> {
        let kind = ProviderKind::from_str(name)?;
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| StepError::UnknownProvider(name.to_string()))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Phase label used in failure reasons
pub(crate) fn step_name(phase: MigrationPhase) -> &'static str {
    match phase {
        MigrationPhase::Imaging => "imaging",
        MigrationPhase::Uploading => "upload",
        MigrationPhase::RemoteProvisioning => "remote provisioning",
        MigrationPhase::Idle => "dispatch",
        MigrationPhase::Completed | MigrationPhase::Failed => "migration",
    }
}
