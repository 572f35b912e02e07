//! Declared-but-unimplemented provider variants (AWS, Azure)

use super::provider::{
    CloudProvider, LaunchedInstance, MigrationContext, ProviderKind, RegisteredImage, StepError,
    UploadedArtifact,
};
use crate::config::MigrationConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Provider whose every step reports "not implemented"
#[derive(Debug, Clone)]
pub struct UnsupportedProvider {
    kind: ProviderKind,
}

impl UnsupportedProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self { kind }
    }

    fn unsupported(&self, operation: &'static str) -> StepError {
        StepError::Unsupported {
            provider: self.kind,
            operation,
        }
    }
}

#[async_trait]
impl CloudProvider for UnsupportedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn preflight(&self, _config: &MigrationConfig) -> Result<(), StepError> {
        Err(self.unsupported("migration"))
    }

    async fn image_disk(&self, _ctx: &MigrationContext<'_>) -> Result<PathBuf, StepError> {
        Err(self.unsupported("disk imaging"))
    }

    async fn upload_image(
        &self,
        _ctx: &MigrationContext<'_>,
        _image: &Path,
    ) -> Result<UploadedArtifact, StepError> {
        Err(self.unsupported("image upload"))
    }

    async fn register_image(
        &self,
        _ctx: &MigrationContext<'_>,
        _artifact: &UploadedArtifact,
    ) -> Result<RegisteredImage, StepError> {
        Err(self.unsupported("image registration"))
    }

    async fn launch_instance(
        &self,
        _ctx: &MigrationContext<'_>,
        _image: &RegisteredImage,
    ) -> Result<LaunchedInstance, StepError> {
        Err(self.unsupported("instance launch"))
    }
}
