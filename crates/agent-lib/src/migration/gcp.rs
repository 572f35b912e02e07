//! Google Cloud variant
//!
//! Image import on GCP expects a gzip'd tarball holding a single `disk.raw`
//! in a Cloud Storage bucket. The archive is uploaded with `gsutil`, then
//! `gcloud` registers the image and creates the instance.

use super::command::CommandSpec;
use super::provider::{
    dd_image_command, CloudProvider, LaunchedInstance, MigrationContext, ProviderKind,
    RegisteredImage, StepError, UploadedArtifact, RAW_IMAGE_FILE,
};
use crate::config::MigrationConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct GcpProvider;

impl GcpProvider {
    pub fn new() -> Self {
        Self
    }

    fn bucket(config: &MigrationConfig) -> Result<&str, StepError> {
        non_empty(config.gcp_bucket.as_deref()).ok_or(StepError::MissingConfig("gcp_bucket"))
    }

    fn project(config: &MigrationConfig) -> Result<&str, StepError> {
        non_empty(config.gcp_project.as_deref()).ok_or(StepError::MissingConfig("gcp_project"))
    }

    fn archive_name(config: &MigrationConfig) -> String {
        format!("{}.tar.gz", config.image_name)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[async_trait]
impl CloudProvider for GcpProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gcp
    }

    fn preflight(&self, config: &MigrationConfig) -> Result<(), StepError> {
        Self::bucket(config)?;
        Self::project(config)?;
        Ok(())
    }

    async fn image_disk(&self, ctx: &MigrationContext<'_>) -> Result<PathBuf, StepError> {
        let output = ctx.raw_image_path();
        ctx.run(dd_image_command(ctx.config, &output)).await?;
        Ok(output)
    }

    async fn upload_image(
        &self,
        ctx: &MigrationContext<'_>,
        image: &Path,
    ) -> Result<UploadedArtifact, StepError> {
        let bucket = Self::bucket(ctx.config)?;
        let archive_name = Self::archive_name(ctx.config);
        let archive = ctx.config.work_dir.join(&archive_name);
        let image_dir = image.parent().unwrap_or(ctx.config.work_dir.as_path());
        let image_file = image
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(RAW_IMAGE_FILE);

        // -S keeps the sparse raw image small
        ctx.run(
            CommandSpec::new("tar")
                .arg("-czSf")
                .arg(archive.display().to_string())
                .arg("-C")
                .arg(image_dir.display().to_string())
                .arg(image_file)
                .privileged(ctx.config.use_sudo),
        )
        .await?;

        let uri = format!("gs://{}/{}", bucket, archive_name);
        let transfer = CommandSpec::new("gsutil")
            .arg("cp")
            .arg(archive.display().to_string())
            .arg(&uri)
            .privileged(ctx.config.use_sudo);
        if let Err(e) = ctx.run(transfer).await {
            return Err(match e {
                StepError::Command(source) => StepError::Transfer { uri, source },
                other => other,
            });
        }

        info!(uri = %uri, "Disk image uploaded");

        Ok(UploadedArtifact {
            local_path: archive,
            uri,
        })
    }

    async fn register_image(
        &self,
        ctx: &MigrationContext<'_>,
        artifact: &UploadedArtifact,
    ) -> Result<RegisteredImage, StepError> {
        let project = Self::project(ctx.config)?;
        let name = ctx.config.image_name.clone();

        ctx.run(
            CommandSpec::new("gcloud")
                .args(["compute", "images", "create"])
                .arg(&name)
                .arg("--source-uri")
                .arg(&artifact.uri)
                .arg("--project")
                .arg(project),
        )
        .await?;

        Ok(RegisteredImage { name })
    }

    async fn launch_instance(
        &self,
        ctx: &MigrationContext<'_>,
        image: &RegisteredImage,
    ) -> Result<LaunchedInstance, StepError> {
        let project = Self::project(ctx.config)?;
        let zone = ctx.config.gcp_zone();
        let name = ctx.config.instance_name.clone();

        ctx.run(
            CommandSpec::new("gcloud")
                .args(["compute", "instances", "create"])
                .arg(&name)
                .arg("--image")
                .arg(&image.name)
                .arg("--machine-type")
                .arg(&ctx.config.instance_type)
                .arg("--zone")
                .arg(&zone)
                .arg("--project")
                .arg(project),
        )
        .await?;

        Ok(LaunchedInstance {
            name,
            machine_type: ctx.config.instance_type.clone(),
            zone,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gcp_config() -> MigrationConfig {
        MigrationConfig {
            gcp_bucket: Some("vm-images".to_string()),
            gcp_project: Some("demo".to_string()),
            use_sudo: false,
            ..MigrationConfig::default()
        }
    }

    #[test]
    fn test_preflight_requires_bucket_and_project() {
        let provider = GcpProvider::new();
        assert!(provider.preflight(&gcp_config()).is_ok());

        let missing_bucket = MigrationConfig {
            gcp_bucket: Some("  ".to_string()),
            ..gcp_config()
        };
        assert!(matches!(
            provider.preflight(&missing_bucket),
            Err(StepError::MissingConfig("gcp_bucket"))
        ));

        let missing_project = MigrationConfig {
            gcp_project: None,
            ..gcp_config()
        };
        assert!(matches!(
            provider.preflight(&missing_project),
            Err(StepError::MissingConfig("gcp_project"))
        ));
    }

    #[test]
    fn test_archive_name_follows_image_name() {
        let config = MigrationConfig {
            image_name: "web-01".to_string(),
            ..gcp_config()
        };
        assert_eq!(GcpProvider::archive_name(&config), "web-01.tar.gz");
    }
}
