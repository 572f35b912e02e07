//! Migration orchestrator
//!
//! Runs one attempt as `Idle -> Imaging -> Uploading -> RemoteProvisioning
//! -> Completed`, or stops in `Failed` at the first error. There is no resume
//! and no rollback; every failure inside a step is converted into a
//! `MigrationResult` and never escapes `migrate()`.

use super::command::CommandRunner;
use super::provider::{
    step_name, CloudProvider, LaunchedInstance, MigrationContext, ProviderRegistry, StepError,
};
use crate::config::MigrationConfig;
use crate::models::{MigrationPhase, MigrationResult};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::status::StatusBoard;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Executes migration attempts against the configured provider
pub struct MigrationOrchestrator {
    runner: Arc<dyn CommandRunner>,
    providers: ProviderRegistry,
    logger: StructuredLogger,
    metrics: AgentMetrics,
    status: Option<StatusBoard>,
    phase: Mutex<MigrationPhase>,
    in_flight: AtomicBool,
    attempts: AtomicU32,
}

/// Step failure tagged with the phase it happened in
type PhaseError = (MigrationPhase, StepError);

impl MigrationOrchestrator {
    pub fn new(runner: Arc<dyn CommandRunner>, logger: StructuredLogger) -> Self {
        Self {
            runner,
            providers: ProviderRegistry::with_defaults(),
            logger,
            metrics: AgentMetrics::new(),
            status: None,
            phase: Mutex::new(MigrationPhase::Idle),
            in_flight: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
        }
    }

    /// Replace the provider registry
    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    /// Publish phase changes to a status board
    pub fn with_status(mut self, status: StatusBoard) -> Self {
        self.status = Some(status);
        self
    }

    /// Phase of the current or last attempt
    pub fn phase(&self) -> MigrationPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of attempts started so far
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Run one migration attempt
    pub async fn migrate(&self, config: &MigrationConfig) -> MigrationResult {
        let provider_name = config.cloud_provider.as_str();

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return MigrationResult::failure(
                provider_name,
                MigrationPhase::Idle,
                "a migration attempt is already in progress",
                0,
            );
        }

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        self.metrics.inc_migration_attempts();
        self.logger.log_migration_started(provider_name, attempt);
        self.enter(provider_name, MigrationPhase::Idle).await;

        let outcome = self.run_steps(config).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(instance) => {
                self.enter(provider_name, MigrationPhase::Completed).await;
                self.logger
                    .log_migration_completed(provider_name, &instance.name, duration_ms);
                MigrationResult::success(provider_name, instance.name, duration_ms)
            }
            Err((phase, error)) => {
                let step = step_name(phase);
                let reason = format!("{} failed: {}", step, error);
                self.enter(provider_name, MigrationPhase::Failed).await;
                self.metrics.inc_migration_failures();
                self.logger.log_migration_failed(provider_name, step, &reason);
                MigrationResult::failure(provider_name, phase, reason, duration_ms)
            }
        };

        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn run_steps(&self, config: &MigrationConfig) -> Result<LaunchedInstance, PhaseError> {
        let provider_name = config.cloud_provider.as_str();

        // Dispatch and preflight run before any external command
        let provider = self
            .providers
            .resolve(provider_name)
            .map_err(|e| (MigrationPhase::Idle, e))?;
        provider
            .preflight(config)
            .map_err(|e| (MigrationPhase::Idle, e))?;

        let ctx = MigrationContext::new(config, self.runner.as_ref());

        self.enter(provider_name, MigrationPhase::Imaging).await;
        let image = self
            .timed(MigrationPhase::Imaging, provider.image_disk(&ctx))
            .await?;

        self.enter(provider_name, MigrationPhase::Uploading).await;
        let artifact = match self
            .timed(MigrationPhase::Uploading, provider.upload_image(&ctx, &image))
            .await
        {
            Ok(artifact) => artifact,
            Err((phase, e)) => {
                if let Some(artifact) = e.orphaned_artifact() {
                    self.logger.log_orphaned_artifact(provider_name, artifact);
                }
                return Err((phase, e));
            }
        };

        self.enter(provider_name, MigrationPhase::RemoteProvisioning).await;
        let provisioned = self
            .timed(
                MigrationPhase::RemoteProvisioning,
                provision(provider.as_ref(), &ctx, &artifact),
            )
            .await;

        if provisioned.is_err() {
            self.logger.log_orphaned_artifact(provider_name, &artifact.uri);
        }
        provisioned
    }

    async fn timed<T>(
        &self,
        phase: MigrationPhase,
        step: impl Future<Output = Result<T, StepError>>,
    ) -> Result<T, PhaseError> {
        let started = Instant::now();
        let result = step.await;
        self.metrics
            .observe_step_duration(step_name(phase), started.elapsed().as_secs_f64());
        result.map_err(|e| (phase, e))
    }

    async fn enter(&self, provider: &str, phase: MigrationPhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
        if matches!(
            phase,
            MigrationPhase::Imaging | MigrationPhase::Uploading | MigrationPhase::RemoteProvisioning
        ) {
            self.logger.log_migration_step(provider, step_name(phase));
        }
        if let Some(status) = &self.status {
            status.set_migration_phase(phase).await;
        }
    }
}

/// Register the image, then launch from it; launch never runs after a failed registration
async fn provision(
    provider: &dyn CloudProvider,
    ctx: &MigrationContext<'_>,
    artifact: &super::provider::UploadedArtifact,
) -> Result<LaunchedInstance, StepError> {
    let image = provider.register_image(ctx, artifact).await?;
    provider.launch_instance(ctx, &image).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::testing::{capture_logs, gcp_config, RecordingRunner};
    use crate::observability::{
        MIGRATION_COMPLETED_PHRASE, MIGRATION_FAILED_PHRASE, MIGRATION_STARTED_PHRASE,
    };
    use crate::migration::ProviderKind;
    use crate::status::MonitorStatus;

    fn orchestrator(runner: Arc<RecordingRunner>) -> MigrationOrchestrator {
        MigrationOrchestrator::new(runner, StructuredLogger::new("test-host"))
    }

    #[tokio::test]
    async fn test_successful_migration_runs_steps_in_order() {
        let runner = Arc::new(RecordingRunner::default());
        let orchestrator = orchestrator(runner.clone());

        let result = orchestrator.migrate(&gcp_config()).await;

        assert!(result.succeeded, "{:?}", result.failure_reason);
        assert_eq!(result.instance_name.as_deref(), Some("migrated-vm"));
        assert_eq!(orchestrator.phase(), MigrationPhase::Completed);
        assert_eq!(
            runner.tools(),
            vec!["dd", "tar", "gsutil", "gcloud images", "gcloud instances"]
        );

        let calls = runner.calls();
        assert_eq!(
            calls[2].to_string(),
            "gsutil cp /tmp/local-vm-image.tar.gz gs://vm-images/local-vm-image.tar.gz"
        );
        assert_eq!(
            calls[4].to_string(),
            "gcloud compute instances create migrated-vm --image local-vm-image \
             --machine-type n1-standard-2 --zone us-central1-a --project demo"
        );
    }

    #[tokio::test]
    async fn test_imaging_failure_skips_later_steps() {
        let runner = Arc::new(RecordingRunner::failing_on("dd"));
        let orchestrator = orchestrator(runner.clone());

        let result = orchestrator.migrate(&gcp_config()).await;

        assert!(!result.succeeded);
        assert_eq!(result.failed_phase, Some(MigrationPhase::Imaging));
        let reason = result.failure_reason.unwrap();
        assert!(reason.starts_with("imaging failed"), "{reason}");
        assert!(reason.contains("permission denied"), "{reason}");
        assert_eq!(runner.tools(), vec!["dd"]);
        assert_eq!(orchestrator.phase(), MigrationPhase::Failed);
    }

    #[tokio::test]
    async fn test_upload_failure_reports_upload_step() {
        let runner = Arc::new(RecordingRunner::failing_on("gsutil"));
        let result = orchestrator(runner.clone()).migrate(&gcp_config()).await;

        assert!(!result.succeeded);
        assert_eq!(result.failed_phase, Some(MigrationPhase::Uploading));
        assert!(result.failure_reason.unwrap().starts_with("upload failed"));
        assert_eq!(runner.tools(), vec!["dd", "tar", "gsutil"]);
    }

    #[tokio::test]
    async fn test_registration_failure_skips_launch() {
        let runner = Arc::new(RecordingRunner::failing_on("gcloud"));
        let result = orchestrator(runner.clone()).migrate(&gcp_config()).await;

        assert!(!result.succeeded);
        assert_eq!(result.failed_phase, Some(MigrationPhase::RemoteProvisioning));
        assert_eq!(runner.tools(), vec!["dd", "tar", "gsutil", "gcloud images"]);
    }

    #[tokio::test]
    async fn test_unknown_provider_invokes_nothing() {
        let runner = Arc::new(RecordingRunner::default());
        let config = MigrationConfig {
            cloud_provider: "oracle".to_string(),
            ..gcp_config()
        };

        let result = orchestrator(runner.clone()).migrate(&config).await;

        assert!(!result.succeeded);
        assert!(result.failure_reason.unwrap().contains("unknown provider"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_provider_reports_not_implemented() {
        let runner = Arc::new(RecordingRunner::default());
        let config = MigrationConfig {
            cloud_provider: "azure".to_string(),
            ..gcp_config()
        };

        let result = orchestrator(runner.clone()).migrate(&config).await;

        assert!(!result.succeeded);
        assert!(result.failure_reason.unwrap().contains("does not implement"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_gcp_settings_fail_before_imaging() {
        let runner = Arc::new(RecordingRunner::default());
        let config = MigrationConfig {
            gcp_bucket: None,
            ..gcp_config()
        };

        let result = orchestrator(runner.clone()).migrate(&config).await;

        assert!(!result.succeeded);
        assert!(result.failure_reason.unwrap().contains("gcp_bucket"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_attempt_allows_a_new_one() {
        let runner = Arc::new(RecordingRunner::failing_on("dd"));
        let orchestrator = orchestrator(runner.clone());

        assert!(!orchestrator.migrate(&gcp_config()).await.succeeded);
        assert!(!orchestrator.migrate(&gcp_config()).await.succeeded);
        assert_eq!(orchestrator.attempts(), 2);
        assert_eq!(runner.tools(), vec!["dd", "dd"]);
    }

    #[tokio::test]
    async fn test_custom_registry() {
        let runner = Arc::new(RecordingRunner::default());
        let mut registry = ProviderRegistry::empty();
        registry.register(Arc::new(crate::migration::UnsupportedProvider::new(
            ProviderKind::Gcp,
        )));

        let result = orchestrator(runner.clone())
            .with_providers(registry)
            .migrate(&gcp_config())
            .await;

        assert!(!result.succeeded);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_status_board_tracks_phase() {
        let runner = Arc::new(RecordingRunner::failing_on("tar"));
        let board = StatusBoard::new(MonitorStatus::new("gcp", 75.0, 3));
        let orchestrator = orchestrator(runner).with_status(board.clone());

        orchestrator.migrate(&gcp_config()).await;

        assert_eq!(
            board.snapshot().await.migration_phase,
            Some(MigrationPhase::Failed)
        );
    }

    #[tokio::test]
    async fn test_success_logs_each_phrase_once() {
        let (_guard, logs) = capture_logs();
        let runner = Arc::new(RecordingRunner::default());

        assert!(orchestrator(runner).migrate(&gcp_config()).await.succeeded);

        assert_eq!(logs.count(MIGRATION_STARTED_PHRASE), 1);
        assert_eq!(logs.count(MIGRATION_COMPLETED_PHRASE), 1);
        assert_eq!(logs.count(MIGRATION_FAILED_PHRASE), 0);
    }

    #[tokio::test]
    async fn test_failure_logs_each_phrase_once() {
        let (_guard, logs) = capture_logs();
        let runner = Arc::new(RecordingRunner::failing_on("gcloud"));

        assert!(!orchestrator(runner).migrate(&gcp_config()).await.succeeded);

        assert_eq!(logs.count(MIGRATION_STARTED_PHRASE), 1);
        assert_eq!(logs.count(MIGRATION_FAILED_PHRASE), 1);
        assert_eq!(logs.count(MIGRATION_COMPLETED_PHRASE), 0);
    }

    #[tokio::test]
    async fn test_dispatch_failure_logs_each_phrase_once() {
        let (_guard, logs) = capture_logs();
        let config = MigrationConfig {
            cloud_provider: "oracle".to_string(),
            ..gcp_config()
        };

        orchestrator(Arc::new(RecordingRunner::default()))
            .migrate(&config)
            .await;

        assert_eq!(logs.count(MIGRATION_STARTED_PHRASE), 1);
        assert_eq!(logs.count(MIGRATION_FAILED_PHRASE), 1);
    }

    #[tokio::test]
    async fn test_archive_failure_orphans_nothing() {
        let (_guard, logs) = capture_logs();
        let runner = Arc::new(RecordingRunner::failing_on("tar"));

        let result = orchestrator(runner.clone()).migrate(&gcp_config()).await;

        assert_eq!(result.failed_phase, Some(MigrationPhase::Uploading));
        assert_eq!(runner.tools(), vec!["dd", "tar"]);
        assert_eq!(logs.count("artifact_orphaned"), 0);
    }

    #[tokio::test]
    async fn test_transfer_failure_names_orphaned_object() {
        let (_guard, logs) = capture_logs();
        let runner = Arc::new(RecordingRunner::failing_on("gsutil"));

        let result = orchestrator(runner).migrate(&gcp_config()).await;

        let reason = result.failure_reason.unwrap();
        assert!(reason.contains("gs://vm-images/local-vm-image.tar.gz"), "{reason}");
        assert!(reason.contains("permission denied"), "{reason}");
        assert_eq!(logs.count("artifact_orphaned"), 1);
        assert!(logs.contents().contains("gs://vm-images/local-vm-image.tar.gz"));
    }

    #[tokio::test]
    async fn test_provisioning_failure_orphans_uploaded_object() {
        let (_guard, logs) = capture_logs();
        let runner = Arc::new(RecordingRunner::failing_on("gcloud"));

        orchestrator(runner).migrate(&gcp_config()).await;

        assert_eq!(logs.count("artifact_orphaned"), 1);
    }
}
