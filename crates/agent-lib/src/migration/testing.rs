//! Test doubles for the command boundary

use super::command::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use crate::config::MigrationConfig;
use async_trait::async_trait;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Records every command and fails the first one whose tool matches
#[derive(Default)]
pub(crate) struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    fail_on: Option<&'static str>,
}

impl RecordingRunner {
    pub(crate) fn failing_on(tool: &'static str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: Some(tool),
        }
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Tool names in call order, with the gcloud resource kind spelled out
    pub(crate) fn tools(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| match c.tool() {
                "gcloud" => format!("gcloud {}", c.args[1]),
                tool => tool.to_string(),
            })
            .collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.calls.lock().unwrap().push(command.clone());
        if self.fail_on == Some(command.tool()) {
            return Err(CommandError::NonZeroExit {
                program: command.tool().to_string(),
                code: Some(1),
                stderr: "permission denied".to_string(),
            });
        }
        Ok(CommandOutput::default())
    }
}

/// GCP config with bucket and project set and sudo disabled
pub(crate) fn gcp_config() -> MigrationConfig {
    MigrationConfig {
        gcp_bucket: Some("vm-images".to_string()),
        gcp_project: Some("demo".to_string()),
        use_sudo: false,
        ..MigrationConfig::default()
    }
}

/// In-memory sink for formatted log lines
#[derive(Clone, Default)]
pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Occurrences of `needle` across every captured line
    pub(crate) fn count(&self, needle: &str) -> usize {
        self.contents().matches(needle).count()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Route this thread's INFO-and-above events into a buffer until the guard drops
pub(crate) fn capture_logs() -> (tracing::subscriber::DefaultGuard, LogBuffer) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (tracing::subscriber::set_default(subscriber), buffer)
}
