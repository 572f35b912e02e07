//! External command boundary
//!
//! Every migration step shells out to a tool (dd, tar, gsutil, gcloud).
//! Invocations are synchronous from the orchestrator's point of view and a
//! non-zero exit is an error carrying the exit status and stderr.

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Maximum number of stderr bytes kept in an error
const STDERR_LIMIT: usize = 2048;

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Prefix with `sudo` when `enabled`
    pub fn privileged(self, enabled: bool) -> Self {
        if !enabled {
            return self;
        }
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: "sudo".to_string(),
            args,
        }
    }

    /// Name of the tool actually doing the work, skipping a sudo prefix
    pub fn tool(&self) -> &str {
        if self.program == "sudo" {
            self.args.first().map(String::as_str).unwrap_or("sudo")
        } else {
            &self.program
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Errors at the external command boundary
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {}: {stderr}", status_text(.code))]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn status_text(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// Trait for running external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion and check its exit status
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Runs commands as child processes of the agent
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, CommandError> {
        debug!(command = %command, "Running external command");

        let output = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                program: command.tool().to_string(),
                source,
            })?;

        let stderr = truncate(String::from_utf8_lossy(&output.stderr).trim());

        if !output.status.success() {
            return Err(CommandError::NonZeroExit {
                program: command.tool().to_string(),
                code: output.status.code(),
                stderr,
            });
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }
}

/// Keep the tail of long stderr output, where tools print the actual error
fn truncate(text: &str) -> String {
    if text.len() <= STDERR_LIMIT {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_LIMIT;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privileged_prefixes_sudo() {
        let cmd = CommandSpec::new("dd").arg("if=/dev/sda").privileged(true);
        assert_eq!(cmd.program, "sudo");
        assert_eq!(cmd.args, vec!["dd", "if=/dev/sda"]);
        assert_eq!(cmd.tool(), "dd");
        assert_eq!(cmd.to_string(), "sudo dd if=/dev/sda");

        let plain = CommandSpec::new("gcloud").privileged(false);
        assert_eq!(plain.program, "gcloud");
        assert_eq!(plain.tool(), "gcloud");
    }

    #[test]
    fn test_truncate_keeps_tail() {
        let long = "x".repeat(STDERR_LIMIT + 10) + "END";
        let truncated = truncate(&long);
        assert!(truncated.starts_with("..."));
        assert!(truncated.ends_with("END"));
        assert_eq!(truncate("short"), "short");
    }

    #[tokio::test]
    async fn test_system_runner_success() {
        let runner = SystemCommandRunner::new();
        let output = runner
            .run(&CommandSpec::new("sh").args(["-c", "echo hello"]))
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_system_runner_non_zero_exit() {
        let runner = SystemCommandRunner::new();
        let err = runner
            .run(&CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 3"]))
            .await
            .unwrap_err();

        match err {
            CommandError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let runner = SystemCommandRunner::new();
        let err = runner
            .run(&CommandSpec::new("cloudlift-no-such-tool"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
        assert!(err.to_string().contains("cloudlift-no-such-tool"));
    }
}
