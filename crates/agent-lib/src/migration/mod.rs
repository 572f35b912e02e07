//! Cloud migration orchestration
//!
//! This module provides:
//! - The external command boundary (`CommandRunner`)
//! - Provider variants behind the `CloudProvider` capability trait
//! - The orchestrator that runs one migration attempt end to end

mod command;
mod gcp;
mod orchestrator;
mod provider;
mod unsupported;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{CommandError, CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
pub use gcp::GcpProvider;
pub use orchestrator::MigrationOrchestrator;
pub use provider::{
    CloudProvider, LaunchedInstance, MigrationContext, ProviderKind, ProviderRegistry,
    RegisteredImage, StepError, UploadedArtifact,
};
pub use unsupported::UnsupportedProvider;
