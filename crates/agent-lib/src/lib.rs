//! Agent library for host overload monitoring and cloud migration
//!
//! This crate provides the core functionality for:
//! - Host CPU, memory and disk sampling
//! - Sustained overload detection
//! - One-shot migration of the host disk to a cloud provider
//! - Synthetic load generation for the dashboard
//! - Health checks and observability

pub mod config;
pub mod detector;
pub mod health;
pub mod load;
pub mod migration;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod sampler;
pub mod status;

pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use status::{MonitorPhase, MonitorStatus, StatusBoard};
