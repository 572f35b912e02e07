//! Monitor control loop
//!
//! Ties the sampler, the overload detector and the migration orchestrator
//! together: sample, record, evaluate, and migrate at most once per
//! qualifying window.

mod r#loop;


pub use r#loop::{CycleOutcome, LoopExit, MonitorConfig, MonitorLoop, MonitorLoopBuilder};
