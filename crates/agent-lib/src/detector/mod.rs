//! Sustained-overload detection
//!
//! Keeps a bounded, ordered history of host samples and decides when
//! utilization has stayed above the threshold long enough to justify a
//! migration.

mod overload;

pub use overload::{
    OverloadDetector, UsageHistory, DEFAULT_CONSECUTIVE_CHECKS, DEFAULT_THRESHOLD_PERCENT,
};
