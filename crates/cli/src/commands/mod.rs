//! CLI command implementations

pub mod config_check;
pub mod load;
pub mod status;
