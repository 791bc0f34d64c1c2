//! Subcommand implementations

pub mod detection;
pub mod status;
