//! Pod Healer service
//!
//! HTTP surface and configuration loading for the remediation engine. The
//! binary in `main.rs` wires these to a loaded model and cluster client.

pub mod api;
pub mod config;
