//! Pod remediation engine
//!
//! This crate provides the core functionality for:
//! - Rule-based and sequence-reconstruction anomaly detection
//! - Action selection with protected-workload and per-pass dedup rules
//! - Remediation against the cluster orchestration API
//! - Metric collection, windowed storage, health checks and observability

pub mod anomaly;
pub mod config;
pub mod engine;
pub mod health;
pub mod model;
pub mod models;
pub mod observability;
pub mod policy;
pub mod protected;
pub mod remediation;
pub mod source;
pub mod store;

pub use config::EngineConfig;
pub use engine::RemediationEngine;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{HealerMetrics, StructuredLogger};
pub use protected::ProtectedSet;
