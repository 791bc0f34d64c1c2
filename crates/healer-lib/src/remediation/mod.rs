//! Remediation against the cluster orchestration API
//!
//! This module provides:
//! - The `ClusterApi` seam (lookup, terminate, scale)
//! - `RemediationExecutor`, which turns decided actions into cluster calls
//!   and never fails: every call ends in a descriptive outcome
//! - A kube-rs backed implementation and an in-process cluster for tests

mod executor;
mod kube_client;
mod memory;

pub use executor::{owning_deployment, RemediationConfig, RemediationExecutor, RemediationOutcome};
pub use kube_client::KubeClusterApi;
pub use memory::{ClusterCall, InMemoryCluster};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a named workload or deployment currently lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadLocation {
    pub name: String,
    pub namespace: String,
}

impl WorkloadLocation {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

/// Errors from cluster calls
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },
    #[error("{0}")]
    Api(String),
    #[error("cluster call timed out after {0}ms")]
    Timeout(u128),
}

/// Trait for cluster orchestration implementations
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Find a running workload by name across all namespaces
    async fn find_workload(&self, name: &str) -> Result<Option<WorkloadLocation>, ClusterError>;

    /// Terminate a workload with the given grace period
    async fn terminate_workload(
        &self,
        location: &WorkloadLocation,
        grace_period_seconds: u32,
    ) -> Result<(), ClusterError>;

    /// Find a deployment by name across all namespaces
    async fn find_deployment(&self, name: &str) -> Result<Option<WorkloadLocation>, ClusterError>;

    /// Patch the desired replica count of a deployment
    async fn set_desired_replicas(
        &self,
        location: &WorkloadLocation,
        replicas: i32,
    ) -> Result<(), ClusterError>;
}
