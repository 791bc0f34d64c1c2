//! In-process cluster
//!
//! Holds workloads and deployments in memory and records every call, so
//! tests and local runs can exercise the full remediation path without a
//! real API server.

use super::{ClusterApi, ClusterError, WorkloadLocation};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A call received by the in-memory cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    FindWorkload { name: String },
    Terminate { name: String, namespace: String, grace_period_seconds: u32 },
    FindDeployment { name: String },
    SetReplicas { name: String, namespace: String, replicas: i32 },
}

impl ClusterCall {
    pub fn is_mutation(&self) -> bool {
        matches!(self, ClusterCall::Terminate { .. } | ClusterCall::SetReplicas { .. })
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    workloads: HashMap<String, String>,
    deployments: HashMap<String, (String, i32)>,
    calls: Vec<ClusterCall>,
    mutation_error: Option<String>,
    latency: Option<Duration>,
    remove_after_lookup: bool,
}

/// Cluster backed by in-memory maps
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    state: Mutex<ClusterState>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_workload(&self, name: impl Into<String>, namespace: impl Into<String>) {
        self.state().workloads.insert(name.into(), namespace.into());
    }

    pub fn add_deployment(&self, name: impl Into<String>, namespace: impl Into<String>, replicas: i32) {
        self.state()
            .deployments
            .insert(name.into(), (namespace.into(), replicas));
    }

    /// Make every subsequent mutating call fail with the given message
    pub fn fail_mutations_with(&self, message: impl Into<String>) {
        self.state().mutation_error = Some(message.into());
    }

    /// Drop every object right after it is looked up, as if it was deleted
    /// concurrently between lookup and action
    pub fn remove_after_lookup(&self) {
        self.state().remove_after_lookup = true;
    }

    /// Delay every call, for timeout handling
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = Some(latency);
    }

    pub fn replicas(&self, deployment: &str) -> Option<i32> {
        self.state().deployments.get(deployment).map(|(_, r)| *r)
    }

    pub fn has_workload(&self, name: &str) -> bool {
        self.state().workloads.contains_key(name)
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.state().calls.clone()
    }

    pub fn mutations(&self) -> Vec<ClusterCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    async fn record(&self, call: ClusterCall) {
        let latency = {
            let mut state = self.state();
            state.calls.push(call);
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ClusterApi for InMemoryCluster {
    async fn find_workload(&self, name: &str) -> Result<Option<WorkloadLocation>, ClusterError> {
        self.record(ClusterCall::FindWorkload {
            name: name.to_string(),
        })
        .await;
        let mut state = self.state();
        let location = state
            .workloads
            .get(name)
            .map(|ns| WorkloadLocation::new(name, ns.clone()));
        if state.remove_after_lookup {
            state.workloads.remove(name);
        }
        Ok(location)
    }

    async fn terminate_workload(
        &self,
        location: &WorkloadLocation,
        grace_period_seconds: u32,
    ) -> Result<(), ClusterError> {
        self.record(ClusterCall::Terminate {
            name: location.name.clone(),
            namespace: location.namespace.clone(),
            grace_period_seconds,
        })
        .await;

        let mut state = self.state();
        if let Some(err) = &state.mutation_error {
            return Err(ClusterError::Api(err.clone()));
        }
        state
            .workloads
            .remove(&location.name)
            .map(|_| ())
            .ok_or_else(|| ClusterError::NotFound {
                kind: "Pod",
                name: location.name.clone(),
            })
    }

    async fn find_deployment(&self, name: &str) -> Result<Option<WorkloadLocation>, ClusterError> {
        self.record(ClusterCall::FindDeployment {
            name: name.to_string(),
        })
        .await;
        let mut state = self.state();
        let location = state
            .deployments
            .get(name)
            .map(|(ns, _)| WorkloadLocation::new(name, ns.clone()));
        if state.remove_after_lookup {
            state.deployments.remove(name);
        }
        Ok(location)
    }

    async fn set_desired_replicas(
        &self,
        location: &WorkloadLocation,
        replicas: i32,
    ) -> Result<(), ClusterError> {
        self.record(ClusterCall::SetReplicas {
            name: location.name.clone(),
            namespace: location.namespace.clone(),
            replicas,
        })
        .await;

        let mut state = self.state();
        if let Some(err) = &state.mutation_error {
            return Err(ClusterError::Api(err.clone()));
        }
        match state.deployments.get_mut(&location.name) {
            Some((_, current)) => {
                *current = replicas;
                Ok(())
            }
            None => Err(ClusterError::NotFound {
                kind: "Deployment",
                name: location.name.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_terminate_removes_workload() {
        let cluster = InMemoryCluster::new();
        cluster.add_workload("web-abc-123", "default");
        let location = cluster.find_workload("web-abc-123").await.unwrap().unwrap();
        assert_eq!(location.namespace, "default");

        cluster.terminate_workload(&location, 0).await.unwrap();
        assert!(!cluster.has_workload("web-abc-123"));
        assert_eq!(cluster.calls().len(), 2);
        assert_eq!(cluster.mutations().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_deployment() {
        let cluster = InMemoryCluster::new();
        assert!(cluster.find_deployment("nope").await.unwrap().is_none());
        let err = cluster
            .set_desired_replicas(&WorkloadLocation::new("nope", "default"), 3)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Deployment nope not found");
    }
}
