//! Remediation executor
//!
//! Restart and scale operations with soft-fail reporting. Each cluster call
//! is bounded by the configured timeout, and protected workloads are
//! rejected here too, even when the caller already checked.

use super::{ClusterApi, ClusterError};
use crate::models::Action;
use crate::protected::ProtectedSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default replica target for scale actions
pub const DEFAULT_SCALE_REPLICAS: i32 = 3;

/// Default bound on a single cluster call
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;

/// Configuration for remediation calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationConfig {
    #[serde(default = "default_scale_replicas")]
    pub scale_replicas: i32,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_scale_replicas() -> i32 {
    DEFAULT_SCALE_REPLICAS
}

fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            scale_replicas: DEFAULT_SCALE_REPLICAS,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }
}

/// Outcome of a remediation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationOutcome {
    Restarted { workload: String, namespace: String },
    Scaled { deployment: String, replicas: i32, namespace: String },
    NotFound { kind: &'static str, name: String },
    RestartFailed(String),
    ScaleFailed(String),
    Protected,
    AlertOnly,
}

impl RemediationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            RemediationOutcome::Restarted { .. } | RemediationOutcome::Scaled { .. }
        )
    }

    /// Short label used for metrics
    pub fn result_label(&self) -> &'static str {
        match self {
            RemediationOutcome::Restarted { .. } | RemediationOutcome::Scaled { .. } => "success",
            RemediationOutcome::NotFound { .. } => "not_found",
            RemediationOutcome::RestartFailed(_) | RemediationOutcome::ScaleFailed(_) => "failed",
            RemediationOutcome::Protected => "protected",
            RemediationOutcome::AlertOnly => "alert_only",
        }
    }
}

impl fmt::Display for RemediationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemediationOutcome::Restarted { workload, namespace } => {
                write!(f, "Pod {} restarted in {}", workload, namespace)
            }
            RemediationOutcome::Scaled {
                deployment,
                replicas,
                namespace,
            } => write!(f, "Scaled {} to {} in {}", deployment, replicas, namespace),
            RemediationOutcome::NotFound { kind, name } => write!(f, "{} {} not found", kind, name),
            RemediationOutcome::RestartFailed(err) => write!(f, "Restart failed: {}", err),
            RemediationOutcome::ScaleFailed(err) => write!(f, "Scaling failed: {}", err),
            RemediationOutcome::Protected => write!(f, "protected system workload, alert only"),
            RemediationOutcome::AlertOnly => write!(f, "Alert only, no action"),
        }
    }
}

/// Owning deployment name: the workload name minus its trailing
/// replica-set hash and pod hash segments
pub fn owning_deployment(workload_id: &str) -> &str {
    workload_id.rsplitn(3, '-').last().unwrap_or(workload_id)
}

/// Executes restart and scale actions against the cluster
pub struct RemediationExecutor {
    cluster: Arc<dyn ClusterApi>,
    protected: Arc<ProtectedSet>,
    config: RemediationConfig,
}

impl RemediationExecutor {
    pub fn new(cluster: Arc<dyn ClusterApi>, protected: Arc<ProtectedSet>, config: RemediationConfig) -> Self {
        Self {
            cluster,
            protected,
            config,
        }
    }

    /// Dispatch a decided action
    pub async fn execute(&self, action: Action, workload_id: &str) -> RemediationOutcome {
        if self.protected.is_protected(workload_id) {
            warn!(workload = %workload_id, action = %action, "Refusing to act on protected workload");
            return RemediationOutcome::Protected;
        }

        match action {
            Action::RestartPod => self.restart(workload_id).await,
            Action::ScaleDeployment => self.scale(workload_id, self.config.scale_replicas).await,
            Action::AlertOnly | Action::None => RemediationOutcome::AlertOnly,
        }
    }

    /// Terminate a workload immediately so its controller recreates it
    pub async fn restart(&self, workload_id: &str) -> RemediationOutcome {
        if self.protected.is_protected(workload_id) {
            warn!(workload = %workload_id, "Refusing to restart protected workload");
            return RemediationOutcome::Protected;
        }

        let location = match self.bounded(self.cluster.find_workload(workload_id)).await {
            Ok(Some(location)) => location,
            Ok(None) | Err(ClusterError::NotFound { .. }) => {
                warn!(workload = %workload_id, "Workload not found at action time");
                return RemediationOutcome::NotFound {
                    kind: "Pod",
                    name: workload_id.to_string(),
                };
            }
            Err(e) => return RemediationOutcome::RestartFailed(e.to_string()),
        };

        match self.bounded(self.cluster.terminate_workload(&location, 0)).await {
            Ok(()) => {
                info!(workload = %workload_id, namespace = %location.namespace, "Workload restarted");
                RemediationOutcome::Restarted {
                    workload: workload_id.to_string(),
                    namespace: location.namespace,
                }
            }
            Err(ClusterError::NotFound { kind, name }) => {
                warn!(workload = %workload_id, "Workload disappeared before restart");
                RemediationOutcome::NotFound { kind, name }
            }
            Err(e) => {
                warn!(workload = %workload_id, error = %e, "Restart failed");
                RemediationOutcome::RestartFailed(e.to_string())
            }
        }
    }

    /// Set the desired replica count of the workload's owning deployment
    pub async fn scale(&self, workload_id: &str, replicas: i32) -> RemediationOutcome {
        if self.protected.is_protected(workload_id) {
            warn!(workload = %workload_id, "Refusing to scale protected workload");
            return RemediationOutcome::Protected;
        }

        let deployment = owning_deployment(workload_id);
        let location = match self.bounded(self.cluster.find_deployment(deployment)).await {
            Ok(Some(location)) => location,
            Ok(None) | Err(ClusterError::NotFound { .. }) => {
                warn!(workload = %workload_id, deployment = %deployment, "Deployment not found at action time");
                return RemediationOutcome::NotFound {
                    kind: "Deployment",
                    name: deployment.to_string(),
                };
            }
            Err(e) => return RemediationOutcome::ScaleFailed(e.to_string()),
        };

        match self.bounded(self.cluster.set_desired_replicas(&location, replicas)).await {
            Ok(()) => {
                info!(
                    deployment = %deployment,
                    namespace = %location.namespace,
                    replicas = replicas,
                    "Deployment scaled"
                );
                RemediationOutcome::Scaled {
                    deployment: deployment.to_string(),
                    replicas,
                    namespace: location.namespace,
                }
            }
            Err(ClusterError::NotFound { kind, name }) => {
                warn!(deployment = %deployment, "Deployment disappeared before scaling");
                RemediationOutcome::NotFound { kind, name }
            }
            Err(e) => {
                warn!(deployment = %deployment, error = %e, "Scaling failed");
                RemediationOutcome::ScaleFailed(e.to_string())
            }
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ClusterError>>,
    ) -> Result<T, ClusterError> {
        let limit = Duration::from_millis(self.config.call_timeout_ms);
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| ClusterError::Timeout(limit.as_millis()))?
    }
}

impl fmt::Debug for RemediationExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemediationExecutor")
            .field("protected", &self.protected.version)
            .field("config", &self.config)
            .finish()
    }
}
