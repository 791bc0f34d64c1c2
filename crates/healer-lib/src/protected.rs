//! Registry of critical workloads that must never be disrupted

use serde::{Deserialize, Serialize};

/// Name fragments identifying control-plane and infrastructure workloads
pub const DEFAULT_PROTECTED_PATTERNS: &[&str] = &[
    "kube-apiserver",
    "kube-scheduler",
    "kube-controller-manager",
    "etcd",
    "prometheus",
    "storage-provisioner",
    "coredns",
    "kube-proxy",
];

/// Versioned set of protected name substrings
///
/// Membership is substring containment, so `etcd-minikube` and
/// `prometheus-server-5d9f` are both protected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedSet {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_patterns() -> Vec<String> {
    DEFAULT_PROTECTED_PATTERNS
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Default for ProtectedSet {
    fn default() -> Self {
        Self {
            version: default_version(),
            patterns: default_patterns(),
        }
    }
}

impl ProtectedSet {
    pub fn new(version: impl Into<String>, patterns: Vec<String>) -> Self {
        Self {
            version: version.into(),
            patterns,
        }
    }

    /// Check whether a workload matches any protected pattern
    pub fn is_protected(&self, workload_id: &str) -> bool {
        self.patterns
            .iter()
            .filter(|p| !p.is_empty())
            .any(|p| workload_id.contains(p.as_str()))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
