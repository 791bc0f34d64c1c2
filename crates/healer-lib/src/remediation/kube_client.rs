//! Cluster access through the Kubernetes API

use super::{ClusterApi, ClusterError, WorkloadLocation};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use tracing::debug;

/// Kubernetes-backed cluster implementation
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the in-cluster environment or local kubeconfig
    pub async fn try_default() -> Result<Self, ClusterError> {
        let client = Client::try_default()
            .await
            .map_err(|e| ClusterError::Api(format!("failed to load cluster credentials: {}", e)))?;
        Ok(Self::new(client))
    }

    fn name_selector(name: &str) -> ListParams {
        ListParams::default().fields(&format!("metadata.name={}", name))
    }
}

fn api_error(err: kube::Error) -> ClusterError {
    ClusterError::Api(err.to_string())
}

/// Like `api_error`, but a 404 on a named object means it is gone
fn object_error<'a>(kind: &'static str, name: &'a str) -> impl FnOnce(kube::Error) -> ClusterError + 'a {
    move |err| match err {
        kube::Error::Api(response) if response.code == 404 => ClusterError::NotFound {
            kind,
            name: name.to_string(),
        },
        other => api_error(other),
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn find_workload(&self, name: &str) -> Result<Option<WorkloadLocation>, ClusterError> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods.list(&Self::name_selector(name)).await.map_err(api_error)?;

        let location = list
            .items
            .first()
            .and_then(|pod| pod.metadata.namespace.clone())
            .map(|namespace| WorkloadLocation::new(name, namespace));
        debug!(pod = %name, found = location.is_some(), "Pod lookup");
        Ok(location)
    }

    async fn terminate_workload(
        &self,
        location: &WorkloadLocation,
        grace_period_seconds: u32,
    ) -> Result<(), ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &location.namespace);
        let params = DeleteParams {
            grace_period_seconds: Some(grace_period_seconds),
            ..DeleteParams::default()
        };
        pods.delete(&location.name, &params)
            .await
            .map_err(object_error("Pod", &location.name))?;
        Ok(())
    }

    async fn find_deployment(&self, name: &str) -> Result<Option<WorkloadLocation>, ClusterError> {
        let deployments: Api<Deployment> = Api::all(self.client.clone());
        let list = deployments
            .list(&Self::name_selector(name))
            .await
            .map_err(api_error)?;

        let location = list
            .items
            .first()
            .and_then(|d| d.metadata.namespace.clone())
            .map(|namespace| WorkloadLocation::new(name, namespace));
        debug!(deployment = %name, found = location.is_some(), "Deployment lookup");
        Ok(location)
    }

    async fn set_desired_replicas(
        &self,
        location: &WorkloadLocation,
        replicas: i32,
    ) -> Result<(), ClusterError> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), &location.namespace);
        let patch = json!({ "spec": { "replicas": replicas } });
        deployments
            .patch_scale(&location.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(object_error("Deployment", &location.name))?;
        Ok(())
    }
}
