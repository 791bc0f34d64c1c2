//! Integration tests for the agent API endpoints

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use healer_agent::api::{create_router, AppState};
use healer_lib::health::{components, ComponentStatus, HealthRegistry};
use healer_lib::model::MeanReconstructor;
use healer_lib::models::{MetricSample, MetricWindow};
use healer_lib::remediation::InMemoryCluster;
use healer_lib::store::{InMemoryMetricsStore, MetricsStore};
use healer_lib::{EngineConfig, RemediationEngine, StructuredLogger};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

struct UnavailableStore;

#[async_trait]
impl MetricsStore for UnavailableStore {
    async fn insert(&self, _sample: MetricSample) -> anyhow::Result<()> {
        anyhow::bail!("store offline")
    }

    async fn window_since(&self, _since: DateTime<Utc>) -> anyhow::Result<MetricWindow> {
        anyhow::bail!("store offline")
    }
}

fn state_with(store: Arc<dyn MetricsStore>, cluster: Arc<InMemoryCluster>) -> Arc<AppState> {
    let logger = StructuredLogger::new("api-test");
    let engine = RemediationEngine::new(
        EngineConfig::default(),
        Arc::new(MeanReconstructor),
        cluster,
        store,
        logger.clone(),
    );
    Arc::new(AppState::new(Arc::new(engine), HealthRegistry::new(), logger))
}

async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let response = create_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_root() {
    let state = state_with(
        Arc::new(InMemoryMetricsStore::default()),
        Arc::new(InMemoryCluster::new()),
    );
    let (status, body) = get_json(state, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
}

#[tokio::test]
async fn test_detect_anomalies_restarts_breaching_pod() {
    let store = Arc::new(InMemoryMetricsStore::default());
    let cluster = Arc::new(InMemoryCluster::new());
    cluster.add_workload("cart-5c7d9-abcde", "shop");
    store
        .insert(MetricSample::new("cart-5c7d9-abcde", 10.0, 50.0, 9, Utc::now()))
        .await
        .unwrap();

    let (status, body) = get_json(state_with(store, cluster.clone()), "/detect_anomalies").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["workload"], "cart-5c7d9-abcde");
    assert_eq!(body[0]["action"], "RESTART_POD");
    assert_eq!(body[0]["outcome"], "Pod cart-5c7d9-abcde restarted in shop");
    assert!(!cluster.has_workload("cart-5c7d9-abcde"));
}

#[tokio::test]
async fn test_predict_anomalies_reports_insufficient_data() {
    let state = state_with(
        Arc::new(InMemoryMetricsStore::default()),
        Arc::new(InMemoryCluster::new()),
    );
    let (status, body) = get_json(state, "/predict_anomalies").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "not_enough_data");
    assert_eq!(body["rows_found"], 0);
    assert_eq!(body["required_min"], 35);
}

#[tokio::test]
async fn test_store_failure_returns_500_and_degrades_store() {
    let state = state_with(Arc::new(UnavailableStore), Arc::new(InMemoryCluster::new()));
    let (status, body) = get_json(state.clone(), "/detect_anomalies").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("store offline"));
    assert_eq!(
        state.health_registry.status(components::STORE).await,
        Some(ComponentStatus::Degraded)
    );
}

#[tokio::test]
async fn test_collect_without_source_is_error() {
    let state = state_with(
        Arc::new(InMemoryMetricsStore::default()),
        Arc::new(InMemoryCluster::new()),
    );
    let (status, body) = get_json(state, "/collect_metrics").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "no sample source configured");
}

#[tokio::test]
async fn test_health_and_readiness() {
    let state = state_with(
        Arc::new(InMemoryMetricsStore::default()),
        Arc::new(InMemoryCluster::new()),
    );
    state.health_registry.register(components::MODEL).await;

    let (status, _) = get_json(state.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.health_registry.set_ready(true).await;
    let (status, body) = get_json(state.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);

    let (status, body) = get_json(state, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["components"]["model"]["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    healer_lib::HealerMetrics::new().inc_threshold_breaches(0);
    let state = state_with(
        Arc::new(InMemoryMetricsStore::default()),
        Arc::new(InMemoryCluster::new()),
    );
    let response = create_router(state)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("healer_threshold_breaches_total"));
}
