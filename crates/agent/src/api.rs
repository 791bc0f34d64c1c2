//! HTTP API: detection triggers, health checks and Prometheus metrics

use healer_lib::{
    health::{components, ComponentStatus, HealthRegistry},
    models::CollectReport,
    RemediationEngine, StructuredLogger,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
pub struct AppState {
    pub engine: Arc<RemediationEngine>,
    pub health_registry: HealthRegistry,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        engine: Arc<RemediationEngine>,
        health_registry: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            engine,
            health_registry,
            logger,
        }
    }

    /// Run one collection and record the source's health
    pub async fn collect(&self) -> anyhow::Result<CollectReport> {
        match self.engine.collect().await {
            Ok(report) => {
                self.health_registry.set_healthy(components::SOURCE).await;
                Ok(report)
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Metric collection failed");
                if self.engine.has_source() {
                    self.health_registry
                        .set_degraded(components::SOURCE, format!("{:#}", e))
                        .await;
                }
                Err(e)
            }
        }
    }

    async fn store_failed(&self, error: &anyhow::Error) {
        warn!(error = %format!("{:#}", error), "Detection pass failed");
        self.health_registry
            .set_degraded(components::STORE, format!("{:#}", error))
            .await;
    }
}

fn error_response(error: &anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": format!("{:#}", error) })),
    )
        .into_response()
}

async fn root() -> impl IntoResponse {
    Json(json!({ "status": "running" }))
}

/// Fetch current metrics from the source into the store
async fn collect_metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.collect().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Threshold detection pass
async fn detect_anomalies(State(state): State<Arc<AppState>>) -> Response {
    match state.engine.run_threshold_pass().await {
        Ok(records) => {
            state.health_registry.set_healthy(components::STORE).await;
            Json(records).into_response()
        }
        Err(e) => {
            state.store_failed(&e).await;
            error_response(&e)
        }
    }
}

/// Predictive detection pass
async fn predict_anomalies(State(state): State<Arc<AppState>>) -> Response {
    match state.engine.run_predictive_pass().await {
        Ok(report) => {
            state.health_registry.set_healthy(components::STORE).await;
            Json(report).into_response()
        }
        Err(e) => {
            state.store_failed(&e).await;
            error_response(&e)
        }
    }
}

/// Health check response - returns 200 if operational, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return error_response(&anyhow::Error::from(e));
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/collect_metrics", get(collect_metrics))
        .route("/detect_anomalies", get(detect_anomalies))
        .route("/predict_anomalies", get(predict_anomalies))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
