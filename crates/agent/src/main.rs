//! Pod Healer - automated remediation service
//!
//! Serves the detection triggers over HTTP. Model and cluster credentials
//! are loaded once at startup; failure to load either aborts the process.

use anyhow::{bail, Context, Result};
use healer_agent::{api, config};
use healer_lib::{
    health::{components, HealthRegistry},
    model::{verify_checksum, MeanReconstructor, OnnxReconstructor, Reconstructor},
    observability::{HealerMetrics, StructuredLogger},
    remediation::{ClusterApi, InMemoryCluster, KubeClusterApi},
    source::PrometheusSource,
    store::InMemoryMetricsStore,
    RemediationEngine,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const HEALER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bound on a single Prometheus query
const SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting pod-healer");

    let config = config::AgentConfig::load()?;
    info!(service = %config.service_name, port = config.api_port, "Service configured");

    let health_registry = HealthRegistry::new();
    let logger = StructuredLogger::new(&config.service_name);

    let model = load_model(&config).context("Failed to initialize model")?;
    health_registry.register(components::MODEL).await;

    let cluster = connect_cluster(&config).await?;
    health_registry.register(components::CLUSTER).await;

    let store = Arc::new(InMemoryMetricsStore::new(config.engine.store.clone()));
    health_registry.register(components::STORE).await;

    let mut engine = RemediationEngine::new(
        config.engine.clone(),
        model,
        cluster,
        store,
        logger.clone(),
    );
    if let Some(url) = &config.prometheus_url {
        let source = PrometheusSource::new(url, SOURCE_TIMEOUT)
            .context("Failed to configure Prometheus source")?;
        engine = engine.with_source(Arc::new(source));
        health_registry.register(components::SOURCE).await;
    } else {
        warn!("No Prometheus URL configured, metric collection disabled");
    }

    let metrics = HealerMetrics::new();
    metrics.set_model_version(engine.model_version(), engine.scaler_version());
    logger.log_startup(HEALER_VERSION, engine.model_version(), engine.scaler_version());
    info!(
        protected_version = %engine.protected().version,
        protected_patterns = engine.protected().len(),
        windowing = ?engine.config().predictive.windowing,
        "Engine initialized"
    );

    let app_state = Arc::new(api::AppState::new(
        Arc::new(engine),
        health_registry.clone(),
        logger.clone(),
    ));

    if config.collection_interval_secs > 0 && app_state.engine.has_source() {
        tokio::spawn(collection_loop(
            app_state.clone(),
            Duration::from_secs(config.collection_interval_secs),
        ));
    }

    health_registry.set_ready(true).await;

    let server = tokio::spawn(api::serve(config.api_port, app_state.clone()));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            app_state.logger.log_shutdown("SIGINT received");
        }
        result = server => {
            let reason = match result {
                Ok(Ok(())) => "API server stopped".to_string(),
                Ok(Err(e)) => format!("API server failed: {:#}", e),
                Err(e) => format!("API server task panicked: {}", e),
            };
            app_state.logger.log_shutdown(&reason);
            bail!(reason);
        }
    }

    info!("Shutting down");
    Ok(())
}

/// Load the reconstruction model, verifying its checksum when configured
fn load_model(config: &config::AgentConfig) -> Result<Arc<dyn Reconstructor>> {
    let Some(path) = &config.model_path else {
        if config.allow_fallback_model {
            warn!("No model artifact configured, using mean reconstruction fallback");
            return Ok(Arc::new(MeanReconstructor));
        }
        bail!("No model artifact configured; set HEALER_MODEL_PATH or HEALER_ALLOW_FALLBACK_MODEL=true");
    };

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read model artifact {}", path.display()))?;
    if let Some(expected) = &config.model_sha256 {
        verify_checksum(&bytes, expected)?;
    }

    let model = OnnxReconstructor::from_bytes(&bytes, config.model_version.clone())?;
    info!(path = %path.display(), version = %config.model_version, "Model loaded");
    Ok(Arc::new(model))
}

async fn connect_cluster(config: &config::AgentConfig) -> Result<Arc<dyn ClusterApi>> {
    if config.use_in_memory_cluster {
        warn!("Using in-memory cluster, remediation has no effect on a real cluster");
        return Ok(Arc::new(InMemoryCluster::new()));
    }

    let cluster = KubeClusterApi::try_default()
        .await
        .context("Failed to load cluster credentials")?;
    Ok(Arc::new(cluster))
}

/// Periodically pull samples from the source into the store
async fn collection_loop(state: Arc<api::AppState>, every: Duration) {
    info!(interval_secs = every.as_secs(), "Starting collection loop");
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        // Failures are already logged and reflected in source health by `collect`
        if let Err(e) = state.collect().await {
            debug!(error = %format!("{:#}", e), "Collection tick skipped");
        }
    }
}
