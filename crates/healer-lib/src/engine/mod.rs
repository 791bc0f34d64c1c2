//! Remediation engine
//!
//! Wires the window store, both detectors, the decision policy and the
//! executor together behind three trigger entry points: collect, threshold
//! pass and predictive pass. The engine has no scheduler of its own.


use crate::anomaly::{ScalerState, SequenceScorer, ThresholdDetector};
use crate::config::EngineConfig;
use crate::model::Reconstructor;
use crate::models::{
    AnomalyRecord, CollectReport, Metric, PredictiveReport, ThresholdActionRecord,
    MIN_PREDICTIVE_SAMPLES,
};
use crate::observability::{HealerMetrics, StructuredLogger};
use crate::policy::{DecisionPolicy, HandledSet};
use crate::protected::ProtectedSet;
use crate::remediation::{ClusterApi, RemediationExecutor};
use crate::source::SampleSource;
use crate::store::MetricsStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Detection-and-decision engine
pub struct RemediationEngine {
    config: EngineConfig,
    store: Arc<dyn MetricsStore>,
    source: Option<Arc<dyn SampleSource>>,
    detector: ThresholdDetector,
    scorer: Arc<SequenceScorer>,
    policy: DecisionPolicy,
    metrics: HealerMetrics,
    logger: StructuredLogger,
}

impl RemediationEngine {
    /// Build the engine around an already-loaded model and cluster client
    pub fn new(
        config: EngineConfig,
        model: Arc<dyn Reconstructor>,
        cluster: Arc<dyn ClusterApi>,
        store: Arc<dyn MetricsStore>,
        logger: StructuredLogger,
    ) -> Self {
        let protected = Arc::new(config.protected.clone());
        let scalers = Arc::new(ScalerState::new(config.predictive.scaler.clone()));
        let scorer = Arc::new(SequenceScorer::new(
            model,
            scalers,
            config.predictive.windowing,
        ));
        let executor = Arc::new(RemediationExecutor::new(
            cluster,
            protected.clone(),
            config.remediation.clone(),
        ));
        let policy = DecisionPolicy::new(
            protected,
            executor,
            config.actions.clone(),
            logger.clone(),
        );
        let detector = ThresholdDetector::new(
            config.threshold.cpu_usage,
            config.threshold.restart_count,
        );

        Self {
            config,
            store,
            source: None,
            detector,
            scorer,
            policy,
            metrics: HealerMetrics::new(),
            logger,
        }
    }

    /// Attach a sample source for `collect`
    pub fn with_source(mut self, source: Arc<dyn SampleSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn protected(&self) -> &ProtectedSet {
        &self.config.protected
    }

    pub fn model_version(&self) -> &str {
        self.scorer.model_version()
    }

    pub fn scaler_version(&self) -> &str {
        self.scorer.scalers().version()
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Fetch current samples from the source and store them
    pub async fn collect(&self) -> Result<CollectReport> {
        let source = self
            .source
            .as_ref()
            .context("no sample source configured")?;

        let samples = source
            .fetch()
            .await
            .with_context(|| format!("failed to fetch samples from {}", source.name()))?;
        if samples.is_empty() {
            return Ok(CollectReport::NoData);
        }

        let inserted = self
            .store
            .insert_batch(samples)
            .await
            .context("failed to store samples")?;

        self.metrics.inc_samples_collected(inserted as u64);
        self.logger.log_collection(inserted);
        Ok(CollectReport::Inserted { samples: inserted })
    }

    /// Rule-based pass over the short threshold lookback
    pub async fn run_threshold_pass(&self) -> Result<Vec<ThresholdActionRecord>> {
        let start = Instant::now();

        let window = self
            .store
            .window(self.config.threshold.lookback())
            .await
            .context("failed to read threshold window")?;
        let events = self.detector.detect(&window);
        self.metrics.inc_threshold_breaches(events.len() as u64);
        debug!(samples = window.len(), breaches = events.len(), "Threshold detection complete");

        let records = self.policy.handle_threshold_events(&events).await;

        self.metrics
            .observe_pass_latency("threshold", start.elapsed().as_secs_f64());
        Ok(records)
    }

    /// Sequence-scoring pass over the predictive lookback
    pub async fn run_predictive_pass(&self) -> Result<PredictiveReport> {
        let start = Instant::now();

        let window = self
            .store
            .window(self.config.predictive.lookback())
            .await
            .context("failed to read predictive window")?;

        if window.len() < MIN_PREDICTIVE_SAMPLES {
            self.metrics.inc_insufficient_data();
            self.logger
                .log_insufficient_data(window.len(), MIN_PREDICTIVE_SAMPLES);
            return Ok(PredictiveReport::NotEnoughData {
                rows_found: window.len(),
                required_min: MIN_PREDICTIVE_SAMPLES,
            });
        }

        let window = Arc::new(window);
        let threshold = self.config.predictive.anomaly_threshold;

        // Score all metrics concurrently, consume results in the fixed order.
        let tasks: Vec<_> = Metric::PREDICTIVE_ORDER
            .iter()
            .map(|&metric| {
                let scorer = Arc::clone(&self.scorer);
                let window = Arc::clone(&window);
                let task = tokio::task::spawn_blocking(move || {
                    let started = Instant::now();
                    let result = scorer.score(&window, metric, threshold);
                    (result, started.elapsed())
                });
                (metric, task)
            })
            .collect();

        let mut anomalies: Vec<(Metric, Vec<AnomalyRecord>)> = Vec::with_capacity(tasks.len());
        for (metric, task) in tasks {
            match task.await {
                Ok((Ok(records), elapsed)) => {
                    self.metrics.observe_inference_latency(elapsed.as_secs_f64());
                    self.metrics
                        .inc_anomalies(metric.as_str(), records.len() as u64);
                    for record in &records {
                        self.logger.log_anomaly(
                            &record.workload_id,
                            metric.as_str(),
                            record.anomaly_score,
                        );
                    }
                    anomalies.push((metric, records));
                }
                Ok((Err(e), _)) => {
                    self.metrics.inc_inference_errors();
                    warn!(metric = %metric, error = %e, "Scoring failed, skipping metric");
                }
                Err(e) => {
                    self.metrics.inc_inference_errors();
                    warn!(metric = %metric, error = %e, "Scoring task aborted, skipping metric");
                }
            }
        }

        let handled = HandledSet::new();
        let details = self
            .policy
            .handle_anomalies(&window, &anomalies, self.scorer.scalers(), &handled)
            .await;

        self.metrics
            .observe_pass_latency("predictive", start.elapsed().as_secs_f64());
        Ok(PredictiveReport::Completed {
            total_anomalies: details.len(),
            details,
        })
    }
}
