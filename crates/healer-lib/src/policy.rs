//! Decision policy
//!
//! Maps threshold events and predicted anomalies to remediation actions.
//! Protected workloads are reduced to `ALERT_ONLY` before the executor is
//! reached, and the predictive path acts at most once per workload per pass.

use crate::anomaly::ScalerState;
use crate::models::{
    Action, AnomalyRecord, Metric, MetricSample, MetricWindow, PredictiveActionRecord,
    ThresholdActionRecord, ThresholdEvent,
};
use crate::observability::{HealerMetrics, StructuredLogger};
use crate::protected::ProtectedSet;
use crate::remediation::{RemediationExecutor, RemediationOutcome};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Cut-offs used by the action-selection rule
///
/// The raw thresholds compare unscaled sample values. The normalized ones,
/// when set, compare the sample mapped through the fitted scaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionThresholds {
    #[serde(default = "default_restart_count")]
    pub restart_count: u32,
    #[serde(default = "default_usage")]
    pub cpu_usage: f64,
    #[serde(default = "default_usage")]
    pub memory_usage: f64,
    #[serde(default)]
    pub cpu_usage_normalized: Option<f64>,
    #[serde(default)]
    pub memory_usage_normalized: Option<f64>,
}

fn default_restart_count() -> u32 {
    3
}

fn default_usage() -> f64 {
    0.85
}

impl Default for ActionThresholds {
    fn default() -> Self {
        Self {
            restart_count: default_restart_count(),
            cpu_usage: default_usage(),
            memory_usage: default_usage(),
            cpu_usage_normalized: None,
            memory_usage_normalized: None,
        }
    }
}

impl ActionThresholds {
    /// Pick the action for a workload's most recent sample
    pub fn select_action(&self, sample: &MetricSample, scalers: &ScalerState) -> Action {
        if sample.restart_count >= self.restart_count {
            return Action::RestartPod;
        }

        if sample.cpu_usage > self.cpu_usage || sample.memory_usage_mb > self.memory_usage {
            return Action::ScaleDeployment;
        }

        let over_normalized = |metric: Metric, value: f64, limit: Option<f64>| {
            limit
                .zip(scalers.normalize(metric, value))
                .is_some_and(|(limit, scaled)| scaled > limit)
        };
        if over_normalized(Metric::CpuUsage, sample.cpu_usage, self.cpu_usage_normalized)
            || over_normalized(
                Metric::MemoryUsage,
                sample.memory_usage_mb,
                self.memory_usage_normalized,
            )
        {
            return Action::ScaleDeployment;
        }

        Action::AlertOnly
    }
}

/// Workloads already acted upon during one detection pass
#[derive(Debug, Default)]
pub struct HandledSet {
    workloads: DashSet<String>,
}

impl HandledSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a workload as handled; false when it already was
    pub fn claim(&self, workload_id: &str) -> bool {
        self.workloads.insert(workload_id.to_string())
    }
}

/// Turns detections into executed actions and result records
pub struct DecisionPolicy {
    protected: Arc<ProtectedSet>,
    executor: Arc<RemediationExecutor>,
    thresholds: ActionThresholds,
    metrics: HealerMetrics,
    logger: StructuredLogger,
}

impl DecisionPolicy {
    pub fn new(
        protected: Arc<ProtectedSet>,
        executor: Arc<RemediationExecutor>,
        thresholds: ActionThresholds,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            protected,
            executor,
            thresholds,
            metrics: HealerMetrics::new(),
            logger,
        }
    }

    /// Act on every threshold event, one restart attempt per event
    pub async fn handle_threshold_events(
        &self,
        events: &[ThresholdEvent],
    ) -> Vec<ThresholdActionRecord> {
        let mut records = Vec::with_capacity(events.len());

        for event in events {
            let (action, outcome) = if self.protected.is_protected(&event.workload_id) {
                self.logger.log_protected(&event.workload_id, None);
                (Action::AlertOnly, RemediationOutcome::Protected)
            } else {
                (
                    Action::RestartPod,
                    self.executor.restart(&event.workload_id).await,
                )
            };

            self.metrics
                .inc_action(action.as_str(), outcome.result_label());
            let outcome = outcome.to_string();
            self.logger
                .log_threshold_breach(&event.workload_id, action.as_str(), &outcome);

            records.push(ThresholdActionRecord {
                workload: event.workload_id.clone(),
                reason: event.reason.clone(),
                action,
                outcome,
            });
        }

        records
    }

    /// Act on anomalies in the given per-metric order
    ///
    /// The first anomaly encountered for a workload claims it; later records
    /// for the same workload, from any metric, are skipped.
    pub async fn handle_anomalies(
        &self,
        window: &MetricWindow,
        anomalies: &[(Metric, Vec<AnomalyRecord>)],
        scalers: &ScalerState,
        handled: &HandledSet,
    ) -> Vec<PredictiveActionRecord> {
        let mut records = Vec::new();

        for (metric, metric_records) in anomalies {
            for record in metric_records {
                if !handled.claim(&record.workload_id) {
                    continue;
                }

                let Some(latest) = window.latest_for(&record.workload_id) else {
                    warn!(
                        workload = %record.workload_id,
                        metric = %metric,
                        "Anomalous workload has no sample in window"
                    );
                    continue;
                };

                let (action, outcome) = if self.protected.is_protected(&record.workload_id) {
                    self.logger
                        .log_protected(&record.workload_id, Some(metric.as_str()));
                    (Action::AlertOnly, RemediationOutcome::Protected)
                } else {
                    let action = self.thresholds.select_action(latest, scalers);
                    (action, self.executor.execute(action, &record.workload_id).await)
                };

                self.metrics
                    .inc_action(action.as_str(), outcome.result_label());
                let success = outcome.is_success();
                let outcome = outcome.to_string();
                self.logger.log_action(
                    &record.workload_id,
                    metric.as_str(),
                    action.as_str(),
                    &outcome,
                    success,
                );

                records.push(PredictiveActionRecord {
                    workload: record.workload_id.clone(),
                    metric: *metric,
                    score: record.anomaly_score,
                    action,
                    outcome,
                    timestamp: record.timestamp,
                });
            }
        }

        records
    }
}
