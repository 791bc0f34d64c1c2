//! Observability infrastructure for the remediation engine
//!
//! Provides:
//! - Prometheus metrics (pass latency, inference latency, anomalies, actions)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, GaugeVec, Histogram, HistogramVec, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<HealerMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct HealerMetricsInner {
    detection_pass_seconds: HistogramVec,
    inference_seconds: Histogram,
    model_version_info: GaugeVec,
    anomalies_total: IntCounterVec,
    actions_total: IntCounterVec,
    threshold_breaches_total: IntCounter,
    samples_collected_total: IntCounter,
    inference_errors_total: IntCounter,
    insufficient_data_total: IntCounter,
}

impl HealerMetricsInner {
    fn new() -> Self {
        Self {
            detection_pass_seconds: register_histogram_vec!(
                "healer_detection_pass_seconds",
                "Wall time of a detection pass including remediation calls",
                &["pass"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register detection_pass_seconds"),

            inference_seconds: register_histogram!(
                "healer_inference_seconds",
                "Time spent scoring one metric with the reconstruction model",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_seconds"),

            model_version_info: register_gauge_vec!(
                "healer_model_version_info",
                "Information about the loaded model and scaler configuration",
                &["version", "scaler_version"]
            )
            .expect("Failed to register model_version_info"),

            anomalies_total: register_int_counter_vec!(
                "healer_anomalies_total",
                "Anomalous windows reported by the sequence scorer",
                &["metric"]
            )
            .expect("Failed to register anomalies_total"),

            actions_total: register_int_counter_vec!(
                "healer_actions_total",
                "Remediation decisions by action and result",
                &["action", "result"]
            )
            .expect("Failed to register actions_total"),

            threshold_breaches_total: register_int_counter!(
                "healer_threshold_breaches_total",
                "Samples flagged by the rule-based detector"
            )
            .expect("Failed to register threshold_breaches_total"),

            samples_collected_total: register_int_counter!(
                "healer_samples_collected_total",
                "Metric samples inserted into the window store"
            )
            .expect("Failed to register samples_collected_total"),

            inference_errors_total: register_int_counter!(
                "healer_inference_errors_total",
                "Scoring runs that failed inside the model"
            )
            .expect("Failed to register inference_errors_total"),

            insufficient_data_total: register_int_counter!(
                "healer_insufficient_data_total",
                "Predictive passes skipped for lack of samples"
            )
            .expect("Failed to register insufficient_data_total"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct HealerMetrics {
    _private: (),
}

impl Default for HealerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HealerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(HealerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &HealerMetricsInner {
        GLOBAL_METRICS.get_or_init(HealerMetricsInner::new)
    }

    pub fn observe_pass_latency(&self, pass: &str, duration_secs: f64) {
        self.inner()
            .detection_pass_seconds
            .with_label_values(&[pass])
            .observe(duration_secs);
    }

    pub fn observe_inference_latency(&self, duration_secs: f64) {
        self.inner().inference_seconds.observe(duration_secs);
    }

    /// Update model version info
    pub fn set_model_version(&self, version: &str, scaler_version: &str) {
        self.inner().model_version_info.reset();
        self.inner()
            .model_version_info
            .with_label_values(&[version, scaler_version])
            .set(1.0);
    }

    pub fn inc_anomalies(&self, metric: &str, count: u64) {
        self.inner()
            .anomalies_total
            .with_label_values(&[metric])
            .inc_by(count);
    }

    pub fn inc_action(&self, action: &str, result: &str) {
        self.inner()
            .actions_total
            .with_label_values(&[action, result])
            .inc();
    }

    pub fn inc_threshold_breaches(&self, count: u64) {
        self.inner().threshold_breaches_total.inc_by(count);
    }

    pub fn inc_samples_collected(&self, count: u64) {
        self.inner().samples_collected_total.inc_by(count);
    }

    pub fn inc_inference_errors(&self) {
        self.inner().inference_errors_total.inc();
    }

    pub fn inc_insufficient_data(&self) {
        self.inner().insufficient_data_total.inc();
    }
}

/// Structured logger for engine events
///
/// Provides consistent JSON-formatted logging for detections, decisions
/// and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn log_startup(&self, version: &str, model_version: &str, scaler_version: &str) {
        info!(
            event = "healer_started",
            service = %self.service,
            healer_version = %version,
            model_version = %model_version,
            scaler_version = %scaler_version,
            "Remediation service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "healer_shutdown",
            service = %self.service,
            reason = %reason,
            "Remediation service shutting down"
        );
    }

    /// Log a rule-based breach and what was done about it
    pub fn log_threshold_breach(&self, workload: &str, action: &str, outcome: &str) {
        info!(
            event = "threshold_breach",
            service = %self.service,
            workload = %workload,
            action = %action,
            outcome = %outcome,
            "Threshold breach handled"
        );
    }

    pub fn log_anomaly(&self, workload: &str, metric: &str, score: f64) {
        debug!(
            event = "anomaly_detected",
            service = %self.service,
            workload = %workload,
            metric = %metric,
            score = score,
            "Sequence anomaly detected"
        );
    }

    /// Log a remediation decision; suppressed or failed actions log at warn
    pub fn log_action(&self, workload: &str, metric: &str, action: &str, outcome: &str, success: bool) {
        if success || action == "ALERT_ONLY" {
            info!(
                event = "remediation_action",
                service = %self.service,
                workload = %workload,
                metric = %metric,
                action = %action,
                outcome = %outcome,
                "Remediation action taken"
            );
        } else {
            warn!(
                event = "remediation_action",
                service = %self.service,
                workload = %workload,
                metric = %metric,
                action = %action,
                outcome = %outcome,
                "Remediation action did not succeed"
            );
        }
    }

    /// Log a protected workload whose action was reduced to an alert
    pub fn log_protected(&self, workload: &str, metric: Option<&str>) {
        warn!(
            event = "remediation_action",
            service = %self.service,
            workload = %workload,
            metric = ?metric,
            action = "ALERT_ONLY",
            "Protected workload, alert only"
        );
    }

    pub fn log_insufficient_data(&self, rows_found: usize, required_min: usize) {
        info!(
            event = "insufficient_data",
            service = %self.service,
            rows_found = rows_found,
            required_min = required_min,
            "Not enough samples for predictive detection"
        );
    }

    pub fn log_collection(&self, samples: usize) {
        info!(
            event = "metrics_collected",
            service = %self.service,
            samples = samples,
            "Metric samples stored"
        );
    }
}
