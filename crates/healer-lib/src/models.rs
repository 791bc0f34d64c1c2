//! Core data models for the remediation engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed sequence length consumed by the reconstruction model
pub const SEQ_LEN: usize = 30;

/// Minimum number of samples before the sequence scorer will run
pub const MIN_PREDICTIVE_SAMPLES: usize = SEQ_LEN + 5;

/// A single per-workload observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub workload_id: String,
    pub cpu_usage: f64,
    pub memory_usage_mb: f64,
    pub restart_count: u32,
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    pub fn new(
        workload_id: impl Into<String>,
        cpu_usage: f64,
        memory_usage_mb: f64,
        restart_count: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            workload_id: workload_id.into(),
            cpu_usage,
            memory_usage_mb,
            restart_count,
            timestamp,
        }
    }

    /// Value of the given metric, `None` when the reading is missing (non-finite)
    pub fn value(&self, metric: Metric) -> Option<f64> {
        let value = match metric {
            Metric::CpuUsage => self.cpu_usage,
            Metric::MemoryUsage => self.memory_usage_mb,
            Metric::RestartCount => f64::from(self.restart_count),
        };
        value.is_finite().then_some(value)
    }
}

/// Metrics scored by the sequence scorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    CpuUsage,
    MemoryUsage,
    RestartCount,
}

impl Metric {
    /// Iteration order for the predictive pass; earlier metrics win dedup
    pub const PREDICTIVE_ORDER: [Metric; 3] =
        [Metric::CpuUsage, Metric::MemoryUsage, Metric::RestartCount];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::CpuUsage => "cpu_usage",
            Metric::MemoryUsage => "memory_usage",
            Metric::RestartCount => "restart_count",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-ordered samples for one or more workloads
///
/// Timestamps are non-decreasing; samples with equal timestamps keep their
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricWindow {
    samples: Vec<MetricSample>,
}

impl MetricWindow {
    pub fn from_samples(mut samples: Vec<MetricSample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    /// Most recent sample recorded for a workload
    pub fn latest_for(&self, workload_id: &str) -> Option<&MetricSample> {
        self.samples
            .iter()
            .rev()
            .find(|s| s.workload_id == workload_id)
    }
}

/// Score produced for the sample immediately following a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub workload_id: String,
    pub metric: Metric,
    pub anomaly_score: f64,
    pub is_anomaly: bool,
    pub timestamp: DateTime<Utc>,
}

/// Remediation vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    RestartPod,
    ScaleDeployment,
    AlertOnly,
    None,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::RestartPod => "RESTART_POD",
            Action::ScaleDeployment => "SCALE_DEPLOYMENT",
            Action::AlertOnly => "ALERT_ONLY",
            Action::None => "NONE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the rule-based detector, one per breaching sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEvent {
    pub workload_id: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of acting on a threshold breach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdActionRecord {
    pub workload: String,
    pub reason: String,
    pub action: Action,
    pub outcome: String,
}

/// Result of acting on a predicted anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveActionRecord {
    pub workload: String,
    pub metric: Metric,
    pub score: f64,
    pub action: Action,
    pub outcome: String,
    pub timestamp: DateTime<Utc>,
}

/// Response of the predictive detection pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictiveReport {
    NotEnoughData {
        rows_found: usize,
        required_min: usize,
    },
    Completed {
        total_anomalies: usize,
        details: Vec<PredictiveActionRecord>,
    },
}

/// Response of a metric collection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CollectReport {
    Inserted { samples: usize },
    NoData,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(id: &str, secs: i64) -> MetricSample {
        let base = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        MetricSample::new(id, 0.1, 64.0, 0, base + Duration::seconds(secs))
    }

    #[test]
    fn test_window_sorted_and_stable() {
        let window = MetricWindow::from_samples(vec![
            sample("b", 10),
            sample("a", 5),
            sample("c", 10),
        ]);
        let ids: Vec<_> = window.iter().map(|s| s.workload_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_latest_for_workload() {
        let mut late = sample("web-1", 30);
        late.restart_count = 7;
        let window = MetricWindow::from_samples(vec![sample("web-1", 0), late, sample("db", 40)]);
        assert_eq!(window.latest_for("web-1").unwrap().restart_count, 7);
        assert!(window.latest_for("missing").is_none());
    }

    #[test]
    fn test_missing_value_is_none() {
        let mut s = sample("a", 0);
        s.memory_usage_mb = f64::NAN;
        assert!(s.value(Metric::MemoryUsage).is_none());
        assert_eq!(s.value(Metric::CpuUsage), Some(0.1));
    }

    #[test]
    fn test_action_serialization() {
        let json = serde_json::to_string(&Action::ScaleDeployment).unwrap();
        assert_eq!(json, "\"SCALE_DEPLOYMENT\"");
    }

    #[test]
    fn test_not_enough_data_report_shape() {
        let report = PredictiveReport::NotEnoughData {
            rows_found: 12,
            required_min: MIN_PREDICTIVE_SAMPLES,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "not_enough_data");
        assert_eq!(value["required_min"], 35);
    }
}
