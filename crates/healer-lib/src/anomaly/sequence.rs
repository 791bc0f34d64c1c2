//! Sequence-reconstruction anomaly scoring
//!
//! Projects a metric window onto one metric, normalizes it with the fitted
//! scaler, slides fixed-length windows over it and scores each window by the
//! mean absolute reconstruction error of the model. A score is reported on
//! the sample immediately after its window.

use super::scaler::ScalerState;
use crate::model::{ModelError, Reconstructor};
use crate::models::{AnomalyRecord, Metric, MetricWindow, MIN_PREDICTIVE_SAMPLES, SEQ_LEN};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Default reconstruction-error threshold
pub const DEFAULT_ANOMALY_THRESHOLD: f64 = 0.0103;

/// How windows are cut from a multi-workload series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowingMode {
    /// Partition by workload before windowing
    #[default]
    PerWorkload,
    /// Slide over the combined time-sorted series, crossing workload boundaries
    Combined,
}

/// One projected observation of the requested metric
#[derive(Debug, Clone)]
struct Point<'a> {
    workload_id: &'a str,
    timestamp: DateTime<Utc>,
    value: f64,
}

/// Scores metric windows against a pretrained reconstruction model
pub struct SequenceScorer {
    model: Arc<dyn Reconstructor>,
    scalers: Arc<ScalerState>,
    windowing: WindowingMode,
}

impl SequenceScorer {
    pub fn new(model: Arc<dyn Reconstructor>, scalers: Arc<ScalerState>, windowing: WindowingMode) -> Self {
        Self {
            model,
            scalers,
            windowing,
        }
    }

    pub fn scalers(&self) -> &Arc<ScalerState> {
        &self.scalers
    }

    pub fn model_version(&self) -> &str {
        self.model.version()
    }

    /// Anomalous records only: scores strictly above `threshold`
    pub fn score(
        &self,
        window: &MetricWindow,
        metric: Metric,
        threshold: f64,
    ) -> Result<Vec<AnomalyRecord>, ModelError> {
        Ok(self
            .score_all(window, metric, threshold)?
            .into_iter()
            .filter(|r| r.is_anomaly)
            .collect())
    }

    /// Every scored record, anomalous or not, in ascending timestamp order
    ///
    /// Returns an empty result without touching the model when fewer than
    /// `SEQ_LEN + 5` samples carry the metric.
    pub fn score_all(
        &self,
        window: &MetricWindow,
        metric: Metric,
        threshold: f64,
    ) -> Result<Vec<AnomalyRecord>, ModelError> {
        let mut points: Vec<Point<'_>> = window
            .iter()
            .filter_map(|s| {
                s.value(metric).map(|value| Point {
                    workload_id: s.workload_id.as_str(),
                    timestamp: s.timestamp,
                    value,
                })
            })
            .collect();

        if points.len() < MIN_PREDICTIVE_SAMPLES {
            debug!(
                metric = %metric,
                samples = points.len(),
                required = MIN_PREDICTIVE_SAMPLES,
                "Insufficient data for sequence scoring"
            );
            return Ok(Vec::new());
        }

        points.sort_by_key(|p| p.timestamp);

        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let Some(params) = self.scalers.get_or_fit(metric, &values) else {
            return Ok(Vec::new());
        };
        let scaled: Vec<f32> = values.iter().map(|v| params.transform(*v) as f32).collect();

        let (windows, targets) = self.build_windows(&points, &scaled);
        if windows.is_empty() {
            debug!(metric = %metric, "No workload has enough samples for a full window");
            return Ok(Vec::new());
        }

        let reconstructed = self.model.reconstruct(&windows)?;
        if reconstructed.len() != windows.len() {
            return Err(ModelError::Shape {
                expected: windows.len(),
                actual: reconstructed.len(),
            });
        }

        let mut records = Vec::with_capacity(windows.len());
        for ((input, output), target) in windows.iter().zip(&reconstructed).zip(targets) {
            let anomaly_score = reconstruction_error(input, output)?;
            let point = &points[target];
            records.push(AnomalyRecord {
                workload_id: point.workload_id.to_string(),
                metric,
                anomaly_score,
                is_anomaly: anomaly_score > threshold,
                timestamp: point.timestamp,
            });
        }

        // Per-workload mode emits grouped output; restore global time order
        records.sort_by_key(|r| r.timestamp);

        debug!(
            metric = %metric,
            windows = windows.len(),
            anomalies = records.iter().filter(|r| r.is_anomaly).count(),
            "Sequence scoring completed"
        );
        Ok(records)
    }

    /// Cut stride-1 windows; returns the windows and, for each, the index of
    /// the sample that follows it
    fn build_windows(&self, points: &[Point<'_>], scaled: &[f32]) -> (Vec<Vec<f32>>, Vec<usize>) {
        let segments: Vec<Vec<usize>> = match self.windowing {
            WindowingMode::Combined => vec![(0..points.len()).collect()],
            WindowingMode::PerWorkload => {
                let mut by_workload: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
                for (idx, point) in points.iter().enumerate() {
                    by_workload.entry(point.workload_id).or_default().push(idx);
                }
                by_workload.into_values().collect()
            }
        };

        let mut windows = Vec::new();
        let mut targets = Vec::new();
        for segment in segments {
            if segment.len() <= SEQ_LEN {
                continue;
            }
            for start in 0..segment.len() - SEQ_LEN {
                windows.push(
                    segment[start..start + SEQ_LEN]
                        .iter()
                        .map(|&i| scaled[i])
                        .collect(),
                );
                targets.push(segment[start + SEQ_LEN]);
            }
        }
        (windows, targets)
    }
}

/// Mean absolute difference over the window length and the single feature
fn reconstruction_error(input: &[f32], output: &[f32]) -> Result<f64, ModelError> {
    if input.len() != output.len() || input.is_empty() {
        return Err(ModelError::Shape {
            expected: input.len(),
            actual: output.len(),
        });
    }
    let total: f64 = input
        .iter()
        .zip(output)
        .map(|(a, b)| f64::from((a - b).abs()))
        .sum();
    Ok(total / input.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::scaler::ScalerConfig;
    use crate::model::MeanReconstructor;
    use crate::models::MetricSample;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and delegates to the mean reconstructor
    struct CountingModel {
        calls: AtomicUsize,
    }

    impl CountingModel {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Reconstructor for CountingModel {
        fn reconstruct(&self, windows: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            MeanReconstructor.reconstruct(windows)
        }

        fn version(&self) -> &str {
            "counting"
        }
    }

    fn base_time() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn series(id: &str, values: &[f64]) -> Vec<MetricSample> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| MetricSample::new(id, *v, 100.0, 0, base_time() + Duration::seconds(i as i64 * 10)))
            .collect()
    }

    fn scorer(model: Arc<dyn Reconstructor>, mode: WindowingMode) -> SequenceScorer {
        SequenceScorer::new(model, Arc::new(ScalerState::new(ScalerConfig::default())), mode)
    }

    fn spiked(len: usize, spike_at: usize) -> Vec<f64> {
        (0..len).map(|i| if i == spike_at { 5.0 } else { 1.0 }).collect()
    }

    #[test]
    fn test_short_window_skips_model() {
        let model = Arc::new(CountingModel::new());
        let scorer = scorer(model.clone(), WindowingMode::Combined);
        let window = MetricWindow::from_samples(series("api", &vec![1.0; MIN_PREDICTIVE_SAMPLES - 1]));

        let records = scorer.score_all(&window, Metric::CpuUsage, 0.0).unwrap();
        assert!(records.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert!(scorer.scalers().params(Metric::CpuUsage).is_none());
    }

    #[test]
    fn test_window_count_and_alignment() {
        let scorer = scorer(Arc::new(MeanReconstructor), WindowingMode::Combined);
        let samples = series("api", &spiked(40, 35));
        let window = MetricWindow::from_samples(samples.clone());

        let records = scorer.score_all(&window, Metric::CpuUsage, 0.0).unwrap();
        assert_eq!(records.len(), 40 - SEQ_LEN);
        // First window covers [0, 30) and reports on sample 30
        assert_eq!(records[0].timestamp, samples[SEQ_LEN].timestamp);
        assert_eq!(records.last().unwrap().timestamp, samples[39].timestamp);
    }

    #[test]
    fn test_spike_windows_score_higher() {
        let scorer = scorer(Arc::new(MeanReconstructor), WindowingMode::Combined);
        let samples = series("api", &spiked(70, 50));
        let window = MetricWindow::from_samples(samples);

        let records = scorer.score_all(&window, Metric::CpuUsage, 0.0103).unwrap();
        // Window starting at i covers [i, i+30); the spike at 50 is inside for i in 21..=50
        let stable_max = records[..21]
            .iter()
            .map(|r| r.anomaly_score)
            .fold(f64::MIN, f64::max);
        let spike_min = records[21..=39]
            .iter()
            .map(|r| r.anomaly_score)
            .fold(f64::MAX, f64::min);
        assert!(spike_min > stable_max, "spike {} vs stable {}", spike_min, stable_max);

        let anomalies = scorer.score(&window, Metric::CpuUsage, 0.0103).unwrap();
        assert!(!anomalies.is_empty());
        assert!(anomalies.iter().all(|r| r.is_anomaly && r.anomaly_score > 0.0103));
    }

    #[test]
    fn test_scores_are_deterministic() {
        let scorer = scorer(Arc::new(MeanReconstructor), WindowingMode::PerWorkload);
        let window = MetricWindow::from_samples(series("api", &spiked(50, 40)));

        let first = scorer.score_all(&window, Metric::CpuUsage, 0.01).unwrap();
        let second = scorer.score_all(&window, Metric::CpuUsage, 0.01).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_scaler_not_refit_on_later_calls() {
        let scorer = scorer(Arc::new(MeanReconstructor), WindowingMode::Combined);
        let first = MetricWindow::from_samples(series("api", &vec![1.0; 40]));
        scorer.score_all(&first, Metric::CpuUsage, 0.01).unwrap();
        let fitted = scorer.scalers().params(Metric::CpuUsage).unwrap();

        let second = MetricWindow::from_samples(series("api", &spiked(40, 35)));
        scorer.score_all(&second, Metric::CpuUsage, 0.01).unwrap();
        assert_eq!(scorer.scalers().params(Metric::CpuUsage).unwrap(), fitted);
    }

    #[test]
    fn test_per_workload_requires_full_window_per_workload() {
        let model = Arc::new(CountingModel::new());
        let scorer = scorer(model.clone(), WindowingMode::PerWorkload);

        // Two interleaved workloads with 20 samples each: enough combined, not per workload
        let mut samples = series("a", &vec![1.0; 20]);
        for s in series("b", &vec![2.0; 20]) {
            samples.push(MetricSample {
                timestamp: s.timestamp + Duration::seconds(5),
                ..s
            });
        }
        let window = MetricWindow::from_samples(samples);

        assert!(scorer.score_all(&window, Metric::CpuUsage, 0.0).unwrap().is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_combined_mode_windows_cross_workloads() {
        let scorer = scorer(Arc::new(MeanReconstructor), WindowingMode::Combined);
        let mut samples = series("a", &vec![1.0; 20]);
        for s in series("b", &vec![2.0; 20]) {
            samples.push(MetricSample {
                timestamp: s.timestamp + Duration::seconds(5),
                ..s
            });
        }
        let window = MetricWindow::from_samples(samples);

        let records = scorer.score_all(&window, Metric::CpuUsage, 0.0).unwrap();
        assert_eq!(records.len(), 40 - SEQ_LEN);
        // Alternating a/b values never reconstruct exactly from the mean
        assert!(records.iter().all(|r| r.anomaly_score > 0.0));
    }

    #[test]
    fn test_per_workload_records_in_time_order() {
        let scorer = scorer(Arc::new(MeanReconstructor), WindowingMode::PerWorkload);
        let mut samples = series("a", &vec![1.0; 35]);
        for s in series("b", &vec![2.0; 35]) {
            samples.push(MetricSample {
                timestamp: s.timestamp + Duration::seconds(5),
                ..s
            });
        }
        let window = MetricWindow::from_samples(samples);

        let records = scorer.score_all(&window, Metric::CpuUsage, 0.0).unwrap();
        assert_eq!(records.len(), 2 * (35 - SEQ_LEN));
        assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(records[0].workload_id, "a");
        assert_eq!(records[1].workload_id, "b");
    }

    #[test]
    fn test_missing_values_dropped() {
        let model = Arc::new(CountingModel::new());
        let scorer = scorer(model.clone(), WindowingMode::Combined);
        let mut samples = series("api", &vec![1.0; 40]);
        for s in samples.iter_mut().take(10) {
            s.memory_usage_mb = f64::NAN;
        }
        let window = MetricWindow::from_samples(samples);

        // Only 30 memory readings remain, below the minimum
        assert!(scorer.score_all(&window, Metric::MemoryUsage, 0.0).unwrap().is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reconstruction_error_shape_mismatch() {
        assert!(reconstruction_error(&[1.0, 2.0], &[1.0]).is_err());
        assert_eq!(reconstruction_error(&[1.0, 3.0], &[2.0, 2.0]).unwrap(), 1.0);
    }
}
