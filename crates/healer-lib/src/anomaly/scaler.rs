//! Min-max normalization with explicit fit policy
//!
//! Values fed to the reconstruction model must be mapped the same way on
//! every call. Each metric gets its own scaler, fitted at most once unless a
//! periodic refit policy is configured. Preset parameters produced by offline
//! training are used verbatim and never refit.

use crate::models::Metric;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Fitted min-max parameters for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub data_min: f64,
    pub data_max: f64,
}

impl ScalerParams {
    /// Fit over observed values, ignoring non-finite entries
    pub fn fit(values: &[f64]) -> Option<Self> {
        let mut finite = values.iter().copied().filter(|v| v.is_finite());
        let first = finite.next()?;
        let (data_min, data_max) = finite.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        Some(Self { data_min, data_max })
    }

    /// Map a value into the fitted range; out-of-range values extrapolate
    pub fn transform(&self, value: f64) -> f64 {
        let range = self.data_max - self.data_min;
        // A constant series maps with unit scale rather than dividing by zero
        let scale = if range.abs() < f64::EPSILON { 1.0 } else { 1.0 / range };
        (value - self.data_min) * scale
    }
}

/// When fitted parameters may be replaced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RefitPolicy {
    /// Fit on first use, keep for the process lifetime
    #[default]
    Never,
    /// Refit from the current batch once the previous fit is older than the interval
    Periodic { interval_secs: u64 },
}

/// Scaler configuration handed to the scorer at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerConfig {
    #[serde(default = "default_scaler_version")]
    pub version: String,
    #[serde(default)]
    pub refit: RefitPolicy,
    /// Parameters persisted by offline training, keyed by metric
    #[serde(default)]
    pub preset: HashMap<Metric, ScalerParams>,
}

fn default_scaler_version() -> String {
    "fit-once-v1".to_string()
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            version: default_scaler_version(),
            refit: RefitPolicy::Never,
            preset: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct FittedScaler {
    params: ScalerParams,
    fitted_at: Instant,
    preset: bool,
}

impl FittedScaler {
    fn is_stale(&self, policy: &RefitPolicy) -> bool {
        match policy {
            _ if self.preset => false,
            RefitPolicy::Never => false,
            RefitPolicy::Periodic { interval_secs } => {
                self.fitted_at.elapsed() >= Duration::from_secs(*interval_secs)
            }
        }
    }
}

/// Per-metric scaler state shared by all scoring calls
#[derive(Debug)]
pub struct ScalerState {
    config: ScalerConfig,
    fitted: RwLock<HashMap<Metric, FittedScaler>>,
}

impl ScalerState {
    pub fn new(config: ScalerConfig) -> Self {
        let now = Instant::now();
        let fitted = config
            .preset
            .iter()
            .map(|(metric, params)| {
                (
                    *metric,
                    FittedScaler {
                        params: *params,
                        fitted_at: now,
                        preset: true,
                    },
                )
            })
            .collect();

        Self {
            config,
            fitted: RwLock::new(fitted),
        }
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    /// Current parameters for a metric, if it has been fitted
    pub fn params(&self, metric: Metric) -> Option<ScalerParams> {
        self.fitted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&metric)
            .map(|f| f.params)
    }

    /// Return fitted parameters, fitting from `values` only when allowed
    ///
    /// The fit happens under the write lock after re-checking, so concurrent
    /// first calls produce exactly one fit.
    pub fn get_or_fit(&self, metric: Metric, values: &[f64]) -> Option<ScalerParams> {
        {
            let fitted = self.fitted.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = fitted.get(&metric) {
                if !existing.is_stale(&self.config.refit) {
                    return Some(existing.params);
                }
            }
        }

        let mut fitted = self.fitted.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = fitted.get(&metric) {
            if !existing.is_stale(&self.config.refit) {
                return Some(existing.params);
            }
        }

        let params = ScalerParams::fit(values)?;
        let refit = fitted.contains_key(&metric);
        fitted.insert(
            metric,
            FittedScaler {
                params,
                fitted_at: Instant::now(),
                preset: false,
            },
        );

        if refit {
            info!(
                metric = %metric,
                data_min = params.data_min,
                data_max = params.data_max,
                "Scaler refitted"
            );
        } else {
            debug!(
                metric = %metric,
                data_min = params.data_min,
                data_max = params.data_max,
                samples = values.len(),
                "Scaler fitted"
            );
        }

        Some(params)
    }

    /// Normalize a value with the already-fitted scaler for the metric
    pub fn normalize(&self, metric: Metric, value: f64) -> Option<f64> {
        self.params(metric).map(|p| p.transform(value))
    }
}

impl Default for ScalerState {
    fn default() -> Self {
        Self::new(ScalerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fit_and_transform() {
        let params = ScalerParams::fit(&[2.0, 4.0, 6.0]).unwrap();
        assert_eq!(params.transform(2.0), 0.0);
        assert_eq!(params.transform(6.0), 1.0);
        assert!((params.transform(4.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_extrapolates_outside_range() {
        let params = ScalerParams::fit(&[0.0, 10.0]).unwrap();
        assert!((params.transform(20.0) - 2.0).abs() < 1e-12);
        assert!((params.transform(-5.0) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_constant_series_unit_scale() {
        let params = ScalerParams::fit(&[3.0, 3.0, 3.0]).unwrap();
        assert_eq!(params.transform(3.0), 0.0);
        assert_eq!(params.transform(4.0), 1.0);
    }

    #[test]
    fn test_fit_empty_is_none() {
        assert!(ScalerParams::fit(&[]).is_none());
        assert!(ScalerParams::fit(&[f64::NAN]).is_none());
    }

    #[test]
    fn test_never_refit() {
        let state = ScalerState::default();
        let first = state.get_or_fit(Metric::CpuUsage, &[0.0, 1.0]).unwrap();
        let second = state.get_or_fit(Metric::CpuUsage, &[0.0, 100.0]).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.data_max, 1.0);
    }

    #[test]
    fn test_scalers_are_per_metric() {
        let state = ScalerState::default();
        state.get_or_fit(Metric::CpuUsage, &[0.0, 1.0]);
        let memory = state.get_or_fit(Metric::MemoryUsage, &[100.0, 500.0]).unwrap();
        assert_eq!(memory.data_min, 100.0);
        assert_eq!(state.params(Metric::CpuUsage).unwrap().data_max, 1.0);
        assert!(state.params(Metric::RestartCount).is_none());
    }

    #[test]
    fn test_preset_is_never_refit() {
        let mut preset = HashMap::new();
        preset.insert(
            Metric::CpuUsage,
            ScalerParams {
                data_min: 0.0,
                data_max: 4.0,
            },
        );
        let state = ScalerState::new(ScalerConfig {
            version: "trained-2024-01".to_string(),
            refit: RefitPolicy::Periodic { interval_secs: 0 },
            preset,
        });
        let params = state.get_or_fit(Metric::CpuUsage, &[0.0, 100.0]).unwrap();
        assert_eq!(params.data_max, 4.0);
        assert_eq!(state.version(), "trained-2024-01");
    }

    #[test]
    fn test_periodic_refit_when_stale() {
        let state = ScalerState::new(ScalerConfig {
            refit: RefitPolicy::Periodic { interval_secs: 0 },
            ..ScalerConfig::default()
        });
        state.get_or_fit(Metric::CpuUsage, &[0.0, 1.0]);
        let refit = state.get_or_fit(Metric::CpuUsage, &[0.0, 8.0]).unwrap();
        assert_eq!(refit.data_max, 8.0);
    }

    #[test]
    fn test_concurrent_first_fit_happens_once() {
        let state = Arc::new(ScalerState::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = state.clone();
                std::thread::spawn(move || {
                    state
                        .get_or_fit(Metric::CpuUsage, &[0.0, i as f64 + 1.0])
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|p| *p == results[0]));
    }

    #[test]
    fn test_refit_policy_deserialization() {
        let policy: RefitPolicy =
            serde_json::from_str(r#"{"mode":"periodic","interval_secs":3600}"#).unwrap();
        assert_eq!(policy, RefitPolicy::Periodic { interval_secs: 3600 });
    }
}
