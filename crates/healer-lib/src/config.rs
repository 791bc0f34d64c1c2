//! Engine configuration
//!
//! Every field carries a serde default so partial files and environment
//! overrides merge onto the stock values.

use crate::anomaly::{
    ScalerConfig, WindowingMode, DEFAULT_ANOMALY_THRESHOLD, DEFAULT_CPU_THRESHOLD,
    DEFAULT_RESTART_THRESHOLD,
};
use crate::policy::ActionThresholds;
use crate::protected::ProtectedSet;
use crate::remediation::RemediationConfig;
use crate::store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rule-based detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_cpu_threshold")]
    pub cpu_usage: f64,
    #[serde(default = "default_restart_threshold")]
    pub restart_count: u32,
    #[serde(default = "default_threshold_lookback")]
    pub lookback_secs: u64,
}

fn default_cpu_threshold() -> f64 {
    DEFAULT_CPU_THRESHOLD
}

fn default_restart_threshold() -> u32 {
    DEFAULT_RESTART_THRESHOLD
}

fn default_threshold_lookback() -> u64 {
    120
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cpu_usage: DEFAULT_CPU_THRESHOLD,
            restart_count: DEFAULT_RESTART_THRESHOLD,
            lookback_secs: default_threshold_lookback(),
        }
    }
}

impl ThresholdConfig {
    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_secs)
    }
}

/// Sequence scorer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveConfig {
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,
    #[serde(default = "default_predictive_lookback")]
    pub lookback_secs: u64,
    #[serde(default)]
    pub windowing: WindowingMode,
    #[serde(default)]
    pub scaler: ScalerConfig,
}

fn default_anomaly_threshold() -> f64 {
    DEFAULT_ANOMALY_THRESHOLD
}

fn default_predictive_lookback() -> u64 {
    600
}

impl Default for PredictiveConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: DEFAULT_ANOMALY_THRESHOLD,
            lookback_secs: default_predictive_lookback(),
            windowing: WindowingMode::default(),
            scaler: ScalerConfig::default(),
        }
    }
}

impl PredictiveConfig {
    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_secs)
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub threshold: ThresholdConfig,
    #[serde(default)]
    pub predictive: PredictiveConfig,
    #[serde(default)]
    pub actions: ActionThresholds,
    #[serde(default)]
    pub remediation: RemediationConfig,
    #[serde(default)]
    pub protected: ProtectedSet,
    #[serde(default)]
    pub store: StoreConfig,
}
