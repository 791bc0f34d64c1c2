//! Anomaly detection over metric windows
//!
//! This module provides detection for:
//! - Static threshold breaches on raw CPU and restart values
//! - Sequence-reconstruction anomalies scored by a pretrained model
//! - The min-max scalers the sequence scorer normalizes with

mod scaler;
mod sequence;
mod threshold;

pub use scaler::{RefitPolicy, ScalerConfig, ScalerParams, ScalerState};
pub use sequence::{SequenceScorer, WindowingMode, DEFAULT_ANOMALY_THRESHOLD};
pub use threshold::{
    ThresholdDetector, DEFAULT_CPU_THRESHOLD, DEFAULT_RESTART_THRESHOLD, THRESHOLD_REASON,
};
