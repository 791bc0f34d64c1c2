//! ONNX inference using tract
//!
//! Loads the sequence autoencoder exported by offline training and runs one
//! window per inference call with a fixed `[1, SEQ_LEN, 1]` input.

use super::{ModelError, Reconstructor};
use crate::models::SEQ_LEN;
use std::path::Path;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Maximum per-window inference latency before warning
const MAX_INFERENCE_MS: u128 = 5;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX-based reconstructor using tract for lightweight inference
pub struct OnnxReconstructor {
    model: TractModel,
    version: String,
}

impl OnnxReconstructor {
    /// Create a reconstructor from model bytes
    pub fn from_bytes(model_bytes: &[u8], version: impl Into<String>) -> Result<Self, ModelError> {
        Ok(Self {
            model: Self::load_model(model_bytes)?,
            version: version.into(),
        })
    }

    /// Create a reconstructor from an artifact on disk
    pub fn from_file(path: &Path, version: impl Into<String>) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path)
            .map_err(|e| ModelError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_bytes(&bytes, version)
    }

    /// Load and optimize an ONNX model from bytes
    fn load_model(model_bytes: &[u8]) -> Result<TractModel, ModelError> {
        tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .and_then(|m| m.with_input_fact(0, f32::fact([1, SEQ_LEN, 1]).into()))
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| ModelError::Load(e.to_string()))
    }

    fn run_window(&self, window: &[f32]) -> Result<Vec<f32>, ModelError> {
        if window.len() != SEQ_LEN {
            return Err(ModelError::Shape {
                expected: SEQ_LEN,
                actual: window.len(),
            });
        }

        let input: Tensor = tract_ndarray::Array3::from_shape_vec((1, SEQ_LEN, 1), window.to_vec())
            .map_err(|e| ModelError::Inference(e.to_string()))?
            .into();

        let result = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| ModelError::Inference(e.to_string()))?;
        let output = result
            .first()
            .ok_or_else(|| ModelError::Inference("no output from model".to_string()))?;

        let values: Vec<f32> = output
            .to_array_view::<f32>()
            .map_err(|e| ModelError::Inference(e.to_string()))?
            .iter()
            .copied()
            .collect();

        if values.len() != SEQ_LEN {
            return Err(ModelError::Shape {
                expected: SEQ_LEN,
                actual: values.len(),
            });
        }
        Ok(values)
    }
}

impl Reconstructor for OnnxReconstructor {
    fn reconstruct(&self, windows: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, ModelError> {
        let mut reconstructed = Vec::with_capacity(windows.len());

        for window in windows {
            let start = Instant::now();
            reconstructed.push(self.run_window(window)?);

            let elapsed = start.elapsed();
            if elapsed.as_millis() > MAX_INFERENCE_MS {
                warn!(elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms target", MAX_INFERENCE_MS);
            }
        }

        debug!(windows = windows.len(), version = %self.version, "Reconstruction completed");
        Ok(reconstructed)
    }

    fn version(&self) -> &str {
        &self.version
    }
}

/// Fallback reconstructor that predicts every window as its own mean
///
/// Flat windows reconstruct perfectly; windows containing a spike do not.
/// Only used when no trained artifact is configured and fallback is allowed.
#[derive(Debug, Clone, Default)]
pub struct MeanReconstructor;

impl Reconstructor for MeanReconstructor {
    fn reconstruct(&self, windows: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(windows
            .iter()
            .map(|w| {
                let mean = if w.is_empty() {
                    0.0
                } else {
                    w.iter().sum::<f32>() / w.len() as f32
                };
                vec![mean; w.len()]
            })
            .collect())
    }

    fn version(&self) -> &str {
        "fallback"
    }
}
