//! Sequence-reconstruction model contract
//!
//! The scorer treats the trained model as a black box: a batch of
//! normalized windows of length `SEQ_LEN` goes in, a reconstruction of the
//! same shape comes out.

mod inference;

pub use inference::{MeanReconstructor, OnnxReconstructor};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors raised while loading or running a model artifact
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to load model artifact: {0}")]
    Load(String),
    #[error("model inference failed: {0}")]
    Inference(String),
    #[error("model output has {actual} values, expected {expected}")]
    Shape { expected: usize, actual: usize },
    #[error("model checksum mismatch: expected {expected}, got {actual}")]
    Checksum { expected: String, actual: String },
}

/// Trait for reconstruction model implementations
pub trait Reconstructor: Send + Sync {
    /// Reconstruct each window; every output window has the input's length
    fn reconstruct(&self, windows: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, ModelError>;

    /// Version string of the loaded artifact
    fn version(&self) -> &str;
}

/// Verify a model artifact against an expected hex-encoded SHA-256 digest
pub fn verify_checksum(bytes: &[u8], expected_hex: &str) -> Result<(), ModelError> {
    let actual = hex::encode(Sha256::digest(bytes));
    if actual.eq_ignore_ascii_case(expected_hex.trim()) {
        Ok(())
    } else {
        Err(ModelError::Checksum {
            expected: expected_hex.trim().to_string(),
            actual,
        })
    }
}
