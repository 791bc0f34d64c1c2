//! Metric sample sources
//!
//! A source produces a batch of per-workload samples on demand. Collection
//! is trigger-driven; the engine never polls a source on its own.

mod prometheus;

pub use self::prometheus::{PrometheusSource, CPU_QUERY, MEMORY_QUERY, RESTART_QUERY};

use crate::models::MetricSample;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from fetching samples
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Trait for metric sample providers
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Fetch the current value of every tracked metric for every workload
    async fn fetch(&self) -> Result<Vec<MetricSample>, SourceError>;

    /// Identifier used in logs and health reports
    fn name(&self) -> &str;
}
