//! Metrics window store
//!
//! Persists collected samples and serves time-ordered windows to the
//! detectors. The engine only sees this trait, never the storage layout.

mod memory;

pub use memory::{InMemoryMetricsStore, StoreConfig};

use crate::models::{MetricSample, MetricWindow};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Trait for sample storage implementations
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Append one sample
    async fn insert(&self, sample: MetricSample) -> Result<()>;

    /// Append samples in order
    async fn insert_batch(&self, samples: Vec<MetricSample>) -> Result<usize> {
        let count = samples.len();
        for sample in samples {
            self.insert(sample).await?;
        }
        Ok(count)
    }

    /// All samples with `timestamp >= since`, in non-decreasing timestamp order
    async fn window_since(&self, since: DateTime<Utc>) -> Result<MetricWindow>;

    /// Samples recorded within `lookback` of now
    async fn window(&self, lookback: Duration) -> Result<MetricWindow> {
        let since = chrono::Duration::from_std(lookback)
            .ok()
            .and_then(|lookback| Utc::now().checked_sub_signed(lookback))
            .with_context(|| format!("lookback of {}s is out of range", lookback.as_secs()))?;
        self.window_since(since).await
    }
}
