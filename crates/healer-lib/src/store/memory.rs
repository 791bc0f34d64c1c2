//! In-memory sample store with retention and size bound
//!
//! Samples live in a FIFO ring. Once `max_samples` is reached the oldest
//! entries are evicted; entries older than the retention period are dropped
//! on every insert.

use super::MetricsStore;
use crate::models::{MetricSample, MetricWindow};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;
use tracing::debug;

/// Default retention period (1 hour)
const DEFAULT_RETENTION_SECS: u64 = 60 * 60;

/// Default maximum number of stored samples
const DEFAULT_MAX_SAMPLES: usize = 100_000;

/// Configuration for the in-memory store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

fn default_retention_secs() -> u64 {
    DEFAULT_RETENTION_SECS
}

fn default_max_samples() -> usize {
    DEFAULT_MAX_SAMPLES
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention_secs: DEFAULT_RETENTION_SECS,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

/// Sample store held in process memory
#[derive(Debug, Default)]
pub struct InMemoryMetricsStore {
    samples: RwLock<VecDeque<MetricSample>>,
    config: StoreConfig,
}

impl InMemoryMetricsStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            samples: RwLock::new(VecDeque::with_capacity(config.max_samples.min(10_000))),
            config,
        }
    }

    pub async fn len(&self) -> usize {
        self.samples.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.samples.read().await.is_empty()
    }

    /// Oldest timestamp kept; `None` when retention reaches past the
    /// representable time range, so nothing expires
    fn retention_cutoff(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.config.retention_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
    }

    /// Drop expired samples, then the oldest beyond `max_samples`
    fn evict(&self, samples: &mut VecDeque<MetricSample>) {
        let before = samples.len();
        if let Some(cutoff) = self.retention_cutoff() {
            samples.retain(|s| s.timestamp >= cutoff);
        }

        let excess = samples.len().saturating_sub(self.config.max_samples.max(1));
        samples.drain(..excess);

        let evicted = before - samples.len();
        if evicted > 0 {
            debug!(evicted = evicted, remaining = samples.len(), "Evicted stored samples");
        }
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn insert(&self, sample: MetricSample) -> Result<()> {
        let mut samples = self.samples.write().await;
        samples.push_back(sample);
        self.evict(&mut samples);
        Ok(())
    }

    async fn insert_batch(&self, batch: Vec<MetricSample>) -> Result<usize> {
        let count = batch.len();
        let mut samples = self.samples.write().await;
        samples.extend(batch);
        self.evict(&mut samples);
        Ok(count)
    }

    async fn window_since(&self, since: DateTime<Utc>) -> Result<MetricWindow> {
        let selected: Vec<MetricSample> = self
            .samples
            .read()
            .await
            .iter()
            .filter(|s| s.timestamp >= since)
            .cloned()
            .collect();
        Ok(MetricWindow::from_samples(selected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn sample(id: &str, secs_ago: i64) -> MetricSample {
        MetricSample::new(id, 0.1, 128.0, 0, Utc::now() - chrono::Duration::seconds(secs_ago))
    }

    #[tokio::test]
    async fn test_window_filters_by_lookback() {
        let store = InMemoryMetricsStore::new(StoreConfig::default());
        assert_ok!(store.insert(sample("old", 900)).await);
        assert_ok!(store.insert(sample("recent", 30)).await);

        let window = store.window(Duration::from_secs(120)).await.unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window.samples()[0].workload_id, "recent");
    }

    #[tokio::test]
    async fn test_window_is_time_ordered() {
        let store = InMemoryMetricsStore::default();
        let inserted = store
            .insert_batch(vec![sample("c", 10), sample("a", 50), sample("b", 30)])
            .await
            .unwrap();
        assert_eq!(inserted, 3);

        let window = store.window(Duration::from_secs(600)).await.unwrap();
        let ids: Vec<_> = window.iter().map(|s| s.workload_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_max_samples_evicts_oldest_inserted() {
        let store = InMemoryMetricsStore::new(StoreConfig {
            max_samples: 2,
            ..StoreConfig::default()
        });
        store.insert(sample("first", 3)).await.unwrap();
        store.insert(sample("second", 2)).await.unwrap();
        store.insert(sample("third", 1)).await.unwrap();

        assert_eq!(store.len().await, 2);
        let window = store.window(Duration::from_secs(60)).await.unwrap();
        assert!(window.latest_for("first").is_none());
    }

    #[tokio::test]
    async fn test_retention_drops_expired() {
        let store = InMemoryMetricsStore::new(StoreConfig {
            retention_secs: 60,
            ..StoreConfig::default()
        });
        store.insert(sample("expired", 120)).await.unwrap();
        store.insert(sample("fresh", 5)).await.unwrap();

        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_batch_larger_than_capacity_keeps_newest() {
        let store = InMemoryMetricsStore::new(StoreConfig {
            max_samples: 3,
            ..StoreConfig::default()
        });
        store.insert(sample("stored", 10)).await.unwrap();
        let batch = (0..5).map(|i| sample(&format!("pod-{}", i), 5)).collect();
        assert_eq!(store.insert_batch(batch).await.unwrap(), 5);

        let window = store.window(Duration::from_secs(60)).await.unwrap();
        let ids: Vec<_> = window.iter().map(|s| s.workload_id.as_str()).collect();
        assert_eq!(ids, vec!["pod-2", "pod-3", "pod-4"]);
    }

    #[tokio::test]
    async fn test_huge_retention_keeps_everything() {
        let store = InMemoryMetricsStore::new(StoreConfig {
            retention_secs: u64::MAX,
            ..StoreConfig::default()
        });
        assert_ok!(store.insert(sample("ancient", 86_400 * 365)).await);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_out_of_range_lookback_is_error() {
        let store = InMemoryMetricsStore::default();
        store.insert(sample("web-1", 5)).await.unwrap();

        let err = store
            .window(Duration::from_secs(u64::MAX / 2))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
