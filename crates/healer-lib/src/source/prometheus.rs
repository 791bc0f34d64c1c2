//! Prometheus instant-query source
//!
//! Issues one instant query per metric and joins the results by the `pod`
//! label. CPU series drive the join; a pod without a CPU series is skipped.

use super::{SampleSource, SourceError};
use crate::models::MetricSample;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const CPU_QUERY: &str = r#"container_cpu_usage_seconds_total{pod!=""}"#;
pub const MEMORY_QUERY: &str = r#"container_memory_usage_bytes{pod!=""}"#;
pub const RESTART_QUERY: &str = "kube_pod_container_status_restarts_total";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: HashMap<String, String>,
    /// `[unix_seconds, "value"]`
    value: (f64, String),
}

impl VectorSample {
    fn pod(&self) -> Option<&str> {
        self.metric.get("pod").map(String::as_str).filter(|p| !p.is_empty())
    }

    /// Usage and counters are never negative; such values are dropped as invalid
    fn parsed(&self) -> Option<f64> {
        let value = self.value.1.parse::<f64>().ok()?;
        if !value.is_finite() || value < 0.0 {
            debug!(pod = ?self.pod(), value = %self.value.1, "Dropping invalid sample value");
            return None;
        }
        Some(value)
    }
}

/// Sample source backed by the Prometheus HTTP API
pub struct PrometheusSource {
    client: Client,
    query_url: Url,
}

impl PrometheusSource {
    /// Create a source for the server at `base_url` (e.g. `http://prometheus:9090`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Request(e.to_string()))?;
        let query_url = Url::parse(base_url)
            .and_then(|base| base.join("/api/v1/query"))
            .map_err(|e| SourceError::Request(format!("invalid Prometheus URL: {}", e)))?;

        Ok(Self { client, query_url })
    }

    async fn query(&self, promql: &str) -> Result<Vec<VectorSample>, SourceError> {
        let response = self
            .client
            .get(self.query_url.clone())
            .query(&[("query", promql)])
            .send()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        if parsed.status != "success" {
            return Err(SourceError::Decode(
                parsed.error.unwrap_or_else(|| format!("query status {}", parsed.status)),
            ));
        }

        let result = parsed.data.map(|d| d.result).unwrap_or_default();
        debug!(query = %promql, series = result.len(), "Prometheus query complete");
        Ok(result)
    }
}

/// First value per pod; later series for the same pod are ignored
fn first_by_pod(series: &[VectorSample]) -> HashMap<&str, f64> {
    let mut values = HashMap::new();
    for sample in series {
        if let (Some(pod), Some(value)) = (sample.pod(), sample.parsed()) {
            values.entry(pod).or_insert(value);
        }
    }
    values
}

#[async_trait]
impl SampleSource for PrometheusSource {
    async fn fetch(&self) -> Result<Vec<MetricSample>, SourceError> {
        let (cpu, memory, restarts) = tokio::try_join!(
            self.query(CPU_QUERY),
            self.query(MEMORY_QUERY),
            self.query(RESTART_QUERY)
        )?;

        if cpu.is_empty() {
            warn!("CPU metrics not available yet");
            return Ok(Vec::new());
        }

        let memory = first_by_pod(&memory);
        let restarts = first_by_pod(&restarts);
        let now = Utc::now();

        let mut seen = HashSet::new();
        let samples = cpu
            .iter()
            .filter_map(|series| {
                let pod = series.pod()?;
                let cpu_usage = series.parsed()?;
                if !seen.insert(pod) {
                    return None;
                }
                let memory_mb = memory.get(pod).copied().unwrap_or(0.0) / BYTES_PER_MB;
                let restart_count = restarts.get(pod).copied().unwrap_or(0.0).max(0.0) as u32;
                Some(MetricSample::new(pod, cpu_usage, memory_mb, restart_count, now))
            })
            .collect();

        Ok(samples)
    }

    fn name(&self) -> &str {
        "prometheus"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn vector(series: &[(&str, &str)]) -> String {
        let result: Vec<_> = series
            .iter()
            .map(|(pod, value)| {
                serde_json::json!({
                    "metric": { "pod": pod, "namespace": "default" },
                    "value": [1_700_000_000.0, value]
                })
            })
            .collect();
        serde_json::json!({
            "status": "success",
            "data": { "resultType": "vector", "result": result }
        })
        .to_string()
    }

    async fn mock_query(server: &mut Server, query: &str, body: String) -> mockito::Mock {
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::UrlEncoded("query".into(), query.into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_fetch_joins_by_pod() {
        let mut server = Server::new_async().await;
        let _cpu = mock_query(
            &mut server,
            CPU_QUERY,
            vector(&[("web-1", "12.5"), ("web-1", "99"), ("db-0", "3")]),
        )
        .await;
        let _mem = mock_query(&mut server, MEMORY_QUERY, vector(&[("web-1", "209715200")])).await;
        let _restarts = mock_query(&mut server, RESTART_QUERY, vector(&[("db-0", "4")])).await;

        let source = PrometheusSource::new(&server.url(), Duration::from_secs(5)).unwrap();
        let samples = source.fetch().await.unwrap();

        assert_eq!(samples.len(), 2);
        let web = &samples[0];
        assert_eq!(web.workload_id, "web-1");
        assert_eq!(web.cpu_usage, 12.5);
        assert_eq!(web.memory_usage_mb, 200.0);
        assert_eq!(web.restart_count, 0);

        let db = samples.iter().find(|s| s.workload_id == "db-0").unwrap();
        assert_eq!(db.memory_usage_mb, 0.0);
        assert_eq!(db.restart_count, 4);
    }

    #[tokio::test]
    async fn test_negative_values_rejected() {
        let mut server = Server::new_async().await;
        let _cpu = mock_query(
            &mut server,
            CPU_QUERY,
            vector(&[("bad-0", "-2.5"), ("web-1", "-1"), ("web-1", "4"), ("db-0", "NaN")]),
        )
        .await;
        let _mem = mock_query(&mut server, MEMORY_QUERY, vector(&[("web-1", "-1048576")])).await;
        let _restarts = mock_query(&mut server, RESTART_QUERY, vector(&[])).await;

        let source = PrometheusSource::new(&server.url(), Duration::from_secs(5)).unwrap();
        let samples = source.fetch().await.unwrap();

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].workload_id, "web-1");
        assert_eq!(samples[0].cpu_usage, 4.0);
        assert_eq!(samples[0].memory_usage_mb, 0.0);
    }

    #[tokio::test]
    async fn test_no_cpu_series_yields_nothing() {
        let mut server = Server::new_async().await;
        let _cpu = mock_query(&mut server, CPU_QUERY, vector(&[])).await;
        let _mem = mock_query(&mut server, MEMORY_QUERY, vector(&[("web-1", "1")])).await;
        let _restarts = mock_query(&mut server, RESTART_QUERY, vector(&[])).await;

        let source = PrometheusSource::new(&server.url(), Duration::from_secs(5)).unwrap();
        assert!(source.fetch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = Server::new_async().await;
        let _any = server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let source = PrometheusSource::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 503, .. }));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(PrometheusSource::new("not a url", Duration::from_secs(1)).is_err());
    }
}
