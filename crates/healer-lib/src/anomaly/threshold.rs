//! Rule-based threshold detection
//!
//! Compares each raw sample against static CPU and restart limits. Samples
//! are judged independently; a workload breaching in several samples yields
//! several events.

use crate::models::{MetricWindow, ThresholdEvent};

/// Default CPU usage limit
pub const DEFAULT_CPU_THRESHOLD: f64 = 300.0;

/// Default restart count limit
pub const DEFAULT_RESTART_THRESHOLD: u32 = 5;

/// Reason attached to every threshold event
pub const THRESHOLD_REASON: &str = "threshold breach";

/// Stateless detector over raw metric values
#[derive(Debug, Clone)]
pub struct ThresholdDetector {
    /// Flag when cpu_usage is strictly above this value
    pub cpu_threshold: f64,
    /// Flag when restart_count is strictly above this value
    pub restart_threshold: u32,
}

impl ThresholdDetector {
    pub fn new(cpu_threshold: f64, restart_threshold: u32) -> Self {
        Self {
            cpu_threshold,
            restart_threshold,
        }
    }

    /// Flag every breaching sample in the window
    pub fn detect(&self, window: &MetricWindow) -> Vec<ThresholdEvent> {
        window
            .iter()
            .filter(|s| s.cpu_usage > self.cpu_threshold || s.restart_count > self.restart_threshold)
            .map(|s| ThresholdEvent {
                workload_id: s.workload_id.clone(),
                reason: THRESHOLD_REASON.to_string(),
                timestamp: s.timestamp,
            })
            .collect()
    }
}

impl Default for ThresholdDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CPU_THRESHOLD, DEFAULT_RESTART_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricSample;
    use chrono::{Duration, Utc};

    fn sample(id: &str, cpu: f64, restarts: u32, offset: i64) -> MetricSample {
        MetricSample::new(id, cpu, 128.0, restarts, Utc::now() + Duration::seconds(offset))
    }

    #[test]
    fn test_cpu_breach() {
        let detector = ThresholdDetector::default();
        let window = MetricWindow::from_samples(vec![sample("api-1", 350.0, 1, 0)]);
        let events = detector.detect(&window);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].workload_id, "api-1");
        assert_eq!(events[0].reason, THRESHOLD_REASON);
    }

    #[test]
    fn test_restart_breach() {
        let detector = ThresholdDetector::default();
        let window = MetricWindow::from_samples(vec![sample("api-1", 10.0, 6, 0)]);
        assert_eq!(detector.detect(&window).len(), 1);
    }

    #[test]
    fn test_boundaries_are_strict() {
        let detector = ThresholdDetector::default();
        let window = MetricWindow::from_samples(vec![sample("api-1", 300.0, 5, 0)]);
        assert!(detector.detect(&window).is_empty());
    }

    #[test]
    fn test_one_event_per_breaching_sample() {
        let detector = ThresholdDetector::default();
        let window = MetricWindow::from_samples(vec![
            sample("api-1", 400.0, 0, 0),
            sample("api-1", 10.0, 0, 10),
            sample("api-1", 500.0, 0, 20),
            sample("db-0", 1.0, 9, 30),
        ]);
        let events = detector.detect(&window);
        let ids: Vec<_> = events.iter().map(|e| e.workload_id.as_str()).collect();
        assert_eq!(ids, vec!["api-1", "api-1", "db-0"]);
    }
}
