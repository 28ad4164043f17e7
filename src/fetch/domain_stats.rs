//! Per-domain latency tracking for adaptive fetch timeouts.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::AdaptiveTimeoutConfig;

/// Rolling record for one domain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainStats {
    pub samples: u64,
    /// Exponentially weighted moving average of attempt latency, in milliseconds.
    pub ewma_ms: f64,
    pub failures: u64,
    recent_ms: VecDeque<f64>,
}

impl DomainStats {
    fn record(&mut self, elapsed: Duration, success: bool, config: &AdaptiveTimeoutConfig) {
        let ms = elapsed.as_micros() as f64 / 1000.0;
        self.ewma_ms = if self.samples == 0 {
            ms
        } else {
            config.ewma_alpha * ms + (1.0 - config.ewma_alpha) * self.ewma_ms
        };
        self.samples += 1;
        if !success {
            self.failures += 1;
        }
        self.recent_ms.push_back(ms);
        while self.recent_ms.len() > config.window.max(1) {
            self.recent_ms.pop_front();
        }
    }

    /// Nearest-rank 90th percentile of the recent window.
    pub fn p90_ms(&self) -> f64 {
        if self.recent_ms.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.recent_ms.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let rank = ((0.9 * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
        sorted[rank - 1]
    }

    /// Effective timeout derived from this record.
    ///
    /// `max(baseline, headroom × max(p90, ewma)) + failure_step × baseline × min(failures, cap)`,
    /// clamped to the ceiling. A domain without samples gets the baseline.
    pub fn timeout(&self, config: &AdaptiveTimeoutConfig) -> Duration {
        if self.samples == 0 {
            return config.baseline.min(config.ceiling);
        }
        let baseline = config.baseline.as_secs_f64();
        let observed = self.p90_ms().max(self.ewma_ms) / 1000.0;
        let penalty_steps = self.failures.min(config.max_failure_steps) as f64;
        let secs = (config.headroom * observed).max(baseline)
            + config.failure_step * baseline * penalty_steps;
        Duration::from_secs_f64(secs).min(config.ceiling)
    }
}

/// Shared per-run tracker, keyed by host.
///
/// Created empty for every run and handed to the fetcher at construction. Concurrent
/// workers fetching the same domain update it under one lock per call.
#[derive(Debug)]
pub struct DomainStatsTracker {
    config: AdaptiveTimeoutConfig,
    domains: Mutex<HashMap<String, DomainStats>>,
}

impl DomainStatsTracker {
    pub fn new(config: AdaptiveTimeoutConfig) -> Self {
        Self {
            config,
            domains: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AdaptiveTimeoutConfig {
        &self.config
    }

    /// Timeout for the next attempt against `domain`.
    pub async fn timeout_for(&self, domain: &str) -> Duration {
        let domains = self.domains.lock().await;
        match domains.get(domain) {
            Some(stats) => stats.timeout(&self.config),
            None => self.config.baseline.min(self.config.ceiling),
        }
    }

    /// Records one completed attempt, successful or not.
    pub async fn record(&self, domain: &str, elapsed: Duration, success: bool) {
        let mut domains = self.domains.lock().await;
        domains
            .entry(domain.to_string())
            .or_default()
            .record(elapsed, success, &self.config);
    }

    pub async fn snapshot(&self, domain: &str) -> Option<DomainStats> {
        self.domains.lock().await.get(domain).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AdaptiveTimeoutConfig {
        AdaptiveTimeoutConfig {
            baseline: Duration::from_secs(10),
            ceiling: Duration::from_secs(30),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_unknown_domain_gets_baseline() {
        let tracker = DomainStatsTracker::new(config());
        assert_eq!(tracker.timeout_for("example.com").await, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_fast_domain_keeps_baseline() {
        let tracker = DomainStatsTracker::new(config());
        for _ in 0..5 {
            tracker.record("fast.test", Duration::from_millis(200), true).await;
        }
        assert_eq!(tracker.timeout_for("fast.test").await, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_slow_domain_gets_more_time_without_affecting_others() {
        let tracker = DomainStatsTracker::new(config());
        for _ in 0..5 {
            tracker.record("slow.test", Duration::from_secs(12), true).await;
        }
        let slow = tracker.timeout_for("slow.test").await;
        assert_eq!(slow, Duration::from_secs(18));
        assert_eq!(tracker.timeout_for("other.test").await, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_failures_add_penalty_and_ceiling_holds() {
        let tracker = DomainStatsTracker::new(config());
        tracker.record("flaky.test", Duration::from_secs(1), false).await;
        // baseline 10s + 0.25 × 10s × 1 failure
        assert_eq!(tracker.timeout_for("flaky.test").await, Duration::from_millis(12_500));

        for _ in 0..10 {
            tracker.record("flaky.test", Duration::from_secs(25), false).await;
        }
        assert_eq!(tracker.timeout_for("flaky.test").await, Duration::from_secs(30));
        let stats = tracker.snapshot("flaky.test").await.unwrap();
        assert_eq!(stats.samples, 11);
        assert_eq!(stats.failures, 11);
    }

    #[test]
    fn test_p90_nearest_rank() {
        let cfg = config();
        let mut stats = DomainStats::default();
        for ms in 1..=10 {
            stats.record(Duration::from_millis(ms * 100), true, &cfg);
        }
        assert_eq!(stats.p90_ms(), 900.0);
    }

    #[test]
    fn test_window_is_bounded() {
        let cfg = AdaptiveTimeoutConfig {
            window: 3,
            ..config()
        };
        let mut stats = DomainStats::default();
        for ms in [5000, 100, 100, 100] {
            stats.record(Duration::from_millis(ms), true, &cfg);
        }
        assert_eq!(stats.p90_ms(), 100.0);
        assert_eq!(stats.samples, 4);
    }
}
