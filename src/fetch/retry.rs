//! Retry policy value object.

use std::time::Duration;

use tokio_retry::strategy::ExponentialBackoff;

use crate::config::{Config, RETRY_MAX_DELAY};

/// `max_retries`, `backoff_factor`, and an optional jitter bound.
///
/// The delay before retry `i` (0-based) is `backoff_factor × 2^i` seconds plus a
/// uniform random jitter in `[0, jitter)` seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            backoff_factor,
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total attempts including the first one.
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delays between attempts; exactly `max_retries` items.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        // from_millis(2) with factor f yields f·2, f·4, f·8 … ms,
        // so f = backoff_factor × 500 gives backoff_factor × 2^i seconds.
        let factor_ms = (self.backoff_factor.max(0.0) * 500.0).round() as u64;
        let jitter = self.jitter;
        ExponentialBackoff::from_millis(2)
            .factor(factor_ms)
            .max_delay(RETRY_MAX_DELAY)
            .take(self.max_retries as usize)
            .map(move |delay| {
                if jitter > 0.0 {
                    delay + Duration::from_secs_f64(rand::random::<f64>() * jitter)
                } else {
                    delay
                }
            })
    }
}

impl From<&Config> for RetryPolicy {
    fn from(config: &Config) -> Self {
        RetryPolicy::new(config.max_retries, config.backoff_factor).with_jitter(config.retry_jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_follow_backoff_formula() {
        let delays: Vec<Duration> = RetryPolicy::new(3, 1.0).delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[test]
    fn test_fractional_factor() {
        let delays: Vec<Duration> = RetryPolicy::new(2, 0.5).delays().collect();
        assert_eq!(
            delays,
            vec![Duration::from_millis(500), Duration::from_secs(1)]
        );
    }

    #[test]
    fn test_delay_count_equals_max_retries() {
        assert_eq!(RetryPolicy::new(0, 1.0).delays().count(), 0);
        assert_eq!(RetryPolicy::new(5, 1.0).delays().count(), 5);
        assert_eq!(RetryPolicy::new(2, 1.0).attempts(), 3);
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = RetryPolicy::new(4, 0.1).with_jitter(0.25);
        let base: Vec<Duration> = RetryPolicy::new(4, 0.1).delays().collect();
        for (delay, floor) in policy.delays().zip(base) {
            assert!(delay >= floor);
            assert!(delay < floor + Duration::from_millis(250));
        }
    }

    #[test]
    fn test_delays_capped() {
        let last = RetryPolicy::new(10, 1.0).delays().last().unwrap();
        assert!(last <= RETRY_MAX_DELAY);
    }
}
