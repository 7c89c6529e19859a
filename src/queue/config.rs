//! Queue configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the queue and its background jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Bounded worker pool size
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Worker wake-up tick while idle, in milliseconds
    #[serde(rename = "worker-tick-ms")]
    pub worker_tick_ms: u64,

    /// Belt-and-braces dependency promotion cadence, in seconds
    #[serde(rename = "dependency-check-secs")]
    pub dependency_check_secs: u64,

    /// Terminal-task sweep cadence, in seconds
    #[serde(rename = "cleanup-interval-secs")]
    pub cleanup_interval_secs: u64,

    /// How long terminal tasks stay inspectable, in minutes
    #[serde(rename = "retention-minutes")]
    pub retention_minutes: i64,

    /// Worker drain budget on stop, in seconds
    #[serde(rename = "shutdown-timeout-secs")]
    pub shutdown_timeout_secs: u64,

    /// Linear retry backoff step, in seconds (attempt N waits N * step)
    #[serde(rename = "retry-step-secs")]
    pub retry_step_secs: u64,

    /// Retry backoff ceiling, in seconds
    #[serde(rename = "retry-cap-secs")]
    pub retry_cap_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            worker_tick_ms: 1_000,
            dependency_check_secs: 5,
            cleanup_interval_secs: 3_600,
            retention_minutes: 30,
            shutdown_timeout_secs: 5,
            retry_step_secs: 10,
            retry_cap_secs: 60,
        }
    }
}

impl QueueConfig {
    pub fn worker_tick(&self) -> Duration {
        Duration::from_millis(self.worker_tick_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Backoff before retry attempt `retry_count`: `min(cap, count * step)`,
    /// with +/-10% jitter to avoid thundering re-enqueues.
    pub fn retry_backoff(&self, retry_count: u32) -> Duration {
        let base_secs = (retry_count as u64 * self.retry_step_secs).min(self.retry_cap_secs);
        let base_ms = base_secs * 1_000;
        let jitter = (base_ms / 10).max(1);
        let offset = rand::random_range(0..=jitter * 2) as i64 - jitter as i64;
        Duration::from_millis(base_ms.saturating_add_signed(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.retention_minutes, 30);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_backoff_linear_with_cap() {
        let config = QueueConfig::default();

        for _ in 0..20 {
            // attempt 2 -> ~20s, within 10% jitter
            let backoff = config.retry_backoff(2).as_millis() as i64;
            assert!((backoff - 20_000).abs() <= 2_000, "backoff {} out of range", backoff);

            // attempt 10 -> capped at ~60s
            let capped = config.retry_backoff(10).as_millis() as i64;
            assert!((capped - 60_000).abs() <= 6_000, "capped backoff {} out of range", capped);
        }
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: QueueConfig = serde_yaml::from_str("max-concurrent: 8").unwrap();
        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.worker_tick_ms, 1_000);
    }
}
