//! Monitor configuration and period parsing

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Trigger;

/// Monitor tunables plus the configured trigger set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Configured triggers
    pub triggers: Vec<Trigger>,

    /// System-metric sampling cadence, in seconds
    #[serde(rename = "metric-sample-secs")]
    pub metric_sample_secs: u64,

    /// Log-pattern scan cadence, in seconds
    #[serde(rename = "log-scan-secs")]
    pub log_scan_secs: u64,

    /// Built-in health check: period / initial delay, in seconds
    #[serde(rename = "health-check-secs")]
    pub health_check_secs: u64,
    #[serde(rename = "health-check-delay-secs")]
    pub health_check_delay_secs: u64,

    /// Built-in resource monitor: period / initial delay, in seconds
    #[serde(rename = "resource-monitor-secs")]
    pub resource_monitor_secs: u64,
    #[serde(rename = "resource-monitor-delay-secs")]
    pub resource_monitor_delay_secs: u64,

    /// Resource monitor warns above this memory-usage percentage
    #[serde(rename = "memory-warn-pct")]
    pub memory_warn_pct: f64,

    /// Drain budget for monitor shutdown, in seconds
    #[serde(rename = "shutdown-timeout-secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            triggers: Vec::new(),
            metric_sample_secs: 5,
            log_scan_secs: 10,
            health_check_secs: 60,
            health_check_delay_secs: 30,
            resource_monitor_secs: 30,
            resource_monitor_delay_secs: 10,
            memory_warn_pct: 85.0,
            shutdown_timeout_secs: 3,
        }
    }
}

impl MonitorConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Parse a period spec: `"30s"`, `"5m"`, `"1h"`, `"500ms"` (with or without
/// a space), or a bare number of milliseconds.
pub fn parse_period(spec: &str) -> Result<Duration, String> {
    let spec = spec.trim().to_lowercase().replace(' ', "");
    if spec.is_empty() {
        return Err("empty period".to_string());
    }

    let (digits, unit) = match spec.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => spec.split_at(split),
        None => (spec.as_str(), "ms"),
    };

    let value: u64 = digits.parse().map_err(|_| format!("invalid period '{}'", spec))?;
    if value == 0 {
        return Err(format!("period '{}' must be positive", spec));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3_600)),
        other => Err(format!("unknown period unit '{}'", other)),
    }
}
