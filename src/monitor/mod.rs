//! Continuous monitor
//!
//! Long-lived triggers that synthesize tasks and inject them into the queue:
//! filesystem watchers, interval and scheduled jobs, system-metric
//! thresholds, and log-pattern scans, plus two built-in periodic jobs
//! (health check, resource monitor).

mod config;
mod core;

pub use config::{MonitorConfig, parse_period};
pub use core::Monitor;

use thiserror::Error;

/// Errors surfaced by the monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Invalid trigger '{name}': {reason}")]
    InvalidTrigger { name: String, reason: String },

    #[error("Watch registration failed: {0}")]
    Watch(String),

    #[error("Monitor already running")]
    AlreadyRunning,
}
