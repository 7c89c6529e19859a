//! Trigger configuration records consumed by the monitor

use serde::{Deserialize, Serialize};

/// What class of external signal a trigger listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    FileChange,
    Scheduled,
    Interval,
    SystemMetric,
    LogPattern,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileChange => write!(f, "file_change"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Interval => write!(f, "interval"),
            Self::SystemMetric => write!(f, "system_metric"),
            Self::LogPattern => write!(f, "log_pattern"),
        }
    }
}

/// A configured event source that synthesizes tasks when it fires.
///
/// Loaded from the agent config; which fields are meaningful depends on
/// `trigger_type` (path/pattern for file_change and log_pattern, schedule
/// for interval/scheduled, threshold for system_metric).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,

    #[serde(rename = "type")]
    pub trigger_type: TriggerType,

    /// Directory or file path watched (file_change, log_pattern)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Regex matched against the event file name (file_change) or log line
    /// (log_pattern)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Period spec like "30s", "5m", "1h", "500 ms"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    /// Numeric threshold (system_metric: memory-usage percent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,

    /// Task kind name the synthesized task gets (upper-cased and validated)
    pub action: String,

    /// Optional command copied into the task metadata for the shell strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}
