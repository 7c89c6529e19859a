//! Task lifecycle status and the legal transitions between states

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
///
/// The legal path is
/// `Pending -> Queued -> Running -> (Completed | Failed | Cancelled | TimedOut)`,
/// with `WaitingForDependencies` before `Queued` and `Paused` as an
/// operator-driven detour. A `Failed` task with retries left is re-queued by
/// the dispatcher (`Failed -> Queued`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    WaitingForDependencies,
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl TaskStatus {
    /// Whether this status permits no further transitions.
    ///
    /// `Failed` is terminal only once retries are exhausted, which the task
    /// itself decides; at the status level it is treated as re-enterable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::TimedOut)
    }

    /// Whether a task in this status may be handed to a worker
    pub fn can_execute(&self) -> bool {
        matches!(self, Self::Pending | Self::Queued)
    }

    /// Whether the transition `self -> next` is legal
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            // Terminal states never transition again
            (Completed | Cancelled | TimedOut, _) => false,
            // Running is only reachable through Queued
            (Pending, WaitingForDependencies | Queued | Cancelled) => true,
            (WaitingForDependencies, Queued | Cancelled) => true,
            (Queued, Running | Paused | Cancelled) => true,
            (Running, Completed | Failed | Cancelled | TimedOut) => true,
            (Paused, Queued | Cancelled) => true,
            // Retry path
            (Failed, Queued | Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::WaitingForDependencies => write!(f, "waiting_for_dependencies"),
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::TimedOut => write!(f, "timeout"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "waiting_for_dependencies" | "waiting" => Ok(Self::WaitingForDependencies),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "timeout" | "timed_out" => Ok(Self::TimedOut),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(TaskStatus::TimedOut.is_terminal());
        assert!(!TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_can_execute() {
        assert!(TaskStatus::Pending.can_execute());
        assert!(TaskStatus::Queued.can_execute());
        assert!(!TaskStatus::Running.can_execute());
        assert!(!TaskStatus::WaitingForDependencies.can_execute());
    }

    #[test]
    fn test_legal_path() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Queued));
        assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::TimedOut));
        assert!(TaskStatus::Failed.can_transition_to(TaskStatus::Queued));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Cancelled.can_transition_to(TaskStatus::Queued));
        assert!(!TaskStatus::TimedOut.can_transition_to(TaskStatus::Queued));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Queued.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("queued".parse::<TaskStatus>().unwrap(), TaskStatus::Queued);
        assert_eq!("timeout".parse::<TaskStatus>().unwrap(), TaskStatus::TimedOut);
        assert_eq!("canceled".parse::<TaskStatus>().unwrap(), TaskStatus::Cancelled);
        assert!("unknown".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&TaskStatus::WaitingForDependencies).unwrap();
        assert_eq!(json, "\"waiting_for_dependencies\"");
    }
}
