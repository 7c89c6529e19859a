//! JSON snapshot of non-terminal tasks and state-store counters

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{Task, TaskId};
use crate::state::StateSnapshot;

use super::QueueError;

/// Round-trippable queue state for restart recovery
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub tasks: Vec<Task>,

    /// Ids of tasks that had Completed when the snapshot was taken. Terminal
    /// tasks themselves are not persisted, but waiting tasks may still name
    /// them as dependencies; restore treats these ids as satisfied.
    #[serde(default)]
    pub completed: Vec<TaskId>,

    pub state: StateSnapshot,
}

impl QueueSnapshot {
    /// Write the snapshot as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), QueueError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| QueueError::Snapshot(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| QueueError::Snapshot(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| QueueError::Snapshot(e.to_string()))
    }

    /// Load a snapshot written by [`save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| QueueError::Snapshot(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| QueueError::Snapshot(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskKind, TaskStatus};
    use tempfile::tempdir;

    #[test]
    fn test_save_load_roundtrip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state/snapshot.json");

        let mut task = Task::new(TaskKind::ShellCommand, "echo").with_parameter("command", "echo x");
        task.mark_queued();
        let finished_dep = uuid::Uuid::new_v4();

        let snapshot = QueueSnapshot {
            tasks: vec![task.clone()],
            completed: vec![finished_dep],
            state: StateSnapshot {
                values: [("k".to_string(), serde_json::json!("v"))].into_iter().collect(),
                total_tasks_executed: 7,
            },
        };

        snapshot.save(&path).unwrap();
        let back = QueueSnapshot::load(&path).unwrap();

        assert_eq!(back.tasks.len(), 1);
        assert_eq!(back.tasks[0].id, task.id);
        assert_eq!(back.tasks[0].status, TaskStatus::Queued);
        assert_eq!(back.completed, vec![finished_dep]);
        assert_eq!(back.state.total_tasks_executed, 7);
    }

    #[test]
    fn test_load_tolerates_missing_completed_field() {
        // Snapshots written before the satisfied-dependency record existed
        let temp = tempdir().unwrap();
        let path = temp.path().join("snapshot.json");
        std::fs::write(
            &path,
            r#"{ "tasks": [], "state": { "values": {}, "total_tasks_executed": 0 } }"#,
        )
        .unwrap();

        let snapshot = QueueSnapshot::load(&path).unwrap();
        assert!(snapshot.completed.is_empty());
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(matches!(
            QueueSnapshot::load("/nonexistent/snapshot.json"),
            Err(QueueError::Snapshot(_))
        ));
    }
}
