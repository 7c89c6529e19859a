//! Plan and subtask records

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Priority;

use super::PlanError;

/// Outcome of one subtask within a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

/// One decomposed unit of the goal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    /// 1-based ordinal from the decomposition (SUBTASK_N)
    pub ordinal: usize,
    pub description: String,
    pub expected_outcome: String,
    pub priority: Priority,
    pub complexity: String,
    /// Ordinals of subtasks that must succeed first
    pub dependencies: Vec<usize>,
    pub file_path: Option<String>,
    pub file_content: Option<String>,
    pub commands: Vec<String>,
    pub status: SubtaskStatus,
}

impl Subtask {
    pub fn new(ordinal: usize) -> Self {
        Self {
            ordinal,
            description: String::new(),
            expected_outcome: String::new(),
            priority: Priority::Medium,
            complexity: String::new(),
            dependencies: Vec::new(),
            file_path: None,
            file_content: None,
            commands: Vec::new(),
            status: SubtaskStatus::Pending,
        }
    }
}

/// A decomposed goal with its execution strategy and working memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub goal: String,
    pub subtasks: Vec<Subtask>,
    /// Free-text execution order / risks / mitigation from the strategy phase
    pub strategy: String,
    /// Shared working memory accumulated across ReAct cycles
    pub memory: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(goal: impl Into<String>, subtasks: Vec<Subtask>) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal: goal.into(),
            subtasks,
            strategy: String::new(),
            memory: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    fn position(&self, ordinal: usize) -> Option<usize> {
        self.subtasks.iter().position(|s| s.ordinal == ordinal)
    }

    /// Dependency-resolved execution order (Kahn's algorithm over ordinals).
    /// Ties resolve in ordinal order so execution is deterministic.
    pub fn execution_order(&self) -> Result<Vec<usize>, PlanError> {
        let mut remaining: Vec<&Subtask> = self.subtasks.iter().collect();
        remaining.sort_by_key(|s| s.ordinal);

        for subtask in &self.subtasks {
            for dep in &subtask.dependencies {
                if self.position(*dep).is_none() {
                    return Err(PlanError::UnknownDependency {
                        subtask: subtask.ordinal,
                        dependency: *dep,
                    });
                }
            }
        }

        let mut order = Vec::with_capacity(self.subtasks.len());
        let mut placed: std::collections::HashSet<usize> = std::collections::HashSet::new();

        while order.len() < self.subtasks.len() {
            let next = remaining
                .iter()
                .find(|s| !placed.contains(&s.ordinal) && s.dependencies.iter().all(|d| placed.contains(d)))
                .map(|s| s.ordinal);

            match next {
                Some(ordinal) => {
                    placed.insert(ordinal);
                    order.push(ordinal);
                }
                None => return Err(PlanError::CyclicDependencies),
            }
        }

        Ok(order)
    }

    pub fn subtask(&self, ordinal: usize) -> Option<&Subtask> {
        self.position(ordinal).map(|i| &self.subtasks[i])
    }

    pub fn subtask_mut(&mut self, ordinal: usize) -> Option<&mut Subtask> {
        self.position(ordinal).map(move |i| &mut self.subtasks[i])
    }

    /// Merge key/value pairs into working memory
    pub fn merge_memory(&mut self, updates: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in updates {
            self.memory.insert(key, value);
        }
    }

    /// Working memory rendered for prompt interpolation
    pub fn memory_digest(&self) -> String {
        if self.memory.is_empty() {
            return "(empty)".to_string();
        }
        let mut entries: Vec<(&String, &String)> = self.memory.iter().collect();
        entries.sort();
        entries
            .into_iter()
            .map(|(k, v)| format!("- {}: {}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Outcome of executing a whole plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    /// SUCCESS iff every subtask succeeded
    pub success: bool,
    pub succeeded: usize,
    pub failed: usize,
    /// Observation strings collected across cycles, in order
    pub observations: Vec<String>,
}
