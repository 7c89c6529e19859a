//! The Task record - identity, parameters, lifecycle, and result

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{Priority, TaskKind, TaskResult, TaskStatus};

/// Opaque task identifier
pub type TaskId = Uuid;

/// Default wall-clock deadline: 30 minutes
pub const DEFAULT_TIMEOUT_MS: u64 = 30 * 60 * 1000;

/// Default retry budget
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Ambient execution context carried by a task.
///
/// Opaque to the scheduler; strategies read the working directory and
/// environment, the monitor and planner stamp provenance into `metadata`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environment: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<TaskId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_source: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

/// One unit of work.
///
/// Created by a submitter (CLI, monitor, planner, or a parent composite
/// task), owned by the queue while live, terminal at most once. Status
/// transitions go through the `mark_*` methods, which enforce the state
/// machine; an illegal transition is a scheduler invariant violation and
/// panics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub priority: Priority,
    pub status: TaskStatus,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Wall-clock deadline in milliseconds; 0 disables the deadline
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub retry_count: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Task ids that must be Completed before this task becomes runnable
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<TaskId>,

    /// Strategy-interpreted parameters, opaque to the scheduler
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, Value>,

    #[serde(default)]
    pub context: TaskContext,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,

    /// Append-only, timestamped human-readable history
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub execution_log: Vec<String>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Task {
    /// Create a new task with a fresh id and MEDIUM priority
    pub fn new(kind: TaskKind, name: impl Into<String>) -> Self {
        Self::with_priority(kind, name, Priority::Medium)
    }

    /// Create a new task with an explicit priority
    pub fn with_priority(kind: TaskKind, name: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: name.into(),
            description: String::new(),
            priority,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            dependencies: Vec::new(),
            parameters: HashMap::new(),
            context: TaskContext::default(),
            result: None,
            execution_log: Vec::new(),
        }
    }

    // === Builder methods ===

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_dependency(mut self, dep: TaskId) -> Self {
        self.dependencies.push(dep);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Disable the wall-clock deadline
    pub fn without_timeout(mut self) -> Self {
        self.timeout_ms = 0;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<String>) -> Self {
        self.context.working_directory = Some(dir.into());
        self
    }

    // === Parameter access ===

    /// Fetch a string parameter, trimmed; None when absent or empty
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str()).map(str::trim).filter(|s| !s.is_empty())
    }

    /// Fetch a boolean parameter, defaulting to false
    pub fn param_bool(&self, key: &str) -> bool {
        self.parameters.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// The per-task deadline, when one is set
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    // === State machine ===

    /// Transition into `Running`, stamping `started_at`
    pub fn mark_started(&mut self) {
        self.transition(TaskStatus::Running);
        self.started_at = Some(Utc::now());
        self.add_log_entry("execution started");
    }

    /// Terminal success: record the result, stamp `completed_at`
    pub fn mark_completed(&mut self, result: TaskResult) {
        self.transition(TaskStatus::Completed);
        self.completed_at = Some(Utc::now());
        self.result = Some(result);
        self.add_log_entry("completed");
    }

    /// Record a failure and bump the retry counter
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.transition(TaskStatus::Failed);
        self.completed_at = Some(Utc::now());
        self.retry_count = self.retry_count.saturating_add(1);
        self.add_log_entry(format!("failed (attempt {}): {}", self.retry_count, error));
        self.result = Some(TaskResult::failure(error));
    }

    /// Terminal cancellation
    pub fn mark_cancelled(&mut self) {
        self.transition(TaskStatus::Cancelled);
        self.completed_at = Some(Utc::now());
        self.add_log_entry("cancelled");
    }

    /// Terminal deadline expiry; never retried
    pub fn mark_timed_out(&mut self) {
        self.transition(TaskStatus::TimedOut);
        self.completed_at = Some(Utc::now());
        self.add_log_entry(format!("timed out after {}ms", self.timeout_ms));
        self.result = Some(TaskResult::failure(format!("timed out after {}ms", self.timeout_ms)));
    }

    /// Re-queue after a retriable failure or dependency promotion
    pub fn mark_queued(&mut self) {
        self.transition(TaskStatus::Queued);
    }

    /// Park until dependencies complete
    pub fn mark_waiting(&mut self) {
        self.transition(TaskStatus::WaitingForDependencies);
    }

    fn transition(&mut self, next: TaskStatus) {
        // Invariant violation here is a programmer error, never retried.
        assert!(
            self.status.can_transition_to(next),
            "illegal task transition {} -> {} (task {})",
            self.status,
            next,
            self.id
        );
        self.status = next;
    }

    // === Predicates ===

    /// Terminal means no further transitions: Completed, Cancelled, TimedOut,
    /// or Failed with the retry budget exhausted.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal() || (self.status == TaskStatus::Failed && !self.should_retry())
    }

    pub fn can_execute(&self) -> bool {
        self.status.can_execute()
    }

    pub fn should_retry(&self) -> bool {
        self.status == TaskStatus::Failed && self.retry_count < self.max_retries
    }

    /// Burn the remaining retry budget; used for failures that retrying
    /// cannot fix (validation errors, blocked commands).
    pub fn exhaust_retries(&mut self) {
        self.retry_count = self.max_retries.max(self.retry_count);
    }

    /// Append a `[timestamp] message` line to the execution log
    pub fn add_log_entry(&mut self, message: impl AsRef<str>) {
        self.execution_log
            .push(format!("[{}] {}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"), message.as_ref()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_defaults() {
        let task = Task::new(TaskKind::ShellCommand, "echo");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(task.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(task.retry_count, 0);
        assert!(task.result.is_none());
        assert!(task.started_at.is_none());
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let mut task = Task::new(TaskKind::ShellCommand, "echo");
        task.mark_queued();
        task.mark_started();
        assert!(task.started_at.is_some());

        task.mark_completed(TaskResult::success("hello"));
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.is_terminal());
        assert!(task.completed_at.unwrap() >= task.started_at.unwrap());
        assert!(task.started_at.unwrap() >= task.created_at);
    }

    #[test]
    fn test_mark_failed_increments_retry_count() {
        let mut task = Task::new(TaskKind::ShellCommand, "echo");
        task.mark_queued();
        task.mark_started();
        task.mark_failed("boom");

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 1);
        assert!(task.should_retry());
        assert!(!task.is_terminal());
    }

    #[test]
    fn test_failed_terminal_when_retries_exhausted() {
        let mut task = Task::new(TaskKind::ShellCommand, "echo").with_max_retries(1);
        task.mark_queued();
        task.mark_started();
        task.mark_failed("boom");

        assert!(!task.should_retry());
        assert!(task.is_terminal());
    }

    #[test]
    fn test_zero_max_retries_single_attempt() {
        let mut task = Task::new(TaskKind::ShellCommand, "echo").with_max_retries(0);
        task.mark_queued();
        task.mark_started();
        task.mark_failed("boom");

        assert_eq!(task.retry_count, 1);
        assert!(!task.should_retry());
        assert!(task.is_terminal());
    }

    #[test]
    #[should_panic(expected = "illegal task transition")]
    fn test_terminal_never_transitions() {
        let mut task = Task::new(TaskKind::ShellCommand, "echo");
        task.mark_queued();
        task.mark_started();
        task.mark_completed(TaskResult::success("ok"));
        task.mark_started();
    }

    #[test]
    #[should_panic(expected = "illegal task transition")]
    fn test_cannot_run_from_pending() {
        let mut task = Task::new(TaskKind::ShellCommand, "echo");
        task.mark_completed(TaskResult::success("ok"));
    }

    #[test]
    #[should_panic(expected = "illegal task transition")]
    fn test_mark_started_panics_on_pending() {
        // Running is only reachable through Queued
        let mut task = Task::new(TaskKind::ShellCommand, "echo");
        task.mark_started();
    }

    #[test]
    fn test_retry_requeue_path() {
        let mut task = Task::new(TaskKind::ShellCommand, "echo");
        task.mark_queued();
        task.mark_started();
        task.mark_failed("first");
        task.mark_queued();
        task.mark_started();
        task.mark_completed(TaskResult::success("ok"));

        assert_eq!(task.retry_count, 1);
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_timeout_accessor() {
        let task = Task::new(TaskKind::ShellCommand, "echo");
        assert_eq!(task.timeout(), Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)));

        let task = task.without_timeout();
        assert_eq!(task.timeout(), None);
    }

    #[test]
    fn test_param_str_rejects_empty() {
        let task = Task::new(TaskKind::ShellCommand, "echo")
            .with_parameter("command", "echo hi")
            .with_parameter("empty", "   ");

        assert_eq!(task.param_str("command"), Some("echo hi"));
        assert_eq!(task.param_str("empty"), None);
        assert_eq!(task.param_str("missing"), None);
    }

    #[test]
    fn test_add_log_entry_format() {
        let mut task = Task::new(TaskKind::ShellCommand, "echo");
        task.add_log_entry("hello");
        assert_eq!(task.execution_log.len(), 1);
        assert!(task.execution_log[0].starts_with('['));
        assert!(task.execution_log[0].ends_with("hello"));
    }

    #[test]
    fn test_task_serde_roundtrip() {
        let task = Task::with_priority(TaskKind::FileWrite, "write", Priority::High)
            .with_parameter("file_path", "out.txt")
            .with_dependency(Uuid::new_v4());

        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, task.id);
        assert_eq!(back.kind, TaskKind::FileWrite);
        assert_eq!(back.priority, Priority::High);
        assert_eq!(back.dependencies, task.dependencies);
    }
}
