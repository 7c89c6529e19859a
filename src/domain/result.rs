//! Task execution results

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one task execution, recorded on the task once it is terminal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResult {
    /// Whether the strategy considers the task succeeded
    pub success: bool,

    /// Primary output (stdout, file contents, LM text, ...)
    #[serde(default)]
    pub output: String,

    /// Error message when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Process exit code, when a process was involved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Wall-clock execution time in milliseconds
    #[serde(default)]
    pub execution_time_ms: u64,

    /// Paths created by the execution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_created: Vec<String>,

    /// Paths modified by the execution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_modified: Vec<String>,

    /// Commands run by the execution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands_executed: Vec<String>,

    /// Strategy-specific structured artifacts
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub artifacts: HashMap<String, Value>,

    /// Numeric metrics sampled during execution
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metrics: HashMap<String, f64>,
}

impl TaskResult {
    /// Successful result with the given output
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            ..Default::default()
        }
    }

    /// Failed result with the given error message
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Builder: set the exit code
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Builder: record a created file
    pub fn with_file_created(mut self, path: impl Into<String>) -> Self {
        self.files_created.push(path.into());
        self
    }

    /// Builder: record a modified file
    pub fn with_file_modified(mut self, path: impl Into<String>) -> Self {
        self.files_modified.push(path.into());
        self
    }

    /// Builder: record an executed command
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.commands_executed.push(command.into());
        self
    }

    /// Builder: attach a structured artifact
    pub fn with_artifact(mut self, key: impl Into<String>, value: Value) -> Self {
        self.artifacts.insert(key.into(), value);
        self
    }

    /// Builder: attach a numeric metric
    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_result() {
        let result = TaskResult::success("hello").with_exit_code(0);
        assert!(result.success);
        assert_eq!(result.output, "hello");
        assert_eq!(result.exit_code, Some(0));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_failure_result() {
        let result = TaskResult::failure("boom");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_builders_accumulate() {
        let result = TaskResult::success("ok")
            .with_file_created("a.txt")
            .with_file_created("b.txt")
            .with_command("echo hi")
            .with_artifact("pid", serde_json::json!(42))
            .with_metric("memory_pct", 12.5);

        assert_eq!(result.files_created, vec!["a.txt", "b.txt"]);
        assert_eq!(result.commands_executed, vec!["echo hi"]);
        assert_eq!(result.artifacts.get("pid"), Some(&serde_json::json!(42)));
        assert_eq!(result.metrics.get("memory_pct"), Some(&12.5));
    }

    #[test]
    fn test_result_serde_roundtrip() {
        let result = TaskResult::success("out").with_exit_code(0).with_file_created("x");
        let json = serde_json::to_string(&result).unwrap();
        let back: TaskResult = serde_json::from_str(&json).unwrap();
        assert!(back.success);
        assert_eq!(back.files_created, vec!["x"]);
    }
}
