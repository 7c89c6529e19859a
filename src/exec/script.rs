//! Script execution through a scoped temp file
//!
//! The script body is written to a temp file whose lifetime is owned by a
//! [`tempfile::TempDir`], so the file is removed on every exit path,
//! including panics unwinding through the strategy.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::{Task, TaskKind, TaskResult};

use super::{ExecContext, ExecError, Strategy};

/// Interpreter invocation for a script type
fn interpreter_for(script_type: &str) -> Result<(&'static str, &'static str), ExecError> {
    match script_type.to_lowercase().as_str() {
        "bash" | "sh" => Ok(("bash", "sh")),
        "powershell" | "ps1" => Ok(("pwsh", "ps1")),
        "python" | "py" => Ok(("python3", "py")),
        "lua" => Ok(("lua", "lua")),
        other => Err(ExecError::InvalidParameter(format!("unsupported script_type '{}'", other))),
    }
}

/// Write script content to a scoped temp file and run the matching interpreter
pub struct ScriptExecutionStrategy;

#[async_trait]
impl Strategy for ScriptExecutionStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let content = task
            .parameters
            .get("script_content")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ExecError::missing(TaskKind::ScriptExecution, "script_content"))?;
        let script_type = task.param_str("script_type").unwrap_or("bash");

        let (interpreter, extension) = interpreter_for(script_type)?;

        // The TempDir guard deletes the script on drop, on all exit paths
        let scratch = tempfile::tempdir()?;
        let script_path = scratch.path().join(format!("script.{}", extension));
        tokio::fs::write(&script_path, content).await?;

        println!(
            "agent executing {} script (in: {}): {}",
            script_type,
            ctx.working_dir.display(),
            script_path.display()
        );

        let mut child = Command::new(interpreter)
            .arg(&script_path)
            .current_dir(&ctx.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::Process(format!("failed to start {}: {}", interpreter, e)))?;

        let output = tokio::select! {
            output = child.wait_with_output() => {
                output.map_err(|e| ExecError::Process(format!("failed to collect output: {}", e)))?
            }
            _ = ctx.cancel.cancelled() => return Err(ExecError::Cancelled),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            return Err(ExecError::Process(format!(
                "{} script exited with status {}: {}",
                script_type,
                exit_code,
                stderr.trim()
            )));
        }

        Ok(TaskResult::success(stdout)
            .with_exit_code(exit_code)
            .with_command(format!("{} <script.{}>", interpreter, extension)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_bash_script_runs() {
        let temp = tempdir().unwrap();
        let ctx = ExecContext::new(temp.path());
        let task = Task::new(TaskKind::ScriptExecution, "script")
            .with_parameter("script_type", "bash")
            .with_parameter("script_content", "echo one\necho two");

        let result = ScriptExecutionStrategy.execute(&task, &ctx).await.unwrap();
        assert!(result.success);
        assert!(result.output.contains("one"));
        assert!(result.output.contains("two"));
    }

    #[tokio::test]
    async fn test_script_failure_is_process_error() {
        let temp = tempdir().unwrap();
        let ctx = ExecContext::new(temp.path());
        let task = Task::new(TaskKind::ScriptExecution, "script")
            .with_parameter("script_type", "sh")
            .with_parameter("script_content", "exit 7");

        let err = ScriptExecutionStrategy.execute(&task, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::Process(_)));
    }

    #[tokio::test]
    async fn test_missing_content_is_validation_error() {
        let temp = tempdir().unwrap();
        let ctx = ExecContext::new(temp.path());
        let task = Task::new(TaskKind::ScriptExecution, "script").with_parameter("script_type", "bash");

        let err = ScriptExecutionStrategy.execute(&task, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::MissingParameter { name: "script_content", .. }));
    }

    #[tokio::test]
    async fn test_unknown_script_type_rejected() {
        let temp = tempdir().unwrap();
        let ctx = ExecContext::new(temp.path());
        let task = Task::new(TaskKind::ScriptExecution, "script")
            .with_parameter("script_type", "perl")
            .with_parameter("script_content", "print 1;");

        let err = ScriptExecutionStrategy.execute(&task, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_script_runs_in_working_directory() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("marker.txt"), "found").unwrap();

        let ctx = ExecContext::new(temp.path());
        let task = Task::new(TaskKind::ScriptExecution, "script")
            .with_parameter("script_type", "bash")
            .with_parameter("script_content", "cat marker.txt");

        let result = ScriptExecutionStrategy.execute(&task, &ctx).await.unwrap();
        assert!(result.output.contains("found"));
    }
}
