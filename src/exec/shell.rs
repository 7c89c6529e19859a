//! Shell command execution

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::domain::{Task, TaskKind, TaskResult};

use super::denylist::command_blocked_reason;
use super::{ExecContext, ExecError, Strategy};

/// The OS-appropriate shell and its invocation flag
pub fn shell_invocation() -> (&'static str, &'static str) {
    if cfg!(target_os = "windows") {
        ("cmd", "/c")
    } else if cfg!(target_os = "macos") {
        ("/bin/zsh", "-c")
    } else {
        ("/bin/bash", "-c")
    }
}

/// Run a command line through the OS shell, honoring the cancel token.
/// The denylist is checked before anything is spawned.
pub(super) async fn run_shell(command: &str, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
    if let Some(reason) = command_blocked_reason(command) {
        return Err(ExecError::CommandBlocked(format!("{} ({})", command, reason)));
    }

    println!("agent executing command (in: {}): {}", ctx.working_dir.display(), command);

    let (shell, flag) = shell_invocation();
    let mut child = Command::new(shell)
        .arg(flag)
        .arg(command)
        .current_dir(&ctx.working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ExecError::Process(format!("failed to spawn shell: {}", e)))?;

    let output = tokio::select! {
        output = child.wait_with_output() => {
            output.map_err(|e| ExecError::Process(format!("failed to collect output: {}", e)))?
        }
        _ = ctx.cancel.cancelled() => {
            debug!(%command, "shell command cancelled");
            return Err(ExecError::Cancelled);
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    let mut result = if output.status.success() {
        TaskResult::success(stdout)
    } else {
        let mut failure = TaskResult::failure(if stderr.trim().is_empty() {
            format!("command exited with status {}", exit_code)
        } else {
            stderr.trim().to_string()
        });
        failure.output = stdout;
        failure
    };

    if !stderr.trim().is_empty() {
        result.artifacts.insert("stderr".to_string(), stderr.trim().into());
    }

    Ok(result.with_exit_code(exit_code).with_command(command))
}

/// Resolve the command line for a task: explicit parameter first, then the
/// monitor-supplied metadata entry.
pub(super) fn command_for(task: &Task) -> Option<String> {
    task.param_str("command")
        .map(str::to_string)
        .or_else(|| {
            task.context
                .metadata
                .get("command")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
}

/// Execute one shell command and capture its output
pub struct ShellCommandStrategy;

#[async_trait]
impl Strategy for ShellCommandStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let command = command_for(task).ok_or_else(|| ExecError::missing(TaskKind::ShellCommand, "command"))?;
        let result = run_shell(&command, ctx).await?;

        if !result.success {
            // Non-zero exit surfaces as an execution failure so the queue can retry
            return Err(ExecError::Process(
                result.error.clone().unwrap_or_else(|| "command failed".to_string()),
            ));
        }
        Ok(result)
    }
}

/// SYSTEM tasks: run an attached command when one is supplied, otherwise
/// report a brief runtime summary (the health-check investigation path).
pub struct SystemTaskStrategy;

#[async_trait]
impl Strategy for SystemTaskStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        if let Some(command) = command_for(task) {
            return run_shell(&command, ctx).await;
        }

        println!("agent running system task: {}", task.name);

        let mut system = sysinfo::System::new();
        system.refresh_memory();
        let total = system.total_memory();
        let used = system.used_memory();
        let pct = if total > 0 { (used as f64 / total as f64) * 100.0 } else { 0.0 };

        Ok(TaskResult::success(format!(
            "system check '{}': memory {:.1}% used ({} / {} bytes)",
            task.name, pct, used, total
        ))
        .with_metric("memory_used_pct", pct))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_echo_succeeds_with_output() {
        let temp = tempdir().unwrap();
        let ctx = ExecContext::new(temp.path());
        let task = Task::new(TaskKind::ShellCommand, "echo").with_parameter("command", "echo hello");

        let result = ShellCommandStrategy.execute(&task, &ctx).await.unwrap();
        assert!(result.success);
        assert!(result.output.contains("hello"));
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.commands_executed, vec!["echo hello"]);
    }

    #[tokio::test]
    async fn test_blocked_command_fails_fast() {
        let temp = tempdir().unwrap();
        let ctx = ExecContext::new(temp.path());
        let task = Task::new(TaskKind::ShellCommand, "destroy").with_parameter("command", "rm -rf /");

        let err = ShellCommandStrategy.execute(&task, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::CommandBlocked(_)));
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_missing_command_is_validation_error() {
        let temp = tempdir().unwrap();
        let ctx = ExecContext::new(temp.path());
        let task = Task::new(TaskKind::ShellCommand, "empty");

        let err = ShellCommandStrategy.execute(&task, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::MissingParameter { name: "command", .. }));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_process_error() {
        let temp = tempdir().unwrap();
        let ctx = ExecContext::new(temp.path());
        let task = Task::new(TaskKind::ShellCommand, "fail").with_parameter("command", "exit 3");

        let err = ShellCommandStrategy.execute(&task, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::Process(_)));
        assert!(!err.is_validation());
    }

    #[tokio::test]
    async fn test_command_from_metadata() {
        let temp = tempdir().unwrap();
        let ctx = ExecContext::new(temp.path());
        let mut task = Task::new(TaskKind::ShellCommand, "triggered");
        task.context.metadata.insert("command".to_string(), "echo from-trigger".into());

        let result = ShellCommandStrategy.execute(&task, &ctx).await.unwrap();
        assert!(result.output.contains("from-trigger"));
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let temp = tempdir().unwrap();
        let ctx = ExecContext::new(temp.path());
        let task = Task::new(TaskKind::ShellCommand, "pwd").with_parameter("command", "pwd");

        let result = ShellCommandStrategy.execute(&task, &ctx).await.unwrap();
        let canonical = temp.path().canonicalize().unwrap();
        assert!(result.output.trim().ends_with(canonical.file_name().unwrap().to_str().unwrap()));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_long_command() {
        let temp = tempdir().unwrap();
        let ctx = ExecContext::new(temp.path());
        let cancel = ctx.cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let task = Task::new(TaskKind::ShellCommand, "sleep").with_parameter("command", "sleep 30");
        let started = std::time::Instant::now();
        let err = ShellCommandStrategy.execute(&task, &ctx).await.unwrap_err();

        assert!(matches!(err, ExecError::Cancelled));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_system_task_without_command_reports_memory() {
        let temp = tempdir().unwrap();
        let ctx = ExecContext::new(temp.path());
        let task = Task::new(TaskKind::System, "investigate load");

        let result = SystemTaskStrategy.execute(&task, &ctx).await.unwrap();
        assert!(result.success);
        assert!(result.metrics.contains_key("memory_used_pct"));
    }
}
