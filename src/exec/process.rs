//! Detached background processes

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::{Task, TaskKind, TaskResult};

use super::shell::{command_for, shell_invocation};
use super::{ExecContext, ExecError, Strategy};

/// Tracks detached children started by BACKGROUND_PROCESS tasks so callers
/// can query and kill them by pid later.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    entries: Mutex<HashMap<u32, String>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, pid: u32, command: String) {
        self.entries.lock().expect("process registry poisoned").insert(pid, command);
    }

    /// Command line registered under a pid
    pub fn command(&self, pid: u32) -> Option<String> {
        self.entries.lock().expect("process registry poisoned").get(&pid).cloned()
    }

    /// Pids currently tracked
    pub fn pids(&self) -> Vec<u32> {
        self.entries.lock().expect("process registry poisoned").keys().copied().collect()
    }

    /// Whether a tracked process is still alive (signal 0 probe)
    pub fn is_alive(&self, pid: u32) -> bool {
        if self.command(pid).is_none() {
            return false;
        }
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    /// Hard-kill a tracked process; returns false for unknown pids
    pub fn kill(&self, pid: u32) -> bool {
        let known = self.entries.lock().expect("process registry poisoned").remove(&pid).is_some();
        if !known {
            return false;
        }
        match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => {
                debug!(pid, "background process killed");
                true
            }
            Err(e) => {
                warn!(pid, error = %e, "failed to kill background process");
                false
            }
        }
    }

    /// Kill everything still tracked (agent shutdown)
    pub fn kill_all(&self) -> usize {
        let pids = self.pids();
        pids.into_iter().filter(|pid| self.kill(*pid)).count()
    }
}

/// Start a detached process and report its pid
pub struct BackgroundProcessStrategy {
    registry: std::sync::Arc<ProcessRegistry>,
}

impl BackgroundProcessStrategy {
    pub fn new(registry: std::sync::Arc<ProcessRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Strategy for BackgroundProcessStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let command = command_for(task).ok_or_else(|| ExecError::missing(TaskKind::BackgroundProcess, "command"))?;

        if let Some(reason) = super::denylist::command_blocked_reason(&command) {
            return Err(ExecError::CommandBlocked(format!("{} ({})", command, reason)));
        }

        println!("agent starting background process (in: {}): {}", ctx.working_dir.display(), command);

        let (shell, flag) = shell_invocation();
        let child = Command::new(shell)
            .arg(flag)
            .arg(&command)
            .current_dir(&ctx.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ExecError::Process(format!("failed to spawn background process: {}", e)))?;

        let pid = child.id().ok_or_else(|| ExecError::Process("spawned process has no pid".to_string()))?;
        self.registry.register(pid, command.clone());

        // Detach: the child outlives this task; the registry owns the pid.
        drop(child);

        Ok(TaskResult::success(format!("started background process {} (pid {})", command, pid))
            .with_command(command)
            .with_artifact("pid", serde_json::json!(pid)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_background_process_reports_pid_and_registers() {
        let temp = tempdir().unwrap();
        let ctx = ExecContext::new(temp.path());
        let registry = Arc::new(ProcessRegistry::new());
        let strategy = BackgroundProcessStrategy::new(Arc::clone(&registry));

        let task = Task::new(TaskKind::BackgroundProcess, "sleeper").with_parameter("command", "sleep 5");
        let result = strategy.execute(&task, &ctx).await.unwrap();

        let pid = result.artifacts.get("pid").and_then(|v| v.as_u64()).unwrap() as u32;
        assert!(registry.command(pid).is_some());
        assert!(registry.is_alive(pid));

        assert!(registry.kill(pid));
        assert!(registry.command(pid).is_none());
    }

    #[tokio::test]
    async fn test_kill_unknown_pid_is_false() {
        let registry = ProcessRegistry::new();
        assert!(!registry.kill(999_999));
    }

    #[tokio::test]
    async fn test_missing_command_is_validation_error() {
        let temp = tempdir().unwrap();
        let ctx = ExecContext::new(temp.path());
        let strategy = BackgroundProcessStrategy::new(Arc::new(ProcessRegistry::new()));

        let task = Task::new(TaskKind::BackgroundProcess, "empty");
        let err = strategy.execute(&task, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::MissingParameter { .. }));
    }

    #[tokio::test]
    async fn test_blocked_command_rejected() {
        let temp = tempdir().unwrap();
        let ctx = ExecContext::new(temp.path());
        let strategy = BackgroundProcessStrategy::new(Arc::new(ProcessRegistry::new()));

        let task = Task::new(TaskKind::BackgroundProcess, "bad").with_parameter("command", "mkfs.ext4 /dev/sda1");
        let err = strategy.execute(&task, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::CommandBlocked(_)));
    }
}
