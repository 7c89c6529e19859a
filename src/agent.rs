//! Agent façade: lifecycle, submission gate, status

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::domain::{Task, TaskId};
use crate::exec::{ExecDeps, ProcessRegistry, TaskExecutor};
use crate::llm::LanguageModel;
use crate::mcp::McpManager;
use crate::monitor::Monitor;
use crate::queue::{QueueError, QueueHandle, QueueSnapshot, TaskQueue};
use crate::state::StateStore;

/// Agent status for the CLI and health checks
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub running: bool,
    pub shutting_down: bool,
    pub uptime_ms: u64,
    pub total_tasks_executed: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Composes the state store, executor registry, queue, monitor, and remote
/// tool manager. All collaborators arrive as constructor parameters; the
/// façade owns wiring and lifecycle, nothing else.
pub struct Agent {
    config: AgentConfig,
    state: Arc<StateStore>,
    processes: Arc<ProcessRegistry>,
    queue: TaskQueue,
    monitor: Monitor,
    mcp: Arc<McpManager>,
    running: bool,
    shutting_down: bool,
    started_at: Option<Instant>,
    last_activity: Option<DateTime<Utc>>,
}

impl Agent {
    pub fn new(config: AgentConfig, llm: Arc<dyn LanguageModel>, mcp: Arc<McpManager>) -> Self {
        let state = Arc::new(StateStore::new());
        let processes = Arc::new(ProcessRegistry::new());

        let executor = Arc::new(TaskExecutor::new(ExecDeps {
            llm,
            mcp: Arc::clone(&mcp),
            state: Arc::clone(&state),
            processes: Arc::clone(&processes),
        }));

        let queue = TaskQueue::new(config.queue.clone(), executor, Arc::clone(&state));
        let monitor = Monitor::new(config.monitor.clone(), queue.clone());

        Self {
            config,
            state,
            processes,
            queue,
            monitor,
            mcp,
            running: false,
            shutting_down: false,
            started_at: None,
            last_activity: None,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// The narrow seam handed to the planner
    pub fn queue_handle(&self) -> QueueHandle {
        QueueHandle::new(self.queue.clone())
    }

    pub fn mcp(&self) -> &Arc<McpManager> {
        &self.mcp
    }

    /// Start queue workers, the monitor, and the remote servers. Idempotent.
    pub async fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }

        if self.config.auto_save {
            match QueueSnapshot::load(&self.config.snapshot_path) {
                Ok(snapshot) => {
                    info!(tasks = snapshot.tasks.len(), "restoring queue snapshot");
                    self.queue.restore(snapshot).await;
                }
                Err(_) => info!("no queue snapshot to restore"),
            }
        }

        let initialized = self.mcp.initialize().await;
        if self.mcp.server_count() > 0 {
            info!(initialized, configured = self.mcp.server_count(), "remote servers initialized");
        }

        self.queue.start().await;
        self.monitor.start().context("failed to start monitor")?;

        self.running = true;
        self.started_at = Some(Instant::now());
        info!("agent started");
        Ok(())
    }

    /// Stop the monitor and drain the queue, then persist state if enabled.
    pub async fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.shutting_down = true;

        self.monitor.stop().await;
        self.queue.stop().await;
        self.mcp.disconnect_all().await;

        let killed = self.processes.kill_all();
        if killed > 0 {
            warn!(killed, "killed orphaned background processes");
        }

        if self.config.auto_save {
            let snapshot = self.queue.snapshot().await;
            if let Err(e) = snapshot.save(&self.config.snapshot_path) {
                warn!(error = %e, "failed to save queue snapshot");
            } else {
                info!(path = %self.config.snapshot_path.display(), "queue snapshot saved");
            }
        }

        self.running = false;
        self.shutting_down = false;
        info!("agent stopped");
    }

    /// Submit a task; rejected while the agent is not running.
    pub async fn submit_task(&mut self, task: Task) -> Result<TaskId, QueueError> {
        if !self.running {
            return Err(QueueError::NotRunning);
        }
        self.last_activity = Some(Utc::now());
        self.queue.submit(task).await
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            running: self.running,
            shutting_down: self.shutting_down,
            uptime_ms: self.started_at.map(|t| t.elapsed().as_millis() as u64).unwrap_or(0),
            total_tasks_executed: self.state.total_tasks_executed(),
            last_activity: self.last_activity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskKind, TaskStatus};
    use crate::llm::MockLm;

    fn test_agent() -> Agent {
        let mut config = AgentConfig::default();
        config.auto_save = false;
        Agent::new(config, Arc::new(MockLm::default()), Arc::new(McpManager::disabled()))
    }

    #[tokio::test]
    async fn test_submit_rejected_when_not_running() {
        let mut agent = test_agent();
        let task = Task::new(TaskKind::ShellCommand, "echo").with_parameter("command", "echo x");
        assert!(matches!(agent.submit_task(task).await, Err(QueueError::NotRunning)));
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_submits_flow() {
        let mut agent = test_agent();
        agent.start().await.unwrap();
        agent.start().await.unwrap();

        let task = Task::new(TaskKind::ShellCommand, "echo").with_parameter("command", "echo from-agent");
        let id = agent.submit_task(task).await.unwrap();

        let rx = agent.queue().subscribe(id).await.unwrap();
        let done = tokio::time::timeout(std::time::Duration::from_secs(20), rx).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);

        let status = agent.status();
        assert!(status.running);
        assert!(!status.shutting_down);
        assert_eq!(status.total_tasks_executed, 1);
        assert!(status.last_activity.is_some());

        agent.stop().await;
        assert!(!agent.status().running);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let mut agent = test_agent();
        agent.stop().await;
        assert!(!agent.status().running);
    }

    #[tokio::test]
    async fn test_auto_save_roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let snapshot_path = temp.path().join("snap.json");

        let mut config = AgentConfig::default();
        config.auto_save = true;
        config.snapshot_path = snapshot_path.clone();
        // No workers picking tasks up: pause before submitting so the task
        // survives into the snapshot
        let mut agent = Agent::new(config.clone(), Arc::new(MockLm::default()), Arc::new(McpManager::disabled()));
        agent.start().await.unwrap();
        agent.queue().pause();

        let task = Task::new(TaskKind::ShellCommand, "held").with_parameter("command", "echo held");
        agent.submit_task(task).await.unwrap();
        agent.stop().await;

        assert!(snapshot_path.exists());

        let mut revived = Agent::new(config, Arc::new(MockLm::default()), Arc::new(McpManager::disabled()));
        revived.queue().pause();
        revived.start().await.unwrap();
        let stats = revived.queue().statistics().await;
        assert_eq!(stats.total, 1);
        revived.stop().await;
    }
}
