//! Runtime observation strategies: monitoring, health checks, log analysis

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Task, TaskKind, TaskResult};
use crate::llm::LanguageModel;
use crate::mcp::McpManager;
use crate::state::StateStore;

use super::{ExecContext, ExecError, Strategy};

/// Sample runtime memory and processor counts
pub struct SystemMonitoringStrategy {
    state: Arc<StateStore>,
}

impl SystemMonitoringStrategy {
    pub fn new(state: Arc<StateStore>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Strategy for SystemMonitoringStrategy {
    async fn execute(&self, _task: &Task, _ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        println!("agent sampling system metrics");

        let mut system = sysinfo::System::new();
        system.refresh_memory();
        system.refresh_cpu_usage();

        let total = system.total_memory();
        let used = system.used_memory();
        let memory_pct = if total > 0 { (used as f64 / total as f64) * 100.0 } else { 0.0 };
        let processors = system.cpus().len();
        let tasks_executed = self.state.total_tasks_executed();

        Ok(TaskResult::success(format!(
            "memory: {:.1}% used ({} / {} bytes), processors: {}, tasks executed: {}",
            memory_pct, used, total, processors, tasks_executed
        ))
        .with_metric("memory_used_pct", memory_pct)
        .with_metric("memory_used_bytes", used as f64)
        .with_metric("memory_total_bytes", total as f64)
        .with_metric("processors", processors as f64)
        .with_metric("tasks_executed", tasks_executed as f64))
    }
}

/// Collect readiness of the language model and the remote servers
pub struct HealthCheckStrategy {
    llm: Arc<dyn LanguageModel>,
    mcp: Arc<McpManager>,
}

impl HealthCheckStrategy {
    pub fn new(llm: Arc<dyn LanguageModel>, mcp: Arc<McpManager>) -> Self {
        Self { llm, mcp }
    }
}

#[async_trait]
impl Strategy for HealthCheckStrategy {
    async fn execute(&self, _task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        println!("agent running health check");
        ctx.cancel.check()?;

        let lm_ready = self.llm.is_ready();
        let server_status = self.mcp.server_status().await;
        let servers_up = server_status.values().filter(|up| **up).count();

        let mut lines = vec![
            format!("language model: {}", if lm_ready { "ready" } else { "not ready" }),
            format!("remote servers: {}/{} connected", servers_up, server_status.len()),
        ];
        for (id, up) in &server_status {
            lines.push(format!("  {}: {}", id, if *up { "connected" } else { "unavailable" }));
        }

        let healthy = lm_ready || !server_status.is_empty();
        let mut result = TaskResult::success(lines.join("\n"));
        result.success = healthy;
        result.artifacts.insert("lm_ready".to_string(), lm_ready.into());
        result.metrics.insert("servers_connected".to_string(), servers_up as f64);
        Ok(result)
    }
}

/// Count lines of a text file matching a pattern (default "ERROR")
pub struct LogAnalysisStrategy;

#[async_trait]
impl Strategy for LogAnalysisStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let path = task
            .param_str("file_path")
            .ok_or_else(|| ExecError::missing(TaskKind::LogAnalysis, "file_path"))?;
        let pattern = task.param_str("pattern").unwrap_or("ERROR");

        let full = ctx.resolve(path);

        println!("agent analyzing log {} for '{}'", full.display(), pattern);

        let content = tokio::fs::read_to_string(&full).await?;
        let matches: Vec<&str> = content.lines().filter(|line| line.contains(pattern)).collect();
        let count = matches.len();

        let mut preview = matches.iter().take(10).map(|s| s.to_string()).collect::<Vec<_>>().join("\n");
        if count > 10 {
            preview.push_str(&format!("\n... and {} more", count - 10));
        }

        Ok(TaskResult::success(format!(
            "{} of {} lines match '{}'{}{}",
            count,
            content.lines().count(),
            pattern,
            if count > 0 { "\n" } else { "" },
            preview
        ))
        .with_metric("matching_lines", count as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLm;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_system_monitoring_reports_metrics() {
        let strategy = SystemMonitoringStrategy::new(Arc::new(StateStore::new()));
        let ctx = ExecContext::new(".");
        let task = Task::new(TaskKind::SystemMonitoring, "sample");

        let result = strategy.execute(&task, &ctx).await.unwrap();
        assert!(result.success);
        assert!(result.metrics.contains_key("memory_used_pct"));
        assert!(result.metrics.contains_key("processors"));
        assert!(*result.metrics.get("processors").unwrap() >= 1.0);
    }

    #[tokio::test]
    async fn test_health_check_reports_lm_readiness() {
        let strategy = HealthCheckStrategy::new(Arc::new(MockLm::default()), Arc::new(McpManager::disabled()));
        let ctx = ExecContext::new(".");
        let task = Task::new(TaskKind::HealthCheck, "health");

        let result = strategy.execute(&task, &ctx).await.unwrap();
        assert!(result.success);
        assert!(result.output.contains("language model: ready"));
        assert_eq!(result.artifacts.get("lm_ready"), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn test_log_analysis_counts_default_pattern() {
        let temp = tempdir().unwrap();
        std::fs::write(
            temp.path().join("app.log"),
            "INFO start\nERROR one\nWARN mid\nERROR two\nINFO done\n",
        )
        .unwrap();

        let strategy = LogAnalysisStrategy;
        let ctx = ExecContext::new(temp.path());
        let task = Task::new(TaskKind::LogAnalysis, "scan").with_parameter("file_path", "app.log");

        let result = strategy.execute(&task, &ctx).await.unwrap();
        assert_eq!(result.metrics.get("matching_lines"), Some(&2.0));
        assert!(result.output.contains("ERROR one"));
    }

    #[tokio::test]
    async fn test_log_analysis_custom_pattern() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("app.log"), "a\ntimeout b\nc timeout\n").unwrap();

        let strategy = LogAnalysisStrategy;
        let ctx = ExecContext::new(temp.path());
        let task = Task::new(TaskKind::LogAnalysis, "scan")
            .with_parameter("file_path", "app.log")
            .with_parameter("pattern", "timeout");

        let result = strategy.execute(&task, &ctx).await.unwrap();
        assert_eq!(result.metrics.get("matching_lines"), Some(&2.0));
    }

    #[tokio::test]
    async fn test_log_analysis_missing_file() {
        let temp = tempdir().unwrap();
        let strategy = LogAnalysisStrategy;
        let ctx = ExecContext::new(temp.path());
        let task = Task::new(TaskKind::LogAnalysis, "scan").with_parameter("file_path", "absent.log");

        let err = strategy.execute(&task, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::Io(_)));
    }
}
