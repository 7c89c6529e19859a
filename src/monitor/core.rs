//! Monitor implementation: trigger jobs and task synthesis

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use regex::Regex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{Priority, Task, TaskKind, Trigger, TriggerType};
use crate::queue::TaskQueue;

use super::config::{MonitorConfig, parse_period};
use super::MonitorError;

/// The continuous monitor. Owns the filesystem watch service and the
/// scheduled trigger jobs; synthesizes tasks into the queue when anything
/// fires.
pub struct Monitor {
    config: MonitorConfig,
    queue: TaskQueue,
    watcher: Option<notify::RecommendedWatcher>,
    jobs: Vec<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

impl Monitor {
    pub fn new(config: MonitorConfig, queue: TaskQueue) -> Self {
        Self {
            config,
            queue,
            watcher: None,
            jobs: Vec::new(),
            shutdown: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Validate triggers and start every job. Fails before starting anything
    /// when a trigger is malformed.
    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.is_running() {
            return Err(MonitorError::AlreadyRunning);
        }

        let plans = self.validate_triggers()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Filesystem watch service, one registration per file_change trigger
        let file_triggers: Vec<FileTriggerPlan> = plans
            .iter()
            .filter_map(|plan| match plan {
                TriggerPlan::FileChange(p) => Some(p.clone()),
                _ => None,
            })
            .collect();
        if !file_triggers.is_empty() {
            self.watcher = Some(self.spawn_watch_consumer(file_triggers, shutdown_rx.clone())?);
        }

        for plan in plans {
            match plan {
                TriggerPlan::FileChange(_) => {} // handled by the watch service
                TriggerPlan::Periodic { trigger, period, initial_delay } => {
                    self.jobs.push(self.spawn_periodic(trigger, period, initial_delay, shutdown_rx.clone()));
                }
                TriggerPlan::Metric { trigger, threshold } => {
                    self.jobs.push(self.spawn_metric(trigger, threshold, shutdown_rx.clone()));
                }
                TriggerPlan::LogPattern { trigger, path, pattern } => {
                    self.jobs.push(self.spawn_log_scan(trigger, path, pattern, shutdown_rx.clone()));
                }
            }
        }

        self.jobs.push(self.spawn_health_check(shutdown_rx.clone()));
        self.jobs.push(self.spawn_resource_monitor(shutdown_rx));

        self.shutdown = Some(shutdown_tx);
        info!(triggers = self.config.triggers.len(), "monitor started");
        Ok(())
    }

    /// Stop all jobs, draining within the configured budget.
    pub async fn stop(&mut self) {
        let Some(shutdown) = self.shutdown.take() else { return };
        let _ = shutdown.send(true);

        // Dropping the watcher closes the watch service
        self.watcher = None;

        let deadline = tokio::time::timeout(self.config.shutdown_timeout(), async {
            for job in self.jobs.drain(..) {
                let _ = job.await;
            }
        })
        .await;

        if deadline.is_err() {
            warn!("monitor drain exceeded shutdown timeout, aborting jobs");
            for job in self.jobs.drain(..) {
                job.abort();
            }
        }

        info!("monitor stopped");
    }

    // === Validation ===

    fn validate_triggers(&self) -> Result<Vec<TriggerPlan>, MonitorError> {
        let mut plans = Vec::new();

        for trigger in &self.config.triggers {
            // The action must name a known task kind up front
            if trigger.action.to_uppercase().parse::<TaskKind>().is_err() {
                return Err(MonitorError::InvalidTrigger {
                    name: trigger.name.clone(),
                    reason: format!("unknown action '{}'", trigger.action),
                });
            }

            let plan = match trigger.trigger_type {
                TriggerType::FileChange => {
                    let path = trigger.path.clone().ok_or_else(|| MonitorError::InvalidTrigger {
                        name: trigger.name.clone(),
                        reason: "file_change trigger requires 'path'".to_string(),
                    })?;
                    let pattern = trigger
                        .pattern
                        .as_deref()
                        .map(Regex::new)
                        .transpose()
                        .map_err(|e| MonitorError::InvalidTrigger {
                            name: trigger.name.clone(),
                            reason: format!("invalid pattern: {}", e),
                        })?;
                    TriggerPlan::FileChange(FileTriggerPlan {
                        trigger: trigger.clone(),
                        path: PathBuf::from(path),
                        pattern,
                    })
                }
                TriggerType::Interval | TriggerType::Scheduled => {
                    let spec = trigger.schedule.as_deref().ok_or_else(|| MonitorError::InvalidTrigger {
                        name: trigger.name.clone(),
                        reason: "trigger requires 'schedule'".to_string(),
                    })?;
                    let period = parse_period(spec).map_err(|reason| MonitorError::InvalidTrigger {
                        name: trigger.name.clone(),
                        reason,
                    })?;
                    // Scheduled triggers start after one full period
                    let initial_delay = period;
                    TriggerPlan::Periodic {
                        trigger: trigger.clone(),
                        period,
                        initial_delay,
                    }
                }
                TriggerType::SystemMetric => {
                    let threshold = trigger.threshold.ok_or_else(|| MonitorError::InvalidTrigger {
                        name: trigger.name.clone(),
                        reason: "system_metric trigger requires 'threshold'".to_string(),
                    })?;
                    TriggerPlan::Metric {
                        trigger: trigger.clone(),
                        threshold,
                    }
                }
                TriggerType::LogPattern => {
                    let path = trigger.path.clone().ok_or_else(|| MonitorError::InvalidTrigger {
                        name: trigger.name.clone(),
                        reason: "log_pattern trigger requires 'path'".to_string(),
                    })?;
                    let pattern_src = trigger.pattern.as_deref().unwrap_or("ERROR");
                    let pattern = Regex::new(pattern_src).map_err(|e| MonitorError::InvalidTrigger {
                        name: trigger.name.clone(),
                        reason: format!("invalid pattern: {}", e),
                    })?;
                    TriggerPlan::LogPattern {
                        trigger: trigger.clone(),
                        path: PathBuf::from(path),
                        pattern,
                    }
                }
            };
            plans.push(plan);
        }

        Ok(plans)
    }

    // === Jobs ===

    fn spawn_watch_consumer(
        &self,
        triggers: Vec<FileTriggerPlan>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<notify::RecommendedWatcher, MonitorError> {
        let (event_tx, mut events) = mpsc::unbounded_channel::<Event>();

        let mut watcher = notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
            match result {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(e) => warn!(error = %e, "filesystem watch error"),
            }
        })
        .map_err(|e| MonitorError::Watch(e.to_string()))?;

        // Register each trigger path; resolve to an absolute path so event
        // paths (which arrive absolute) prefix-match correctly.
        let mut resolved: Vec<FileTriggerPlan> = Vec::with_capacity(triggers.len());
        for mut plan in triggers {
            std::fs::create_dir_all(&plan.path).map_err(|e| MonitorError::Watch(e.to_string()))?;
            plan.path = plan.path.canonicalize().map_err(|e| MonitorError::Watch(e.to_string()))?;
            watcher
                .watch(&plan.path, RecursiveMode::Recursive)
                .map_err(|e| MonitorError::Watch(e.to_string()))?;
            debug!(trigger = %plan.trigger.name, path = %plan.path.display(), "watching path");
            resolved.push(plan);
        }

        let queue = self.queue.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        if !is_relevant_event(&event.kind) {
                            continue; // overflow and access events are ignored
                        }
                        for path in &event.paths {
                            for plan in &resolved {
                                if plan.matches(path) {
                                    let context = format!("{:?} {}", event.kind, path.display());
                                    fire(&queue, &plan.trigger, &context, Some(path)).await;
                                }
                            }
                        }
                    }
                }
            }
        });

        Ok(watcher)
    }

    fn spawn_periodic(
        &self,
        trigger: Trigger,
        period: Duration,
        initial_delay: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let queue = self.queue.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }
            loop {
                let context = format!("{} fired ({}ms period)", trigger.trigger_type, period.as_millis());
                fire(&queue, &trigger, &context, None).await;

                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(period) => {}
                }
            }
        })
    }

    fn spawn_metric(&self, trigger: Trigger, threshold: f64, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let queue = self.queue.clone();
        let sample_period = Duration::from_secs(self.config.metric_sample_secs);
        tokio::spawn(async move {
            let mut system = sysinfo::System::new();
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(sample_period) => {}
                }

                system.refresh_memory();
                let total = system.total_memory();
                let pct = if total > 0 {
                    (system.used_memory() as f64 / total as f64) * 100.0
                } else {
                    0.0
                };

                if pct > threshold {
                    let context = format!("memory usage {:.1}% exceeds threshold {:.1}%", pct, threshold);
                    fire(&queue, &trigger, &context, None).await;
                }
            }
        })
    }

    fn spawn_log_scan(
        &self,
        trigger: Trigger,
        path: PathBuf,
        pattern: Regex,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let queue = self.queue.clone();
        let scan_period = Duration::from_secs(self.config.log_scan_secs);
        tokio::spawn(async move {
            let mut last_count = 0usize;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(scan_period) => {}
                }

                let Ok(content) = tokio::fs::read_to_string(&path).await else {
                    continue;
                };
                let count = content.lines().filter(|line| pattern.is_match(line)).count();

                if count > last_count {
                    let context = format!(
                        "{} new lines matching '{}' in {}",
                        count - last_count,
                        pattern.as_str(),
                        path.display()
                    );
                    fire(&queue, &trigger, &context, Some(&path)).await;
                }
                last_count = count;
            }
        })
    }

    /// Built-in: investigate when the live backlog outgrows the worker pool
    fn spawn_health_check(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let queue = self.queue.clone();
        let period = Duration::from_secs(self.config.health_check_secs);
        let delay = Duration::from_secs(self.config.health_check_delay_secs);
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            loop {
                let stats = queue.statistics().await;
                let live = stats.pending + stats.waiting + stats.running;
                let limit = queue.config().max_concurrent * 2;

                if live > limit {
                    warn!(live, limit, "task backlog exceeds threshold, submitting investigation task");
                    let task = Task::with_priority(TaskKind::System, "investigate task backlog", Priority::High)
                        .with_description(format!("{} live tasks against a limit of {}", live, limit));
                    if let Err(e) = queue.submit(task).await {
                        warn!(error = %e, "failed to submit investigation task");
                    }
                }

                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(period) => {}
                }
            }
        })
    }

    /// Built-in: log a warning when memory usage is high
    fn spawn_resource_monitor(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.resource_monitor_secs);
        let delay = Duration::from_secs(self.config.resource_monitor_delay_secs);
        let warn_pct = self.config.memory_warn_pct;
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let mut system = sysinfo::System::new();
            loop {
                system.refresh_memory();
                let total = system.total_memory();
                let pct = if total > 0 {
                    (system.used_memory() as f64 / total as f64) * 100.0
                } else {
                    0.0
                };
                if pct > warn_pct {
                    warn!(memory_pct = format!("{:.1}", pct), "memory usage high");
                } else {
                    debug!(memory_pct = format!("{:.1}", pct), "memory usage sampled");
                }

                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(period) => {}
                }
            }
        })
    }
}

/// A validated, ready-to-run trigger
enum TriggerPlan {
    FileChange(FileTriggerPlan),
    Periodic {
        trigger: Trigger,
        period: Duration,
        initial_delay: Duration,
    },
    Metric {
        trigger: Trigger,
        threshold: f64,
    },
    LogPattern {
        trigger: Trigger,
        path: PathBuf,
        pattern: Regex,
    },
}

#[derive(Clone)]
struct FileTriggerPlan {
    trigger: Trigger,
    path: PathBuf,
    pattern: Option<Regex>,
}

impl FileTriggerPlan {
    /// Event matches when its path starts with the trigger path and, if a
    /// pattern is configured, the file name matches it.
    fn matches(&self, path: &Path) -> bool {
        if !path.starts_with(&self.path) {
            return false;
        }
        match &self.pattern {
            Some(pattern) => path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.is_match(name)),
            None => true,
        }
    }
}

fn is_relevant_event(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_))
}

/// Synthesize and submit the task for a fired trigger
async fn fire(queue: &TaskQueue, trigger: &Trigger, context: &str, path: Option<&Path>) {
    let Ok(kind) = trigger.action.to_uppercase().parse::<TaskKind>() else {
        warn!(trigger = %trigger.name, action = %trigger.action, "trigger has invalid action, skipping");
        return;
    };

    debug!(trigger = %trigger.name, %context, "trigger fired");

    let mut task = Task::with_priority(kind, trigger.name.clone(), Priority::Medium)
        .with_description(format!("Triggered by: {}", trigger.name));

    task.context.trigger_source = Some(trigger.name.clone());
    task.context.metadata.insert("trigger".to_string(), trigger.name.clone().into());
    task.context
        .metadata
        .insert("trigger_type".to_string(), trigger.trigger_type.to_string().into());
    task.context.metadata.insert("context".to_string(), context.into());
    task.context
        .metadata
        .insert("timestamp".to_string(), Utc::now().to_rfc3339().into());

    if let Some(command) = &trigger.command {
        task.context.metadata.insert("command".to_string(), command.clone().into());
    }
    if let Some(path) = path {
        task.parameters.insert("file_path".to_string(), path.display().to_string().into());
    }

    if let Err(e) = queue.submit(task).await {
        warn!(trigger = %trigger.name, error = %e, "failed to submit triggered task");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testutil;
    use crate::queue::QueueConfig;
    use crate::state::StateStore;
    use std::sync::Arc;

    fn test_queue() -> TaskQueue {
        TaskQueue::new(
            QueueConfig::default(),
            Arc::new(testutil::executor()),
            Arc::new(StateStore::new()),
        )
    }

    fn file_trigger(path: &str, pattern: Option<&str>) -> Trigger {
        Trigger {
            name: "watch-logs".to_string(),
            trigger_type: TriggerType::FileChange,
            path: Some(path.to_string()),
            pattern: pattern.map(str::to_string),
            schedule: None,
            threshold: None,
            action: "FILE_READ".to_string(),
            command: None,
        }
    }

    #[test]
    fn test_file_trigger_matching() {
        let plan = FileTriggerPlan {
            trigger: file_trigger("/watch", Some(r".*\.log")),
            path: PathBuf::from("/watch"),
            pattern: Some(Regex::new(r".*\.log").unwrap()),
        };

        assert!(plan.matches(Path::new("/watch/app.log")));
        assert!(plan.matches(Path::new("/watch/nested/deep.log")));
        assert!(!plan.matches(Path::new("/watch/readme.txt")));
        assert!(!plan.matches(Path::new("/elsewhere/app.log")));
    }

    #[test]
    fn test_file_trigger_without_pattern_matches_all() {
        let plan = FileTriggerPlan {
            trigger: file_trigger("/watch", None),
            path: PathBuf::from("/watch"),
            pattern: None,
        };

        assert!(plan.matches(Path::new("/watch/anything.xyz")));
        assert!(!plan.matches(Path::new("/other/anything.xyz")));
    }

    #[test]
    fn test_relevant_events() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind};

        assert!(is_relevant_event(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant_event(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_relevant_event(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_relevant_event(&EventKind::Access(notify::event::AccessKind::Any)));
        assert!(!is_relevant_event(&EventKind::Other));
    }

    #[tokio::test]
    async fn test_fire_synthesizes_task_with_metadata() {
        let queue = test_queue();
        let mut trigger = file_trigger("/watch", None);
        trigger.command = Some("echo hi".to_string());

        fire(&queue, &trigger, "MODIFY /watch/app.log", Some(Path::new("/watch/app.log"))).await;

        let tasks = queue.list_tasks(10, None).await;
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];

        assert_eq!(task.kind, TaskKind::FileRead);
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.description.starts_with("Triggered by:"));
        assert_eq!(task.context.metadata.get("trigger"), Some(&serde_json::json!("watch-logs")));
        assert_eq!(
            task.context.metadata.get("trigger_type"),
            Some(&serde_json::json!("file_change"))
        );
        assert_eq!(task.context.metadata.get("command"), Some(&serde_json::json!("echo hi")));
        assert!(task.context.metadata.contains_key("timestamp"));
        assert_eq!(task.param_str("file_path"), Some("/watch/app.log"));
    }

    #[tokio::test]
    async fn test_fire_with_invalid_action_submits_nothing() {
        let queue = test_queue();
        let mut trigger = file_trigger("/watch", None);
        trigger.action = "NOT_A_KIND".to_string();

        fire(&queue, &trigger, "context", None).await;
        assert!(queue.list_tasks(10, None).await.is_empty());
    }

    #[test]
    fn test_start_rejects_invalid_trigger_action() {
        let mut trigger = file_trigger("/watch", None);
        trigger.action = "NOT_A_KIND".to_string();

        let config = MonitorConfig {
            triggers: vec![trigger],
            ..Default::default()
        };
        let mut monitor = Monitor::new(config, test_queue());
        // Validation happens before any job starts, so this is synchronous
        assert!(matches!(monitor.start(), Err(MonitorError::InvalidTrigger { .. })));
    }

    #[tokio::test]
    async fn test_interval_trigger_fires() {
        let queue = test_queue();
        let trigger = Trigger {
            name: "tick".to_string(),
            trigger_type: TriggerType::Interval,
            path: None,
            pattern: None,
            schedule: Some("100ms".to_string()),
            threshold: None,
            action: "SHELL_COMMAND".to_string(),
            command: Some("echo tick".to_string()),
        };

        let config = MonitorConfig {
            triggers: vec![trigger],
            ..Default::default()
        };
        let mut monitor = Monitor::new(config, queue.clone());
        monitor.start().unwrap();

        tokio::time::sleep(Duration::from_millis(450)).await;
        monitor.stop().await;

        let tasks = queue.list_tasks(100, None).await;
        assert!(tasks.len() >= 2, "expected repeated firings, got {}", tasks.len());
        assert!(tasks.iter().all(|t| t.kind == TaskKind::ShellCommand));
    }

    #[tokio::test]
    async fn test_file_change_trigger_end_to_end() {
        let temp = tempfile::tempdir().unwrap();
        let watch_dir = temp.path().join("watch");

        let queue = test_queue();
        let config = MonitorConfig {
            triggers: vec![file_trigger(watch_dir.to_str().unwrap(), Some(r".*\.log"))],
            ..Default::default()
        };
        let mut monitor = Monitor::new(config, queue.clone());
        monitor.start().unwrap();

        // Give the watcher a moment to register, then touch a matching file
        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::write(watch_dir.join("app.log"), "hello").unwrap();

        // Within 2 seconds a synthesized task must appear
        let mut found = None;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let tasks = queue.list_tasks(10, None).await;
            if let Some(task) = tasks.first() {
                found = Some(task.clone());
                break;
            }
        }
        monitor.stop().await;

        let task = found.expect("file change should synthesize a task within 2s");
        assert!(task.description.starts_with("Triggered by:"));
        assert_eq!(task.context.metadata.get("trigger"), Some(&serde_json::json!("watch-logs")));
    }

    #[tokio::test]
    async fn test_non_matching_file_does_not_fire() {
        let temp = tempfile::tempdir().unwrap();
        let watch_dir = temp.path().join("watch");

        let queue = test_queue();
        let config = MonitorConfig {
            triggers: vec![file_trigger(watch_dir.to_str().unwrap(), Some(r".*\.log"))],
            ..Default::default()
        };
        let mut monitor = Monitor::new(config, queue.clone());
        monitor.start().unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::write(watch_dir.join("notes.txt"), "hello").unwrap();

        tokio::time::sleep(Duration::from_millis(700)).await;
        monitor.stop().await;

        assert!(queue.list_tasks(10, None).await.is_empty());
    }
}
