//! Queue implementation: submission, dispatch workers, retries, cleanup

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, Notify, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::{Task, TaskId, TaskKind, TaskResult, TaskStatus};
use crate::exec::{CancelToken, ExecContext, ExecError, TaskExecutor, command_blocked_reason};
use crate::state::StateStore;

use super::config::QueueConfig;
use super::entry::ReadyEntry;
use super::{QueueError, QueueSnapshot};

/// Mutable queue state. Everything structural lives behind one mutex so the
/// heap, the index, and the running set can never disagree.
pub(super) struct QueueInner {
    /// Live-task index
    pub(super) tasks: HashMap<TaskId, Task>,

    /// Runnable tasks, priority-then-age ordered
    ready: BinaryHeap<ReadyEntry>,

    /// Currently executing tasks and their cancel tokens
    running: HashMap<TaskId, CancelToken>,

    /// Completion waiters, drained when a task goes terminal
    subscribers: HashMap<TaskId, Vec<oneshot::Sender<Task>>>,
}

struct Shared {
    config: QueueConfig,
    executor: Arc<TaskExecutor>,
    store: Arc<StateStore>,
    state: Mutex<QueueInner>,
    notify: Notify,
    paused: AtomicBool,
    shutdown: AtomicBool,
    seq: AtomicU64,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Aggregated counts for status display
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStatistics {
    pub total: usize,
    /// Operator-friendly: PENDING + QUEUED
    pub pending: usize,
    pub waiting: usize,
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub timed_out: usize,
}

/// The task queue. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl TaskQueue {
    pub fn new(config: QueueConfig, executor: Arc<TaskExecutor>, store: Arc<StateStore>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                executor,
                store,
                state: Mutex::new(QueueInner {
                    tasks: HashMap::new(),
                    ready: BinaryHeap::new(),
                    running: HashMap::new(),
                    subscribers: HashMap::new(),
                }),
                notify: Notify::new(),
                paused: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                seq: AtomicU64::new(0),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.shared.store
    }

    // === Submission ===

    /// Submit a task: validate, gate on dependencies, and enqueue.
    /// Denylisted commands are rejected here, before any state is created.
    pub async fn submit(&self, mut task: Task) -> Result<TaskId, QueueError> {
        if task.name.trim().is_empty() {
            return Err(QueueError::Validation("task name must be non-empty".to_string()));
        }

        if matches!(task.kind, TaskKind::ShellCommand | TaskKind::BackgroundProcess | TaskKind::System) {
            let command = task
                .param_str("command")
                .or_else(|| task.context.metadata.get("command").and_then(|v| v.as_str()));
            if let Some(command) = command {
                if let Some(reason) = command_blocked_reason(command) {
                    return Err(QueueError::CommandBlocked(format!("{} ({})", command, reason)));
                }
            }
        }

        let mut inner = self.shared.state.lock().await;

        if inner.tasks.contains_key(&task.id) {
            return Err(QueueError::Duplicate(task.id));
        }

        // Every dependency must already be known
        for dep in &task.dependencies {
            if !inner.tasks.contains_key(dep) {
                return Err(QueueError::DependencyUnmet {
                    task: task.id,
                    dependency: *dep,
                });
            }
        }

        // Belt and braces: reject a dependency chain that reaches back to
        // the submitted task itself.
        if Self::has_cycle(&inner, &task) {
            return Err(QueueError::DependencyCycle(task.id));
        }

        let id = task.id;
        task.add_log_entry("submitted");

        if Self::dependencies_complete(&inner, &task) {
            task.mark_queued();
            task.add_log_entry("queued");
            let entry = self.entry_for(&task);
            inner.ready.push(entry);
        } else {
            task.mark_waiting();
            task.add_log_entry("waiting for dependencies");
        }

        debug!(task_id = %id, kind = %task.kind, priority = %task.priority, status = %task.status, "task submitted");
        inner.tasks.insert(id, task);

        self.publish_counts(&inner);
        drop(inner);

        self.shared.notify.notify_waiters();
        Ok(id)
    }

    fn entry_for(&self, task: &Task) -> ReadyEntry {
        ReadyEntry {
            id: task.id,
            priority: task.priority,
            created_at: task.created_at,
            seq: self.shared.seq.fetch_add(1, Ordering::SeqCst),
        }
    }

    fn dependencies_complete(inner: &QueueInner, task: &Task) -> bool {
        task.dependencies
            .iter()
            .all(|dep| matches!(inner.tasks.get(dep).map(|t| t.status), Some(TaskStatus::Completed)))
    }

    fn has_cycle(inner: &QueueInner, task: &Task) -> bool {
        let mut stack: Vec<TaskId> = task.dependencies.clone();
        let mut seen: HashSet<TaskId> = HashSet::new();

        while let Some(current) = stack.pop() {
            if current == task.id {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(dep_task) = inner.tasks.get(&current) {
                stack.extend(dep_task.dependencies.iter().copied());
            }
        }
        false
    }

    fn publish_counts(&self, inner: &QueueInner) {
        let queued = inner.tasks.values().filter(|t| t.status == TaskStatus::Queued).count();
        self.shared.store.set("task_count", inner.tasks.len() as u64);
        self.shared.store.set("queued_task_count", queued as u64);
    }

    // === Lifecycle ===

    /// Spawn the worker pool and background jobs. Idempotent.
    pub async fn start(&self) {
        let mut workers = self.shared.workers.lock().await;
        if !workers.is_empty() {
            debug!("queue already started");
            return;
        }
        self.shared.shutdown.store(false, Ordering::SeqCst);

        for worker_id in 0..self.shared.config.max_concurrent {
            let queue = self.clone();
            workers.push(tokio::spawn(async move { queue.worker_loop(worker_id).await }));
        }

        // Belt-and-braces dependency promotion
        let queue = self.clone();
        workers.push(tokio::spawn(async move {
            let period = Duration::from_secs(queue.shared.config.dependency_check_secs);
            while !queue.shared.shutdown.load(Ordering::SeqCst) {
                tokio::time::sleep(period).await;
                queue.promote_ready().await;
            }
        }));

        // Hourly terminal-task sweep
        let queue = self.clone();
        workers.push(tokio::spawn(async move {
            let period = Duration::from_secs(queue.shared.config.cleanup_interval_secs);
            while !queue.shared.shutdown.load(Ordering::SeqCst) {
                tokio::time::sleep(period).await;
                let removed = queue.cleanup().await;
                if removed > 0 {
                    info!(removed, "cleanup removed terminal tasks");
                }
            }
        }));

        info!(workers = self.shared.config.max_concurrent, "queue started");
    }

    /// Stop workers, draining in-flight tasks within the shutdown budget.
    pub async fn stop(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();

        let mut workers = self.shared.workers.lock().await;
        let drained = tokio::time::timeout(self.shared.config.shutdown_timeout(), async {
            for worker in workers.drain(..) {
                let _ = worker.await;
            }
        })
        .await;

        if drained.is_err() {
            warn!("queue drain exceeded shutdown timeout, aborting workers");
            for worker in workers.drain(..) {
                worker.abort();
            }
        }

        info!("queue stopped");
    }

    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
        info!("queue paused");
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
        info!("queue resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    // === Worker ===

    async fn worker_loop(self, worker_id: usize) {
        debug!(worker_id, "worker started");

        while !self.shared.shutdown.load(Ordering::SeqCst) {
            if self.is_paused() {
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }

            match self.claim_next().await {
                Some((task, cancel)) => self.process(task, cancel).await,
                None => {
                    // Bounded wait so shutdown stays responsive
                    tokio::select! {
                        _ = self.shared.notify.notified() => {}
                        _ = tokio::time::sleep(self.shared.config.worker_tick()) => {}
                    }
                }
            }
        }

        debug!(worker_id, "worker stopped");
    }

    /// Pop the next runnable task, marking it started under the lock.
    async fn claim_next(&self) -> Option<(Task, CancelToken)> {
        let mut inner = self.shared.state.lock().await;

        if inner.running.len() >= self.shared.config.max_concurrent {
            return None;
        }

        while let Some(entry) = inner.ready.pop() {
            let Some(task) = inner.tasks.get_mut(&entry.id) else {
                continue; // removed by cleanup
            };
            if !task.can_execute() {
                // Cancelled or reassigned while queued
                debug!(task_id = %entry.id, status = %task.status, "discarding stale ready entry");
                continue;
            }

            task.mark_started();
            let snapshot = task.clone();

            let cancel = CancelToken::new();
            inner.running.insert(entry.id, cancel.clone());
            self.shared.store.set("current_task", entry.id.to_string());
            self.publish_counts(&inner);

            return Some((snapshot, cancel));
        }

        None
    }

    /// Execute one claimed task and record the outcome.
    async fn process(&self, task: Task, cancel: CancelToken) {
        let id = task.id;
        let mut ctx = ExecContext::for_task(&task);
        ctx.cancel = cancel.clone();

        enum Outcome {
            Done(Result<TaskResult, ExecError>),
            TimedOut,
        }

        let execution = self.shared.executor.execute(&task, &ctx);
        let outcome = tokio::select! {
            result = async {
                match task.timeout() {
                    Some(deadline) => match tokio::time::timeout(deadline, execution).await {
                        Ok(result) => Outcome::Done(result),
                        Err(_) => Outcome::TimedOut,
                    },
                    None => Outcome::Done(execution.await),
                }
            } => result,
            _ = cancel.cancelled() => Outcome::Done(Err(ExecError::Cancelled)),
        };

        let mut inner = self.shared.state.lock().await;
        inner.running.remove(&id);
        self.shared.store.remove("current_task");

        let Some(entry) = inner.tasks.get_mut(&id) else {
            warn!(task_id = %id, "task vanished during execution");
            return;
        };

        // Cancel() may have transitioned the task already; respect that.
        if entry.status != TaskStatus::Running {
            debug!(task_id = %id, status = %entry.status, "skipping outcome, task no longer running");
            self.publish_counts(&inner);
            return;
        }

        match outcome {
            Outcome::Done(Ok(result)) => {
                entry.mark_completed(result);
                let total = self.shared.store.increment_total_tasks_executed();
                debug!(task_id = %id, total_executed = total, "task completed");
                Self::notify_subscribers(&mut inner, id);
                self.promote_dependents_of(&mut inner, id);
            }
            Outcome::Done(Err(ExecError::Cancelled)) => {
                entry.mark_cancelled();
                Self::notify_subscribers(&mut inner, id);
                Self::cascade_dependents(&mut inner, id);
            }
            Outcome::TimedOut => {
                cancel.cancel();
                entry.mark_timed_out();
                warn!(task_id = %id, "task timed out");
                Self::notify_subscribers(&mut inner, id);
                Self::cascade_dependents(&mut inner, id);
            }
            Outcome::Done(Err(e)) => {
                let permanent = e.is_validation();
                entry.mark_failed(e.to_string());
                if permanent {
                    entry.exhaust_retries();
                }

                if entry.should_retry() {
                    let attempt = entry.retry_count;
                    let backoff = self.shared.config.retry_backoff(attempt);
                    info!(task_id = %id, attempt, ?backoff, "scheduling retry");
                    entry.add_log_entry(format!("retry {} scheduled in {:?}", attempt, backoff));
                    let queue = self.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(backoff).await;
                        queue.requeue_for_retry(id).await;
                    });
                } else {
                    error!(task_id = %id, error = %e, "task failed permanently");
                    Self::notify_subscribers(&mut inner, id);
                    Self::cascade_dependents(&mut inner, id);
                }
            }
        }

        self.publish_counts(&inner);
        drop(inner);
        self.shared.notify.notify_waiters();
    }

    /// Put a failed task back into the ready queue after its backoff.
    async fn requeue_for_retry(&self, id: TaskId) {
        let mut inner = self.shared.state.lock().await;
        let Some(task) = inner.tasks.get_mut(&id) else { return };

        // Cancelled (or swept) while waiting for the backoff
        if task.status != TaskStatus::Failed {
            return;
        }

        task.mark_queued();
        task.add_log_entry(format!("re-queued for retry {}", task.retry_count));
        let entry = self.entry_for(task);
        inner.ready.push(entry);

        self.publish_counts(&inner);
        drop(inner);
        self.shared.notify.notify_waiters();
    }

    /// Send the terminal task to everyone awaiting it
    fn notify_subscribers(inner: &mut QueueInner, id: TaskId) {
        if let Some(waiters) = inner.subscribers.remove(&id) {
            if let Some(task) = inner.tasks.get(&id) {
                for waiter in waiters {
                    let _ = waiter.send(task.clone());
                }
            }
        }
    }

    /// Promote waiting tasks whose dependencies are now all complete
    fn promote_dependents_of(&self, inner: &mut QueueInner, completed: TaskId) {
        let candidates: Vec<TaskId> = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::WaitingForDependencies && t.dependencies.contains(&completed))
            .map(|t| t.id)
            .collect();

        for id in candidates {
            let ready = {
                let task = &inner.tasks[&id];
                Self::dependencies_complete(inner, task)
            };
            if ready {
                let task = inner.tasks.get_mut(&id).expect("candidate exists");
                task.mark_queued();
                task.add_log_entry("dependencies satisfied");
                let entry = self.entry_for(task);
                inner.ready.push(entry);
                debug!(task_id = %id, "promoted from waiting");
            }
        }
    }

    /// A dependency ended without completing: cancel everything downstream.
    fn cascade_dependents(inner: &mut QueueInner, failed: TaskId) {
        let mut frontier = vec![failed];

        while let Some(current) = frontier.pop() {
            let dependents: Vec<TaskId> = inner
                .tasks
                .values()
                .filter(|t| {
                    matches!(t.status, TaskStatus::WaitingForDependencies | TaskStatus::Queued | TaskStatus::Pending)
                        && t.dependencies.contains(&current)
                })
                .map(|t| t.id)
                .collect();

            for id in dependents {
                let task = inner.tasks.get_mut(&id).expect("dependent exists");
                task.add_log_entry(format!("dependency {} did not complete", current));
                task.mark_cancelled();
                warn!(task_id = %id, dependency = %current, "cancelled: dependency did not complete");
                Self::notify_subscribers(inner, id);
                frontier.push(id);
            }
        }
    }

    /// Periodic dependency promotion, also invoked by the checker job
    pub async fn promote_ready(&self) {
        let mut inner = self.shared.state.lock().await;

        let waiting: Vec<TaskId> = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::WaitingForDependencies)
            .map(|t| t.id)
            .collect();

        let mut promoted = false;
        for id in waiting {
            let ready = {
                let task = &inner.tasks[&id];
                Self::dependencies_complete(&inner, task)
            };
            if ready {
                let task = inner.tasks.get_mut(&id).expect("waiting task exists");
                task.mark_queued();
                task.add_log_entry("dependencies satisfied");
                let entry = self.entry_for(task);
                inner.ready.push(entry);
                promoted = true;
            }
        }

        if promoted {
            self.publish_counts(&inner);
            drop(inner);
            self.shared.notify.notify_waiters();
        }
    }

    // === Cancellation ===

    /// Cancel a task. Running tasks are interrupted cooperatively; queued
    /// and waiting tasks are removed outright. Terminal tasks are a no-op
    /// returning false.
    pub async fn cancel(&self, id: TaskId) -> Result<bool, QueueError> {
        let mut inner = self.shared.state.lock().await;
        let task = inner.tasks.get_mut(&id).ok_or(QueueError::NotFound(id))?;

        if task.is_terminal() {
            return Ok(false);
        }

        match task.status {
            TaskStatus::Running => {
                task.mark_cancelled();
                if let Some(cancel) = inner.running.get(&id) {
                    cancel.cancel();
                }
                info!(task_id = %id, "running task cancelled");
            }
            TaskStatus::Pending
            | TaskStatus::Queued
            | TaskStatus::WaitingForDependencies
            | TaskStatus::Paused
            | TaskStatus::Failed => {
                task.mark_cancelled();
                info!(task_id = %id, "task cancelled");
            }
            _ => return Ok(false),
        }

        Self::notify_subscribers(&mut inner, id);
        Self::cascade_dependents(&mut inner, id);
        self.publish_counts(&inner);
        Ok(true)
    }

    // === Inspection ===

    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        self.shared.state.lock().await.tasks.get(&id).cloned()
    }

    /// Recent tasks, newest first, optionally filtered by status
    pub async fn list_tasks(&self, limit: usize, status: Option<TaskStatus>) -> Vec<Task> {
        let inner = self.shared.state.lock().await;
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.truncate(limit);
        tasks
    }

    pub async fn running_count(&self) -> usize {
        self.shared.state.lock().await.running.len()
    }

    pub async fn statistics(&self) -> QueueStatistics {
        let inner = self.shared.state.lock().await;
        let mut stats = QueueStatistics {
            total: inner.tasks.len(),
            ..Default::default()
        };
        for task in inner.tasks.values() {
            match task.status {
                TaskStatus::Pending | TaskStatus::Queued => stats.pending += 1,
                TaskStatus::WaitingForDependencies => stats.waiting += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Paused => stats.paused += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
                TaskStatus::TimedOut => stats.timed_out += 1,
            }
        }
        stats
    }

    /// Subscribe to a task's terminal state. Resolves immediately for tasks
    /// that are already terminal.
    pub async fn subscribe(&self, id: TaskId) -> Result<oneshot::Receiver<Task>, QueueError> {
        let mut inner = self.shared.state.lock().await;
        let task = inner.tasks.get(&id).ok_or(QueueError::NotFound(id))?;

        let (tx, rx) = oneshot::channel();
        if task.is_terminal() {
            let _ = tx.send(task.clone());
        } else {
            inner.subscribers.entry(id).or_default().push(tx);
        }
        Ok(rx)
    }

    // === Cleanup ===

    /// Remove every terminal task, regardless of age. Returns count removed.
    pub async fn clear_completed(&self) -> usize {
        let mut inner = self.shared.state.lock().await;
        let before = inner.tasks.len();
        inner.tasks.retain(|_, task| !task.is_terminal());
        let removed = before - inner.tasks.len();
        self.publish_counts(&inner);
        removed
    }

    /// Remove terminal tasks strictly older than the retention window.
    /// Tasks at exactly the boundary are retained.
    pub async fn cleanup(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::minutes(self.shared.config.retention_minutes);
        let mut inner = self.shared.state.lock().await;
        let before = inner.tasks.len();
        inner
            .tasks
            .retain(|_, task| !(task.is_terminal() && task.completed_at.is_some_and(|at| at < cutoff)));
        let removed = before - inner.tasks.len();
        if removed > 0 {
            self.publish_counts(&inner);
        }
        removed
    }

    // === Persistence ===

    /// Snapshot non-terminal tasks plus the state store counters. Completed
    /// task ids ride along so restore can recognize dependencies that were
    /// already satisfied when the snapshot was taken.
    pub async fn snapshot(&self) -> QueueSnapshot {
        let inner = self.shared.state.lock().await;
        QueueSnapshot {
            tasks: inner.tasks.values().filter(|t| !t.is_terminal()).cloned().collect(),
            completed: inner
                .tasks
                .values()
                .filter(|t| t.status == TaskStatus::Completed)
                .map(|t| t.id)
                .collect(),
            state: self.shared.store.snapshot(),
        }
    }

    /// Restore from a snapshot: running tasks are re-queued, dependencies on
    /// tasks that completed before the snapshot count as satisfied, and
    /// waiting tasks whose gates are now fully met promote immediately.
    pub async fn restore(&self, snapshot: QueueSnapshot) {
        let mut inner = self.shared.state.lock().await;
        let satisfied: HashSet<TaskId> = snapshot.completed.iter().copied().collect();

        for mut task in snapshot.tasks {
            // A completed dependency is not in the snapshot's task list, so
            // the restored index could never resolve it; drop it from the
            // gate instead of leaving the dependent parked forever.
            task.dependencies.retain(|dep| !satisfied.contains(dep));

            if matches!(task.status, TaskStatus::Running | TaskStatus::Pending) {
                task.status = TaskStatus::Queued;
                task.add_log_entry("restored from snapshot, re-queued");
            }
            if task.status == TaskStatus::Queued {
                let entry = self.entry_for(&task);
                inner.ready.push(entry);
            }
            inner.tasks.insert(task.id, task);
        }

        let waiting: Vec<TaskId> = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::WaitingForDependencies)
            .map(|t| t.id)
            .collect();
        for id in waiting {
            let ready = {
                let task = &inner.tasks[&id];
                Self::dependencies_complete(&inner, task)
            };
            if ready {
                let task = inner.tasks.get_mut(&id).expect("waiting task exists");
                task.mark_queued();
                task.add_log_entry("dependencies satisfied");
                let entry = self.entry_for(task);
                inner.ready.push(entry);
            }
        }

        self.shared.store.restore(snapshot.state);
        self.publish_counts(&inner);
        drop(inner);
        self.shared.notify.notify_waiters();
    }
}
