//! Executor strategies - one per task kind
//!
//! The [`TaskExecutor`] is a dispatch table from [`TaskKind`] to a
//! [`Strategy`]. Strategies validate their parameters, narrate the side
//! effect they are about to perform on stdout (the product's observable
//! output), honor the cancellation token at suspension points, and return a
//! [`TaskResult`]. Wall time is measured centrally by the executor and
//! stamped on every result.

mod ai;
mod codegen;
mod composite;
mod denylist;
mod file;
mod process;
mod remote;
mod script;
mod shell;
mod system;

pub use denylist::command_blocked_reason;
pub use process::ProcessRegistry;
pub use shell::shell_invocation;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::debug;

use crate::domain::{Task, TaskKind, TaskResult};
use crate::llm::{LanguageModel, LmError};
use crate::mcp::{McpError, McpManager};
use crate::state::StateStore;

/// Errors raised by executor strategies
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{kind} task requires parameter '{name}'")]
    MissingParameter { kind: TaskKind, name: &'static str },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Command blocked: {0}")]
    CommandBlocked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Language model error: {0}")]
    Lm(#[from] LmError),

    #[error("Remote tool error: {0}")]
    Remote(#[from] McpError),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("No strategy registered for kind {0}")]
    Unsupported(TaskKind),
}

impl ExecError {
    fn missing(kind: TaskKind, name: &'static str) -> Self {
        Self::MissingParameter { kind, name }
    }

    /// Validation-class errors are surfaced synchronously and never retried
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExecError::MissingParameter { .. }
                | ExecError::InvalidParameter(_)
                | ExecError::CommandBlocked(_)
                | ExecError::Unsupported(_)
        )
    }
}

/// Cooperative cancellation signal threaded through the execution context
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; wakes everything awaiting [`cancelled`]
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.inner.notify.notified().await;
        }
    }

    /// Bail out early when already cancelled
    pub fn check(&self) -> Result<(), ExecError> {
        if self.is_cancelled() { Err(ExecError::Cancelled) } else { Ok(()) }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken").field("cancelled", &self.is_cancelled()).finish()
    }
}

/// Per-execution context handed to a strategy
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub cancel: CancelToken,
    pub working_dir: PathBuf,
}

impl ExecContext {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            cancel: CancelToken::new(),
            working_dir: working_dir.into(),
        }
    }

    /// Context for a task, resolving the working directory from the task's
    /// own context or the process cwd.
    pub fn for_task(task: &Task) -> Self {
        let working_dir = task
            .context
            .working_directory
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        Self::new(working_dir)
    }

    /// Resolve a possibly-relative path against the working directory
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = PathBuf::from(path);
        if p.is_absolute() { p } else { self.working_dir.join(p) }
    }
}

/// An executor strategy: the function that runs a task of one kind
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError>;
}

/// Collaborators injected into strategy construction
#[derive(Clone)]
pub struct ExecDeps {
    pub llm: Arc<dyn LanguageModel>,
    pub mcp: Arc<McpManager>,
    pub state: Arc<StateStore>,
    pub processes: Arc<ProcessRegistry>,
}

/// Dispatch table from task kind to strategy
pub struct TaskExecutor {
    strategies: HashMap<TaskKind, Arc<dyn Strategy>>,
    custom: RwLock<HashMap<String, Arc<dyn Strategy>>>,
}

impl TaskExecutor {
    /// Build the full registry; every kind in the closed set gets a strategy.
    pub fn new(deps: ExecDeps) -> Self {
        let mut strategies: HashMap<TaskKind, Arc<dyn Strategy>> = HashMap::new();

        strategies.insert(TaskKind::FileRead, Arc::new(file::FileReadStrategy));
        strategies.insert(TaskKind::FileWrite, Arc::new(file::FileWriteStrategy));
        strategies.insert(TaskKind::FileCopy, Arc::new(file::FileCopyStrategy));
        strategies.insert(TaskKind::FileDelete, Arc::new(file::FileDeleteStrategy));
        strategies.insert(TaskKind::DirectoryScan, Arc::new(file::DirectoryScanStrategy));

        strategies.insert(TaskKind::ShellCommand, Arc::new(shell::ShellCommandStrategy));
        strategies.insert(TaskKind::ScriptExecution, Arc::new(script::ScriptExecutionStrategy));
        strategies.insert(
            TaskKind::BackgroundProcess,
            Arc::new(process::BackgroundProcessStrategy::new(Arc::clone(&deps.processes))),
        );

        strategies.insert(TaskKind::AiAnalysis, Arc::new(ai::AiAnalysisStrategy::new(Arc::clone(&deps.llm))));
        strategies.insert(
            TaskKind::TextProcessing,
            Arc::new(ai::TextProcessingStrategy::new(Arc::clone(&deps.llm))),
        );
        strategies.insert(TaskKind::Decision, Arc::new(ai::DecisionStrategy::new(Arc::clone(&deps.llm))));
        strategies.insert(
            TaskKind::CodeGeneration,
            Arc::new(codegen::CodeGenerationStrategy::new(Arc::clone(&deps.llm))),
        );

        strategies.insert(
            TaskKind::RemoteToolCall,
            Arc::new(remote::RemoteToolCallStrategy::new(Arc::clone(&deps.mcp))),
        );
        strategies.insert(
            TaskKind::RemoteResourceAccess,
            Arc::new(remote::RemoteResourceAccessStrategy::new(Arc::clone(&deps.mcp))),
        );
        strategies.insert(
            TaskKind::RemoteServerAdmin,
            Arc::new(remote::RemoteServerAdminStrategy::new(Arc::clone(&deps.mcp))),
        );

        strategies.insert(TaskKind::System, Arc::new(shell::SystemTaskStrategy));
        strategies.insert(
            TaskKind::SystemMonitoring,
            Arc::new(system::SystemMonitoringStrategy::new(Arc::clone(&deps.state))),
        );
        strategies.insert(
            TaskKind::HealthCheck,
            Arc::new(system::HealthCheckStrategy::new(
                Arc::clone(&deps.llm),
                Arc::clone(&deps.mcp),
            )),
        );
        strategies.insert(TaskKind::LogAnalysis, Arc::new(system::LogAnalysisStrategy));

        Self {
            strategies,
            custom: RwLock::new(HashMap::new()),
        }
    }

    /// Register a user-supplied strategy for CUSTOM tasks under an
    /// `action_class` identifier.
    pub fn register_custom(&self, action_class: impl Into<String>, strategy: Arc<dyn Strategy>) {
        self.custom
            .write()
            .expect("custom registry poisoned")
            .insert(action_class.into(), strategy);
    }

    fn custom_strategy(&self, action_class: &str) -> Option<Arc<dyn Strategy>> {
        self.custom.read().expect("custom registry poisoned").get(action_class).cloned()
    }

    /// Execute a task via its kind's strategy, stamping wall time on the
    /// result. Composite tasks recurse through this entry point.
    ///
    /// Returns a boxed future (rather than `async fn`) so the recursive call
    /// through [`composite::run_composite`] doesn't create a cyclic `Send`
    /// inference that the compiler can't resolve.
    pub fn execute<'a>(&'a self, task: &'a Task, ctx: &'a ExecContext) -> futures::future::BoxFuture<'a, Result<TaskResult, ExecError>> {
        Box::pin(async move {
            let started = Instant::now();
            ctx.cancel.check()?;

            debug!(task_id = %task.id, kind = %task.kind, "executing task");

            let outcome = match task.kind {
                TaskKind::Composite => composite::run_composite(self, task, ctx).await,
                TaskKind::Custom => self.run_custom(task, ctx).await,
                kind => match self.strategies.get(&kind) {
                    Some(strategy) => strategy.execute(task, ctx).await,
                    None => Err(ExecError::Unsupported(kind)),
                },
            };

            outcome.map(|mut result| {
                result.execution_time_ms = started.elapsed().as_millis() as u64;
                result
            })
        })
    }

    async fn run_custom(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let action_class = task
            .param_str("action_class")
            .ok_or_else(|| ExecError::missing(TaskKind::Custom, "action_class"))?
            .to_string();

        println!("agent executing custom action: {}", action_class);

        let mut result = match self.custom_strategy(&action_class) {
            Some(strategy) => strategy.execute(task, ctx).await?,
            None => TaskResult::success(format!("no handler registered for '{}'", action_class)),
        };
        result.artifacts.insert("action_class".to_string(), action_class.into());
        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::llm::MockLm;
    use crate::mcp::McpManager;

    /// Executor with a mock LM and no remote servers, for strategy tests
    pub fn executor_with_lm(lm: MockLm) -> TaskExecutor {
        TaskExecutor::new(ExecDeps {
            llm: Arc::new(lm),
            mcp: Arc::new(McpManager::disabled()),
            state: Arc::new(StateStore::new()),
            processes: Arc::new(ProcessRegistry::new()),
        })
    }

    pub fn executor() -> TaskExecutor {
        executor_with_lm(MockLm::default())
    }
}
