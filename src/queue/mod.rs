//! Task queue and dispatcher
//!
//! A priority + dependency scheduler with bounded concurrency. Submitted
//! tasks are gated on their dependencies, ordered by priority then age in a
//! binary heap, and drained by `max_concurrent` worker tasks that dispatch
//! to the executor registry. Failures are retried with linear backoff,
//! cancellation is cooperative, and terminal tasks are retained for half an
//! hour for inspection before the periodic sweep removes them.

mod config;
mod core;
mod entry;
mod handle;
mod persistence;

pub use config::QueueConfig;
pub use core::{QueueStatistics, TaskQueue};
pub use entry::ReadyEntry;
pub use handle::QueueHandle;
pub use persistence::QueueSnapshot;

use thiserror::Error;

use crate::domain::TaskId;

/// Errors surfaced by queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Task validation failed: {0}")]
    Validation(String),

    #[error("Command blocked: {0}")]
    CommandBlocked(String),

    #[error("Task {0} already exists in the queue")]
    Duplicate(TaskId),

    #[error("Unknown task: {0}")]
    NotFound(TaskId),

    #[error("Dependency {dependency} of task {task} is not known to the queue")]
    DependencyUnmet { task: TaskId, dependency: TaskId },

    #[error("Dependency cycle involving task {0}")]
    DependencyCycle(TaskId),

    #[error("Queue is not running")]
    NotRunning,

    #[error("Completion subscription dropped for task {0}")]
    SubscriptionLost(TaskId),

    #[error("Snapshot I/O error: {0}")]
    Snapshot(String),
}
