//! The narrow submit-and-await seam handed to the planner and monitor
//!
//! Holders can submit tasks and await their terminal state, nothing more;
//! they never see the queue's internals. Completion notifications arrive
//! over a per-task oneshot channel.

use crate::domain::{Task, TaskId};

use super::{QueueError, TaskQueue};

/// Cloneable submit + subscribe-to-completion interface
#[derive(Clone)]
pub struct QueueHandle {
    queue: TaskQueue,
}

impl QueueHandle {
    pub fn new(queue: TaskQueue) -> Self {
        Self { queue }
    }

    /// Submit a task, returning its id
    pub async fn submit(&self, task: Task) -> Result<TaskId, QueueError> {
        self.queue.submit(task).await
    }

    /// Await a task's terminal state
    pub async fn await_completion(&self, id: TaskId) -> Result<Task, QueueError> {
        let rx = self.queue.subscribe(id).await?;
        rx.await.map_err(|_| QueueError::SubscriptionLost(id))
    }

    /// Submit a task and wait for it to finish
    pub async fn submit_and_wait(&self, task: Task) -> Result<Task, QueueError> {
        let id = self.submit(task).await?;
        self.await_completion(id).await
    }

    /// Fetch a task snapshot by id
    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        self.queue.get_task(id).await
    }
}
