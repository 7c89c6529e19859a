//! ReAct planner
//!
//! Turns a natural-language goal into an ordered set of dependent subtasks
//! (decomposition), then drives each subtask through Reason -> Act ->
//! Observe -> Reflect cycles, synthesizing tasks and submitting them through
//! the queue handle. A shared working memory accumulates observations
//! across cycles.

mod parser;
mod plan;
mod prompts;
mod react;

pub use parser::{ActionDecision, parse_action_decision, parse_memory_updates, parse_subtasks, parse_verdict};
pub use plan::{Plan, PlanResult, Subtask, SubtaskStatus};
pub use react::{PlannerConfig, ReactPlanner};

use thiserror::Error;

use crate::llm::LmError;
use crate::queue::QueueError;

/// Errors surfaced by planning and plan execution
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Language model error: {0}")]
    Lm(#[from] LmError),

    #[error("Decomposition parse error: {0}")]
    Parse(String),

    #[error("Decomposition produced no subtasks")]
    EmptyPlan,

    #[error("Subtask {subtask} depends on unknown subtask {dependency}")]
    UnknownDependency { subtask: usize, dependency: usize },

    #[error("Subtask dependencies contain a cycle")]
    CyclicDependencies,

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}
