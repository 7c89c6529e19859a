//! Autodev - autonomous developer-assistant agent
//!
//! An agent core that accepts high-level goals, decomposes them into plans,
//! and executes heterogeneous tasks through a prioritized concurrent
//! executor:
//!
//! - [`domain`] - the task model (kinds, priorities, lifecycle, results)
//! - [`state`] - process-wide key/value store and counters
//! - [`exec`] - one executor strategy per task kind
//! - [`queue`] - priority + dependency scheduler with bounded concurrency
//! - [`mcp`] - JSON-RPC 2.0 remote tool client (HTTP, SSE, WebSocket)
//! - [`monitor`] - long-lived triggers that synthesize tasks
//! - [`planner`] - ReAct loop from goal to executed subtasks
//! - [`agent`] - the façade composing everything
//!
//! The chat UI, the language-model provider manager, and the reference
//! remote-tool server are external collaborators; the core consumes them
//! through the [`llm::LanguageModel`] trait and the wire protocol in
//! [`mcp::protocol`].

pub mod agent;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exec;
pub mod llm;
pub mod mcp;
pub mod monitor;
pub mod planner;
pub mod queue;
pub mod state;

pub use agent::{Agent, AgentStatus};
pub use config::AgentConfig;
pub use domain::{Priority, Task, TaskContext, TaskId, TaskKind, TaskResult, TaskStatus, Trigger, TriggerType};
pub use exec::{CancelToken, ExecContext, ExecDeps, ExecError, ProcessRegistry, Strategy, TaskExecutor};
pub use llm::{Exchange, LanguageModel, LmError, LmReply, LmUsage, MockLm, UnconfiguredLm};
pub use mcp::{McpConfig, McpError, McpManager, McpRequest, McpResponse, ToolCallResult, ToolContent};
pub use monitor::{Monitor, MonitorConfig, MonitorError};
pub use planner::{Plan, PlanError, PlanResult, PlannerConfig, ReactPlanner, Subtask, SubtaskStatus};
pub use queue::{QueueConfig, QueueError, QueueHandle, QueueSnapshot, QueueStatistics, TaskQueue};
pub use state::{StateSnapshot, StateStore};
