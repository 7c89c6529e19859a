//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Autodev - autonomous developer-assistant agent
#[derive(Parser)]
#[command(
    name = "autodev",
    about = "Autonomous developer-assistant agent daemon",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Agent lifecycle and task management
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Remote tool servers
    Mcp {
        #[command(subcommand)]
        command: McpCommand,
    },

    /// Decompose a goal and optionally execute the plan
    Plan {
        /// The natural-language goal
        goal: String,

        /// Execute the plan after decomposition
        #[arg(long)]
        execute: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum AgentCommand {
    /// Run the agent in the foreground until interrupted
    Run,

    /// Show agent status and queue statistics
    Status,

    /// Submit one task, wait for it, and print the result
    Task {
        /// Task kind (e.g. SHELL_COMMAND, FILE_READ)
        #[arg(long, default_value = "SHELL_COMMAND")]
        kind: String,

        /// Human-readable description
        #[arg(long, default_value = "")]
        description: String,

        /// Command line (SHELL_COMMAND and friends)
        #[arg(long)]
        command: Option<String>,

        /// Parameter as key=value; repeatable
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Priority: critical, high, medium, low, background
        #[arg(long, default_value = "medium")]
        priority: String,
    },

    /// List recent tasks from the snapshot
    Tasks {
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Filter by status
        #[arg(long)]
        status: Option<String>,
    },

    /// Remove completed tasks from the snapshot
    Clear,

    /// Update the agent configuration file
    Config {
        /// Enable the agent
        #[arg(long, conflicts_with = "disable")]
        enable: bool,

        /// Disable the agent
        #[arg(long)]
        disable: bool,

        /// Maximum concurrent tasks
        #[arg(long = "max-tasks")]
        max_tasks: Option<usize>,

        /// Worker tick interval in milliseconds
        #[arg(long = "interval")]
        interval_ms: Option<u64>,

        /// Toggle snapshot auto-save
        #[arg(long = "auto-save")]
        auto_save: Option<bool>,
    },
}

#[derive(Debug, Subcommand)]
pub enum McpCommand {
    /// Inspect or manage the MCP configuration document
    Config {
        #[command(subcommand)]
        command: McpConfigCommand,
    },

    /// Run the initialize handshake against every enabled server
    Init,

    /// Ping all servers
    Ping,

    /// List tools across all servers
    Tools,

    /// Call a tool by name
    Call {
        /// Tool name
        name: String,

        /// JSON arguments object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Subscribe to a server's SSE stream and print events
    Sse {
        /// Server id
        server: String,
    },

    /// Open a WebSocket to a server and print incoming frames
    Ws {
        /// Server id
        server: String,
    },

    /// Show per-server connection status
    Status,

    /// Disconnect one server, or all when omitted
    Disconnect {
        /// Server id
        server: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum McpConfigCommand {
    /// Print the active configuration
    Show,

    /// Load and validate a configuration file
    Load {
        path: PathBuf,
    },

    /// Write a starter configuration
    Create {
        path: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        path: PathBuf,
    },

    /// Save the active configuration to a file
    Save {
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_agent_task_args() {
        let cli = Cli::parse_from([
            "autodev", "agent", "task", "--kind", "SHELL_COMMAND", "--command", "echo hi", "--priority", "high",
        ]);
        match cli.command {
            Command::Agent {
                command: AgentCommand::Task { kind, command, priority, .. },
            } => {
                assert_eq!(kind, "SHELL_COMMAND");
                assert_eq!(command.as_deref(), Some("echo hi"));
                assert_eq!(priority, "high");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_mcp_call_args() {
        let cli = Cli::parse_from(["autodev", "mcp", "call", "echo", "--args", r#"{"text":"x"}"#]);
        match cli.command {
            Command::Mcp {
                command: McpCommand::Call { name, args },
            } => {
                assert_eq!(name, "echo");
                assert!(args.contains("text"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_plan_args() {
        let cli = Cli::parse_from(["autodev", "plan", "build a thing", "--execute"]);
        match cli.command {
            Command::Plan { goal, execute } => {
                assert_eq!(goal, "build a thing");
                assert!(execute);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
