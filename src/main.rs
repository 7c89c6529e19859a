//! Autodev - autonomous developer-assistant agent
//!
//! CLI entry point: agent lifecycle, one-shot task submission, remote tool
//! management, and goal planning.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tracing::info;

use autodev::agent::Agent;
use autodev::cli::{AgentCommand, Cli, Command, McpCommand, McpConfigCommand};
use autodev::config::AgentConfig;
use autodev::domain::{Priority, Task, TaskKind, TaskStatus};
use autodev::llm::UnconfiguredLm;
use autodev::mcp::{McpConfig, McpManager};
use autodev::planner::{PlannerConfig, ReactPlanner};
use autodev::queue::QueueSnapshot;

fn setup_logging(cli_level: Option<&str>, config_level: Option<&str>) {
    let level = match cli_level.or(config_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some("INFO") | None => tracing::Level::INFO,
        Some(other) => {
            eprintln!("Warning: unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Configuration problems are exit code 1
    let config = match AgentConfig::load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "configuration error:".red().bold(), e);
            return ExitCode::from(1);
        }
    };

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref());

    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli, config: AgentConfig) -> Result<ExitCode> {
    match cli.command {
        Command::Agent { command } => run_agent_command(command, config, cli.config).await,
        Command::Mcp { command } => run_mcp_command(command, &config).await,
        Command::Plan { goal, execute } => run_plan(&goal, execute, config).await,
    }
}

/// Build the remote tool manager from the configured document, or an empty
/// manager when none is configured.
fn build_mcp(config: &AgentConfig) -> Result<Arc<McpManager>> {
    match &config.mcp_config_path {
        Some(path) => {
            let mcp_config = McpConfig::load(path).map_err(|e| eyre!("{}", e))?;
            Ok(Arc::new(McpManager::new(mcp_config).map_err(|e| eyre!("{}", e))?))
        }
        None => Ok(Arc::new(McpManager::disabled())),
    }
}

fn build_agent(config: AgentConfig) -> Result<Agent> {
    let mcp = build_mcp(&config)?;
    Ok(Agent::new(config, Arc::new(UnconfiguredLm), mcp))
}

async fn run_agent_command(
    command: AgentCommand,
    config: AgentConfig,
    config_path: Option<std::path::PathBuf>,
) -> Result<ExitCode> {
    match command {
        AgentCommand::Run => {
            if !config.enabled {
                eprintln!("agent is disabled (AGENT_MODE or config); refusing to run");
                return Ok(ExitCode::from(1));
            }

            let mut agent = build_agent(config)?;
            agent.start().await.context("agent startup failed")?;
            println!("{} agent running, press Ctrl-C to stop", "autodev:".cyan().bold());

            tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
            info!("interrupt received, shutting down");
            agent.stop().await;

            Ok(ExitCode::from(130))
        }

        AgentCommand::Status => {
            println!("{}", "agent: not running in this process".dimmed());
            match QueueSnapshot::load(&config.snapshot_path) {
                Ok(snapshot) => {
                    println!("snapshot: {} live tasks", snapshot.tasks.len());
                    println!("total tasks executed: {}", snapshot.state.total_tasks_executed);
                }
                Err(_) => println!("snapshot: none at {}", config.snapshot_path.display()),
            }
            Ok(ExitCode::SUCCESS)
        }

        AgentCommand::Task {
            kind,
            description,
            command,
            params,
            priority,
        } => {
            let kind: TaskKind = kind.parse().map_err(|e: String| eyre!(e))?;
            let priority: Priority = priority.parse().map_err(|e: String| eyre!(e))?;

            let mut task = Task::with_priority(kind, format!("cli {}", kind), priority).with_description(description);
            if let Some(command) = command {
                task.parameters.insert("command".to_string(), command.into());
            }
            for pair in params {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| eyre!("--param must be KEY=VALUE, got '{}'", pair))?;
                task.parameters.insert(key.to_string(), value.into());
            }

            let mut agent = build_agent(config)?;
            agent.start().await.context("agent startup failed")?;

            let id = agent.submit_task(task).await.map_err(|e| eyre!("{}", e))?;
            println!("{} {}", "task submitted:".cyan().bold(), id);

            let rx = agent.queue().subscribe(id).await.map_err(|e| eyre!("{}", e))?;
            let done = rx.await.map_err(|_| eyre!("queue dropped the completion channel"))?;

            print_task(&done, true);
            agent.stop().await;

            Ok(if done.status == TaskStatus::Completed {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }

        AgentCommand::Tasks { limit, status } => {
            let status = status.map(|s| s.parse::<TaskStatus>()).transpose().map_err(|e| eyre!(e))?;
            match QueueSnapshot::load(&config.snapshot_path) {
                Ok(snapshot) => {
                    let mut tasks = snapshot.tasks;
                    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                    let shown = tasks
                        .iter()
                        .filter(|t| status.is_none_or(|s| t.status == s))
                        .take(limit);
                    for task in shown {
                        print_task(task, false);
                    }
                }
                Err(_) => println!("no snapshot at {}", config.snapshot_path.display()),
            }
            Ok(ExitCode::SUCCESS)
        }

        AgentCommand::Clear => {
            match QueueSnapshot::load(&config.snapshot_path) {
                Ok(mut snapshot) => {
                    let before = snapshot.tasks.len();
                    snapshot.tasks.retain(|t| !t.is_terminal());
                    let removed = before - snapshot.tasks.len();
                    snapshot.save(&config.snapshot_path).map_err(|e| eyre!("{}", e))?;
                    println!("removed {} completed tasks", removed);
                }
                Err(_) => println!("no snapshot at {}", config.snapshot_path.display()),
            }
            Ok(ExitCode::SUCCESS)
        }

        AgentCommand::Config {
            enable,
            disable,
            max_tasks,
            interval_ms,
            auto_save,
        } => {
            let mut updated = config;
            if enable {
                updated.enabled = true;
            }
            if disable {
                updated.enabled = false;
            }
            if let Some(max_tasks) = max_tasks {
                updated.queue.max_concurrent = max_tasks;
            }
            if let Some(interval_ms) = interval_ms {
                updated.queue.worker_tick_ms = interval_ms;
            }
            if let Some(auto_save) = auto_save {
                updated.auto_save = auto_save;
            }

            let path = config_path.unwrap_or_else(|| std::path::PathBuf::from(".autodev.yml"));
            updated.save(&path)?;
            println!("configuration written to {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_mcp_command(command: McpCommand, config: &AgentConfig) -> Result<ExitCode> {
    match command {
        McpCommand::Config { command } => run_mcp_config_command(command, config),

        McpCommand::Init => {
            let mcp = build_mcp(config)?;
            let initialized = mcp.initialize().await;
            println!("initialized {}/{} servers", initialized, mcp.server_count());
            Ok(ExitCode::SUCCESS)
        }

        McpCommand::Ping => {
            let mcp = build_mcp(config)?;
            mcp.initialize().await;
            let alive = mcp.ping_all().await;
            println!("ping: {}", if alive { "ok".green() } else { "no server answered".red() });
            Ok(if alive { ExitCode::SUCCESS } else { ExitCode::from(2) })
        }

        McpCommand::Tools => {
            let mcp = build_mcp(config)?;
            mcp.initialize().await;
            let tools = mcp.list_all_tools().await;
            if tools.is_empty() {
                println!("no tools advertised");
            }
            for tool in tools {
                println!(
                    "{} [{}] {}",
                    tool.name.bold(),
                    tool.server_id.as_deref().unwrap_or("?"),
                    tool.description
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        McpCommand::Call { name, args } => {
            let arguments: serde_json::Value = serde_json::from_str(&args).context("--args must be a JSON object")?;
            let mcp = build_mcp(config)?;
            mcp.initialize().await;
            let result = mcp.call_tool(&name, arguments).await.map_err(|e| eyre!("{}", e))?;
            println!("{}", result.text());
            Ok(if result.is_error { ExitCode::from(2) } else { ExitCode::SUCCESS })
        }

        McpCommand::Sse { server } => {
            let mcp = build_mcp(config)?;
            mcp.initialize().await;
            let mut connection = mcp.open_sse(&server).await.map_err(|e| eyre!("{}", e))?;
            println!("{} SSE stream open, press Ctrl-C to stop", "autodev:".cyan().bold());

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = connection.next_event() => match event {
                        Some(event) => println!("[{}] {} {}", event.id, event.event, event.data),
                        None => break,
                    },
                }
            }
            connection.close().await;
            Ok(ExitCode::SUCCESS)
        }

        McpCommand::Ws { server } => {
            let mcp = build_mcp(config)?;
            mcp.initialize().await;
            let mut connection = mcp.open_ws(&server).await.map_err(|e| eyre!("{}", e))?;
            println!("{} websocket open, press Ctrl-C to stop", "autodev:".cyan().bold());

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    message = connection.next_message() => match message {
                        Some(message) => println!("{}", message),
                        None => break,
                    },
                }
            }
            connection.close().await;
            Ok(ExitCode::SUCCESS)
        }

        McpCommand::Status => {
            let mcp = build_mcp(config)?;
            mcp.initialize().await;
            for (id, connected) in mcp.server_status().await {
                println!("{}: {}", id, if connected { "connected".green() } else { "unavailable".red() });
            }
            Ok(ExitCode::SUCCESS)
        }

        McpCommand::Disconnect { server } => {
            let mcp = build_mcp(config)?;
            match server {
                Some(id) => mcp.disconnect(&id).await.map_err(|e| eyre!("{}", e))?,
                None => mcp.disconnect_all().await,
            }
            println!("disconnected");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_mcp_config_command(command: McpConfigCommand, config: &AgentConfig) -> Result<ExitCode> {
    match command {
        McpConfigCommand::Show => {
            let path = config
                .mcp_config_path
                .as_ref()
                .ok_or_else(|| eyre!("no mcp-config path configured"))?;
            let mcp_config = McpConfig::load(path).map_err(|e| eyre!("{}", e))?;
            println!("{}", mcp_config.to_json().map_err(|e| eyre!("{}", e))?);
            Ok(ExitCode::SUCCESS)
        }
        McpConfigCommand::Load { path } | McpConfigCommand::Validate { path } => {
            let mcp_config = McpConfig::load(&path).map_err(|e| eyre!("{}", e))?;
            println!(
                "{} valid, {} servers ({} enabled)",
                path.display(),
                mcp_config.servers.len(),
                mcp_config.servers_by_priority().len()
            );
            Ok(ExitCode::SUCCESS)
        }
        McpConfigCommand::Create { path } => {
            let example = McpConfig::example();
            std::fs::write(&path, example.to_json().map_err(|e| eyre!("{}", e))?)
                .context("failed to write config")?;
            println!("starter configuration written to {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        McpConfigCommand::Save { path } => {
            let source = config
                .mcp_config_path
                .as_ref()
                .ok_or_else(|| eyre!("no mcp-config path configured"))?;
            let mcp_config = McpConfig::load(source).map_err(|e| eyre!("{}", e))?;
            std::fs::write(&path, mcp_config.to_json().map_err(|e| eyre!("{}", e))?)
                .context("failed to write config")?;
            println!("configuration saved to {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_plan(goal: &str, execute: bool, config: AgentConfig) -> Result<ExitCode> {
    let max_cycles = config.planner_max_cycles;
    let mut agent = build_agent(config)?;
    agent.start().await.context("agent startup failed")?;

    let planner = ReactPlanner::new(Arc::new(UnconfiguredLm), agent.queue_handle(), PlannerConfig { max_cycles });

    let outcome = async {
        let mut plan = planner.create_plan(goal).await.map_err(|e| eyre!("{}", e))?;
        if !execute {
            return Ok(ExitCode::SUCCESS);
        }
        let result = planner.execute_plan(&mut plan).await.map_err(|e| eyre!("{}", e))?;
        Ok::<ExitCode, eyre::Report>(if result.success { ExitCode::SUCCESS } else { ExitCode::from(2) })
    }
    .await;

    agent.stop().await;
    outcome
}

fn print_task(task: &Task, with_log: bool) {
    let status = match task.status {
        TaskStatus::Completed => task.status.to_string().green(),
        TaskStatus::Failed | TaskStatus::TimedOut => task.status.to_string().red(),
        TaskStatus::Cancelled => task.status.to_string().yellow(),
        _ => task.status.to_string().normal(),
    };

    println!("{} {} [{}] {} ({})", task.id, status, task.kind, task.name, task.priority);

    if let Some(result) = &task.result {
        if !result.output.trim().is_empty() {
            println!("{}", result.output.trim_end());
        }
        if let Some(error) = &result.error {
            eprintln!("{} {}", "error:".red(), error);
        }
    }

    if with_log {
        for line in &task.execution_log {
            println!("  {}", line.dimmed());
        }
    }
}
