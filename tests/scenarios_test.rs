//! End-to-end scenarios through the agent façade and the remote tool client

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

use autodev::{
    Agent, AgentConfig, McpConfig, McpManager, MockLm, Task, TaskKind, TaskStatus,
};

fn test_agent() -> Agent {
    let mut config = AgentConfig::default();
    config.auto_save = false;
    Agent::new(config, Arc::new(MockLm::default()), Arc::new(McpManager::disabled()))
}

async fn wait_terminal(agent: &Agent, id: autodev::TaskId) -> Task {
    let rx = agent.queue().subscribe(id).await.unwrap();
    tokio::time::timeout(Duration::from_secs(30), rx)
        .await
        .expect("task should terminate")
        .expect("subscription should resolve")
}

#[tokio::test]
async fn scenario_shell_echo_completes_with_output() {
    let mut agent = test_agent();
    agent.start().await.unwrap();

    let task = Task::new(TaskKind::ShellCommand, "echo hello").with_parameter("command", "echo hello");
    let id = agent.submit_task(task).await.unwrap();
    let done = wait_terminal(&agent, id).await;

    assert_eq!(done.status, TaskStatus::Completed);
    let result = done.result.unwrap();
    assert!(result.output.contains("hello"));
    assert_eq!(result.exit_code, Some(0));

    agent.stop().await;
}

#[tokio::test]
async fn scenario_destructive_command_is_blocked_on_submission() {
    let mut agent = test_agent();
    agent.start().await.unwrap();

    let task = Task::new(TaskKind::ShellCommand, "wipe").with_parameter("command", "rm -rf /");
    let err = agent.submit_task(task).await.unwrap_err();

    assert!(err.to_string().contains("Command blocked"));
    // No state machine entry was created for the rejected task
    assert_eq!(agent.queue().statistics().await.total, 0);

    agent.stop().await;
}

#[tokio::test]
async fn scenario_dependent_task_waits_for_dependency() {
    let mut agent = test_agent();
    agent.start().await.unwrap();

    let a = Task::new(TaskKind::ShellCommand, "slow dependency").with_parameter("command", "sleep 0.5 && echo a");
    let a_id = agent.submit_task(a).await.unwrap();

    let b = Task::new(TaskKind::ShellCommand, "dependent")
        .with_parameter("command", "echo b")
        .with_dependency(a_id);
    let b_id = agent.submit_task(b).await.unwrap();

    let b_done = wait_terminal(&agent, b_id).await;
    let a_done = agent.queue().get_task(a_id).await.unwrap();

    assert_eq!(a_done.status, TaskStatus::Completed);
    assert_eq!(b_done.status, TaskStatus::Completed);
    assert!(
        b_done.started_at.unwrap() >= a_done.completed_at.unwrap(),
        "dependent started before its dependency completed"
    );

    agent.stop().await;
}

#[tokio::test]
async fn scenario_file_write_creates_file_and_records_it() {
    let temp = tempfile::tempdir().unwrap();
    let mut agent = test_agent();
    agent.start().await.unwrap();

    let mut task = Task::new(TaskKind::FileWrite, "write hello")
        .with_parameter("file_path", "out/hello.txt")
        .with_parameter("content", "hi");
    task.context.working_directory = Some(temp.path().display().to_string());

    let id = agent.submit_task(task).await.unwrap();
    let done = wait_terminal(&agent, id).await;

    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.result.unwrap().files_created, vec!["out/hello.txt"]);
    assert_eq!(std::fs::read_to_string(temp.path().join("out/hello.txt")).unwrap(), "hi");

    agent.stop().await;
}

// === Minimal in-process JSON-RPC tool server ===

async fn handle_connection(mut socket: tokio::net::TcpStream) {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
        return;
    }
    let path = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).await.unwrap_or(0) == 0 {
            break;
        }
        let header = header.trim_end().to_ascii_lowercase();
        if header.is_empty() {
            break;
        }
        if let Some(value) = header.strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        let _ = reader.read_exact(&mut body).await;
    }
    let request: serde_json::Value = serde_json::from_slice(&body).unwrap_or_else(|_| json!({}));
    let id = request.get("id").cloned().unwrap_or(json!(null));

    let result = match path.as_str() {
        "/mcp/initialize" => json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "test-server", "version": "0.0.1" }
        }),
        "/mcp/tools/list" => json!({
            "tools": [ { "name": "echo", "description": "Echo a string back" } ]
        }),
        "/mcp/tools/call" => {
            let text = request["params"]["arguments"]["text"].as_str().unwrap_or("");
            json!({
                "content": [ { "type": "text", "text": format!("Echo: {}", text) } ],
                "isError": false
            })
        }
        _ => json!({}),
    };

    let response = json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string();
    let payload = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        response.len(),
        response
    );
    let _ = writer.write_all(payload.as_bytes()).await;
    let _ = writer.shutdown().await;
}

async fn spawn_tool_server() -> (String, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    tokio::spawn(handle_connection(socket));
                }
                Err(_) => break,
            }
        }
    });

    (format!("http://{}", addr), handle)
}

fn manager_for(url: &str) -> McpManager {
    let config: McpConfig = serde_json::from_value(json!({
        "client": { "name": "autodev-test", "version": "0.0.1" },
        "servers": {
            "local": { "url": url, "name": "Local test server", "enabled": true, "priority": 1 }
        }
    }))
    .unwrap();
    McpManager::new(config).unwrap()
}

#[tokio::test]
async fn scenario_remote_tools_list_and_call() {
    let (url, server) = spawn_tool_server().await;
    let manager = manager_for(&url);

    assert_eq!(manager.initialize().await, 1);

    let tools = manager.list_all_tools().await;
    assert!(tools.iter().any(|t| t.name == "echo"), "tools/list should contain echo");
    assert_eq!(tools[0].server_id.as_deref(), Some("local"));

    let result = manager.call_tool("echo", json!({ "text": "x" })).await.unwrap();
    assert!(!result.is_error);
    assert_eq!(result.text(), "Echo: x");

    server.abort();
}

#[tokio::test]
async fn scenario_remote_tool_call_through_task() {
    let (url, server) = spawn_tool_server().await;

    let mut config = AgentConfig::default();
    config.auto_save = false;
    let mut agent = Agent::new(config, Arc::new(MockLm::default()), Arc::new(manager_for(&url)));
    agent.start().await.unwrap();

    let task = Task::new(TaskKind::RemoteToolCall, "remote echo")
        .with_parameter("tool_name", "echo")
        .with_parameter("arguments", json!({ "text": "through-task" }));
    let id = agent.submit_task(task).await.unwrap();
    let done = wait_terminal(&agent, id).await;

    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.result.unwrap().output, "Echo: through-task");

    agent.stop().await;
    server.abort();
}

#[tokio::test]
async fn scenario_ping_and_status() {
    let (url, server) = spawn_tool_server().await;
    let manager = manager_for(&url);
    manager.initialize().await;

    assert!(manager.ping_all().await);
    let status = manager.server_status().await;
    assert_eq!(status.get("local"), Some(&true));

    manager.disconnect_all().await;
    let status = manager.server_status().await;
    assert_eq!(status.get("local"), Some(&false));

    server.abort();
}
