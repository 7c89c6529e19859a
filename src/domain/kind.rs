//! Task kinds - the closed set of work the agent knows how to execute

use serde::{Deserialize, Serialize};

/// The kind of work a task represents.
///
/// Each kind maps to exactly one executor strategy. The set is closed so the
/// dispatch table can be checked exhaustively at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    FileRead,
    FileWrite,
    FileCopy,
    FileDelete,
    DirectoryScan,
    ShellCommand,
    ScriptExecution,
    BackgroundProcess,
    AiAnalysis,
    CodeGeneration,
    Decision,
    TextProcessing,
    RemoteToolCall,
    RemoteResourceAccess,
    RemoteServerAdmin,
    System,
    SystemMonitoring,
    LogAnalysis,
    HealthCheck,
    Composite,
    Custom,
}

impl TaskKind {
    /// All kinds, in declaration order
    pub const ALL: [TaskKind; 21] = [
        TaskKind::FileRead,
        TaskKind::FileWrite,
        TaskKind::FileCopy,
        TaskKind::FileDelete,
        TaskKind::DirectoryScan,
        TaskKind::ShellCommand,
        TaskKind::ScriptExecution,
        TaskKind::BackgroundProcess,
        TaskKind::AiAnalysis,
        TaskKind::CodeGeneration,
        TaskKind::Decision,
        TaskKind::TextProcessing,
        TaskKind::RemoteToolCall,
        TaskKind::RemoteResourceAccess,
        TaskKind::RemoteServerAdmin,
        TaskKind::System,
        TaskKind::SystemMonitoring,
        TaskKind::LogAnalysis,
        TaskKind::HealthCheck,
        TaskKind::Composite,
        TaskKind::Custom,
    ];

    /// The wire name (SCREAMING_SNAKE_CASE), matching serde and trigger actions
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::FileRead => "FILE_READ",
            TaskKind::FileWrite => "FILE_WRITE",
            TaskKind::FileCopy => "FILE_COPY",
            TaskKind::FileDelete => "FILE_DELETE",
            TaskKind::DirectoryScan => "DIRECTORY_SCAN",
            TaskKind::ShellCommand => "SHELL_COMMAND",
            TaskKind::ScriptExecution => "SCRIPT_EXECUTION",
            TaskKind::BackgroundProcess => "BACKGROUND_PROCESS",
            TaskKind::AiAnalysis => "AI_ANALYSIS",
            TaskKind::CodeGeneration => "CODE_GENERATION",
            TaskKind::Decision => "DECISION",
            TaskKind::TextProcessing => "TEXT_PROCESSING",
            TaskKind::RemoteToolCall => "REMOTE_TOOL_CALL",
            TaskKind::RemoteResourceAccess => "REMOTE_RESOURCE_ACCESS",
            TaskKind::RemoteServerAdmin => "REMOTE_SERVER_ADMIN",
            TaskKind::System => "SYSTEM",
            TaskKind::SystemMonitoring => "SYSTEM_MONITORING",
            TaskKind::LogAnalysis => "LOG_ANALYSIS",
            TaskKind::HealthCheck => "HEALTH_CHECK",
            TaskKind::Composite => "COMPOSITE",
            TaskKind::Custom => "CUSTOM",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase().replace('-', "_");
        TaskKind::ALL
            .iter()
            .find(|k| k.as_str() == upper)
            .copied()
            .ok_or_else(|| format!("Unknown task kind: {}", s))
    }
}
