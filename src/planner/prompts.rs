//! Prompt templates for the planner phases

use crate::domain::Task;

use super::plan::{Plan, Subtask};

pub const DECOMPOSE_SYSTEM: &str = "\
You are a software architect decomposing a development goal into executable subtasks.

Produce 8-12 subtasks. For each, output exactly this block:

SUBTASK_N:
Description: <what to do>
Expected Outcome: <testable completion criterion>
Priority: <CRITICAL|HIGH|MEDIUM|LOW|BACKGROUND>
Complexity: <LOW|MEDIUM|HIGH>
Dependencies: <comma-separated subtask numbers, or none>
File Path: <path when the subtask writes one file, else omit>
File Content: <the content, when known, else omit>
Commands: <one command per line prefixed with -, when applicable, else omit>

Rules:
- Number blocks SUBTASK_1 through SUBTASK_N in order
- Dependencies must reference earlier subtasks only, no cycles
- Each subtask should be independently executable
- Output only the blocks, nothing else";

pub const STRATEGY_SYSTEM: &str = "\
You review a set of subtasks before execution. Describe, in free text:
1. The execution order and why
2. The main risks
3. How to mitigate each risk
Keep it under 300 words.";

pub const REASON_SYSTEM: &str = "\
You are the reasoning step of an execution loop. Given the goal, working
memory, and the current subtask, state concisely what should be done next
and what to watch out for.";

pub const ACT_SYSTEM: &str = "\
You are the acting step of an execution loop. Decide the single next action
and output exactly:

ACTION_TYPE: <FILE_READ|FILE_WRITE|FILE_COPY|FILE_DELETE|DIRECTORY_SCAN|SHELL_COMMAND|SCRIPT_EXECUTION|AI_ANALYSIS|CODE_GENERATION|TEXT_PROCESSING|REMOTE_TOOL_CALL|LOG_ANALYSIS>
ACTION_DESCRIPTION: <one line>
PARAMETERS: <JSON object, e.g. {\"command\": \"ls\"} or {\"file_path\": \"a.txt\", \"content\": \"...\"}>
EXPECTED_OUTCOME: <one line>

Output only these four lines.";

pub const OBSERVE_SYSTEM: &str = "\
You are the observation step of an execution loop. Summarize the task result
below in at most three sentences: what happened, whether it looks correct,
and anything surprising.";

pub const REFLECT_SYSTEM: &str = "\
You are the reflection step of an execution loop. Answer whether the subtask
succeeded. Start your reply with YES or NO, then one sentence of reasoning.
Optionally record facts worth remembering as lines of the form
MEMORY: key=value";

pub fn decompose_user(goal: &str) -> String {
    format!("Decompose this goal into subtasks:\n\n{}", goal)
}

pub fn strategy_user(plan: &Plan) -> String {
    let blocks: Vec<String> = plan
        .subtasks
        .iter()
        .map(|s| format!("SUBTASK_{}: {} (deps: {:?})", s.ordinal, s.description, s.dependencies))
        .collect();
    format!("Goal: {}\n\nSubtasks:\n{}", plan.goal, blocks.join("\n"))
}

pub fn reason_user(plan: &Plan, subtask: &Subtask) -> String {
    format!(
        "Goal: {}\n\nWorking memory:\n{}\n\nCurrent subtask ({}): {}\nExpected outcome: {}\n\nWhat should be done next?",
        plan.goal,
        plan.memory_digest(),
        subtask.ordinal,
        subtask.description,
        subtask.expected_outcome,
    )
}

pub fn act_user(subtask: &Subtask, reasoning: &str) -> String {
    let mut prompt = format!(
        "Subtask: {}\nExpected outcome: {}\n\nReasoning so far:\n{}",
        subtask.description, subtask.expected_outcome, reasoning
    );
    if let Some(path) = &subtask.file_path {
        prompt.push_str(&format!("\n\nKnown file path: {}", path));
    }
    if !subtask.commands.is_empty() {
        prompt.push_str(&format!("\nSuggested commands: {}", subtask.commands.join("; ")));
    }
    prompt.push_str("\n\nDecide the next action.");
    prompt
}

pub fn observe_user(task: &Task) -> String {
    let result = task.result.as_ref();
    format!(
        "Task: {} ({})\nStatus: {}\nExit code: {}\nOutput:\n{}\nArtifacts: {}",
        task.name,
        task.kind,
        task.status,
        result
            .and_then(|r| r.exit_code)
            .map(|c| c.to_string())
            .unwrap_or_else(|| "n/a".to_string()),
        result.map(|r| r.output.as_str()).unwrap_or(""),
        result
            .map(|r| serde_json::to_string(&r.artifacts).unwrap_or_default())
            .unwrap_or_default(),
    )
}

pub fn reflect_user(subtask: &Subtask, observation: &str) -> String {
    format!(
        "Subtask: {}\nExpected outcome: {}\n\nObservation:\n{}\n\nHas the subtask succeeded? YES/NO",
        subtask.description, subtask.expected_outcome, observation
    )
}
