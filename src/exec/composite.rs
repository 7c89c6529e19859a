//! Composite tasks: an embedded sequence of subtask descriptors run inline

use futures::future::BoxFuture;
use serde_json::Value;

use crate::domain::{Task, TaskKind, TaskResult};

use super::{ExecContext, ExecError, TaskExecutor};

/// Execute the embedded subtask descriptors in order, joining their outputs
/// with `\n---\n`. Subtasks inherit the parent's context and cancel token;
/// the first failure aborts the sequence.
pub(super) async fn run_composite(
    executor: &TaskExecutor,
    task: &Task,
    ctx: &ExecContext,
) -> Result<TaskResult, ExecError> {
    let descriptors = task
        .parameters
        .get("subtasks")
        .and_then(Value::as_array)
        .filter(|list| !list.is_empty())
        .ok_or_else(|| ExecError::missing(TaskKind::Composite, "subtasks"))?;

    println!("agent executing composite task '{}' ({} subtasks)", task.name, descriptors.len());

    let mut outputs = Vec::with_capacity(descriptors.len());
    let mut combined = TaskResult::success(String::new());

    for (index, descriptor) in descriptors.iter().enumerate() {
        ctx.cancel.check()?;

        let subtask = subtask_from_descriptor(task, index, descriptor)?;

        // Recursing through the executor keeps timing and dispatch uniform;
        // boxing as a dyn future breaks the async recursion cycle.
        let execution: BoxFuture<'_, Result<TaskResult, ExecError>> = Box::pin(executor.execute(&subtask, ctx));
        let result = execution.await?;

        outputs.push(result.output.clone());
        combined.files_created.extend(result.files_created);
        combined.files_modified.extend(result.files_modified);
        combined.commands_executed.extend(result.commands_executed);
        combined.metrics.extend(result.metrics);
    }

    combined.output = outputs.join("\n---\n");
    Ok(combined)
}

/// Build a child task from one descriptor: `{ "kind": ..., "name"?, "parameters"? }`
fn subtask_from_descriptor(parent: &Task, index: usize, descriptor: &Value) -> Result<Task, ExecError> {
    let kind_name = descriptor
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| ExecError::InvalidParameter(format!("subtask {} is missing 'kind'", index)))?;

    let kind: TaskKind = kind_name
        .parse()
        .map_err(|e: String| ExecError::InvalidParameter(format!("subtask {}: {}", index, e)))?;

    let name = descriptor
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} subtask {}", parent.name, index + 1));

    let mut subtask = Task::with_priority(kind, name, parent.priority);
    subtask.context = parent.context.clone();
    subtask.context.parent_task_id = Some(parent.id);

    if let Some(params) = descriptor.get("parameters").and_then(Value::as_object) {
        for (key, value) in params {
            subtask.parameters.insert(key.clone(), value.clone());
        }
    }

    Ok(subtask)
}
