//! Deterministic parsers for model output
//!
//! The model is asked for exact-prefix markers; these parsers scan line by
//! line and default missing sections to empty rather than failing.

use std::collections::HashMap;

use serde_json::Value;

use crate::domain::Priority;

use super::plan::Subtask;
use super::PlanError;

/// Sections recognized inside a SUBTASK block
const MARKERS: [&str; 7] = [
    "Description:",
    "Expected Outcome:",
    "Priority:",
    "Complexity:",
    "Dependencies:",
    "File Path:",
    "File Content:",
];

fn is_marker_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("SUBTASK_")
        || trimmed.starts_with("Commands:")
        || MARKERS.iter().any(|m| trimmed.starts_with(m))
}

/// Parse `SUBTASK_N` blocks out of a decomposition reply.
///
/// `File Content` and `Commands` accumulate following lines until the next
/// recognized marker; everything else is single-line.
pub fn parse_subtasks(text: &str) -> Result<Vec<Subtask>, PlanError> {
    let mut subtasks: Vec<Subtask> = Vec::new();
    let mut current: Option<Subtask> = None;
    // Which multi-line section is accumulating: "content" or "commands"
    let mut accumulating: Option<&'static str> = None;

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some(rest) = trimmed.strip_prefix("SUBTASK_") {
            if let Some(done) = current.take() {
                subtasks.push(finish(done));
            }
            accumulating = None;
            let ordinal: usize = rest
                .trim_end_matches(':')
                .trim()
                .parse()
                .map_err(|_| PlanError::Parse(format!("bad subtask header '{}'", trimmed)))?;
            current = Some(Subtask::new(ordinal));
            continue;
        }

        let Some(subtask) = current.as_mut() else { continue };

        if let Some(section) = accumulating {
            if is_marker_line(line) {
                accumulating = None;
                // fall through to marker handling below
            } else {
                match section {
                    "content" => {
                        let content = subtask.file_content.get_or_insert_with(String::new);
                        if !content.is_empty() {
                            content.push('\n');
                        }
                        content.push_str(line);
                        continue;
                    }
                    _ => {
                        let command = trimmed.trim_start_matches('-').trim();
                        if !command.is_empty() {
                            subtask.commands.push(command.to_string());
                        }
                        continue;
                    }
                }
            }
        }

        if let Some(rest) = trimmed.strip_prefix("Description:") {
            subtask.description = rest.trim().to_string();
        } else if let Some(rest) = trimmed.strip_prefix("Expected Outcome:") {
            subtask.expected_outcome = rest.trim().to_string();
        } else if let Some(rest) = trimmed.strip_prefix("Priority:") {
            subtask.priority = rest.trim().parse().unwrap_or(Priority::Medium);
        } else if let Some(rest) = trimmed.strip_prefix("Complexity:") {
            subtask.complexity = rest.trim().to_lowercase();
        } else if let Some(rest) = trimmed.strip_prefix("Dependencies:") {
            subtask.dependencies = parse_dependency_list(rest);
        } else if let Some(rest) = trimmed.strip_prefix("File Path:") {
            let rest = rest.trim();
            if !rest.is_empty() && rest != "none" {
                subtask.file_path = Some(rest.to_string());
            }
        } else if let Some(rest) = trimmed.strip_prefix("File Content:") {
            let rest = rest.trim();
            if !rest.is_empty() {
                subtask.file_content = Some(rest.to_string());
            }
            accumulating = Some("content");
        } else if let Some(rest) = trimmed.strip_prefix("Commands:") {
            let rest = rest.trim();
            if !rest.is_empty() {
                subtask.commands.push(rest.to_string());
            }
            accumulating = Some("commands");
        }
    }

    if let Some(done) = current.take() {
        subtasks.push(finish(done));
    }

    if subtasks.is_empty() {
        return Err(PlanError::EmptyPlan);
    }
    Ok(subtasks)
}

/// Normalize a completed block: accumulated content keeps interior newlines
/// but sheds the trailing blank lines between subtask blocks.
fn finish(mut subtask: Subtask) -> Subtask {
    if let Some(content) = &mut subtask.file_content {
        let trimmed = content.trim_end().to_string();
        subtask.file_content = if trimmed.is_empty() { None } else { Some(trimmed) };
    }
    subtask
}

/// `"none"`, `""`, `"1, 3"`, or `"SUBTASK_2, SUBTASK_4"`
fn parse_dependency_list(raw: &str) -> Vec<usize> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty() && !token.eq_ignore_ascii_case("none"))
        .filter_map(|token| token.trim_start_matches("SUBTASK_").trim().parse().ok())
        .collect()
}

/// A structured action decision from the Act phase
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDecision {
    pub action_type: String,
    pub description: String,
    pub parameters: HashMap<String, Value>,
    pub expected_outcome: String,
}

/// Parse the Act-phase decision: `ACTION_TYPE`, `ACTION_DESCRIPTION`,
/// `PARAMETERS` (JSON object or `key=value; key=value`), `EXPECTED_OUTCOME`.
pub fn parse_action_decision(text: &str) -> Result<ActionDecision, PlanError> {
    let mut action_type = String::new();
    let mut description = String::new();
    let mut parameters = HashMap::new();
    let mut expected_outcome = String::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("ACTION_TYPE:") {
            action_type = rest.trim().to_uppercase();
        } else if let Some(rest) = trimmed.strip_prefix("ACTION_DESCRIPTION:") {
            description = rest.trim().to_string();
        } else if let Some(rest) = trimmed.strip_prefix("PARAMETERS:") {
            parameters = parse_parameters(rest.trim());
        } else if let Some(rest) = trimmed.strip_prefix("EXPECTED_OUTCOME:") {
            expected_outcome = rest.trim().to_string();
        }
    }

    if action_type.is_empty() {
        return Err(PlanError::Parse("decision is missing ACTION_TYPE".to_string()));
    }

    Ok(ActionDecision {
        action_type,
        description,
        parameters,
        expected_outcome,
    })
}

/// A JSON object when it parses as one, otherwise `key=value` pairs split on
/// `;` (or `,` when no semicolon is present).
fn parse_parameters(raw: &str) -> HashMap<String, Value> {
    if raw.starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) {
            return map.into_iter().collect();
        }
    }

    let separator = if raw.contains(';') { ';' } else { ',' };
    raw.split(separator)
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), Value::String(value.trim().to_string())))
        })
        .collect()
}

/// Parse the Reflect-phase verdict: the first standalone YES or NO token
pub fn parse_verdict(text: &str) -> bool {
    for token in text.split(|c: char| !c.is_ascii_alphabetic()) {
        match token.to_ascii_uppercase().as_str() {
            "YES" => return true,
            "NO" => return false,
            _ => {}
        }
    }
    false
}

/// Collect `MEMORY: key=value` lines from a reply
pub fn parse_memory_updates(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("MEMORY:"))
        .filter_map(|rest| {
            let (key, value) = rest.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}
