//! Two-step code generation: structured LM response, then write-and-run

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::domain::{Task, TaskKind, TaskResult};
use crate::llm::LanguageModel;

use super::{ExecContext, ExecError, Strategy};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const RUN_TIMEOUT: Duration = Duration::from_secs(30);

const CODEGEN_SYSTEM_PROMPT: &str = "You are a code generator. Respond with exactly these fields:\n\
    LANGUAGE: <language>\n\
    FILENAME: <file name>\n\
    DIRECTORIES: <comma-separated directories to create, or empty>\n\
    CODE:\n\
    <the code>\n\
    END_CODE\n\
    Output nothing else.";

/// Parsed structured response from the model
#[derive(Debug, Clone, Default, PartialEq)]
pub(super) struct GeneratedCode {
    pub language: String,
    pub filename: String,
    pub directories: Vec<String>,
    pub code: String,
}

/// Permissive parser for the structured code response.
///
/// Accepts the labeled `CODE:`...`END_CODE` form and fenced markdown blocks;
/// when no `LANGUAGE:` field is present the fence tag supplies the language.
pub(super) fn parse_generated(text: &str) -> Result<GeneratedCode, ExecError> {
    let mut generated = GeneratedCode::default();
    let mut code_lines: Vec<&str> = Vec::new();
    let mut in_labeled_code = false;
    let mut in_fence = false;

    for line in text.lines() {
        if in_labeled_code {
            if line.trim() == "END_CODE" {
                in_labeled_code = false;
            } else {
                code_lines.push(line);
            }
            continue;
        }

        if in_fence {
            if line.trim_start().starts_with("```") {
                in_fence = false;
            } else {
                code_lines.push(line);
            }
            continue;
        }

        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("LANGUAGE:") {
            generated.language = rest.trim().to_lowercase();
        } else if let Some(rest) = trimmed.strip_prefix("FILENAME:") {
            generated.filename = rest.trim().to_string();
        } else if let Some(rest) = trimmed.strip_prefix("DIRECTORIES:") {
            generated.directories = rest
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != "none")
                .map(str::to_string)
                .collect();
        } else if trimmed == "CODE:" {
            in_labeled_code = true;
        } else if let Some(tag) = trimmed.strip_prefix("```") {
            in_fence = true;
            let tag = tag.trim();
            if generated.language.is_empty() && !tag.is_empty() {
                generated.language = tag.to_lowercase();
            }
        }
    }

    generated.code = code_lines.join("\n");

    if generated.code.trim().is_empty() {
        return Err(ExecError::InvalidParameter(
            "model response contained no code block".to_string(),
        ));
    }
    if generated.filename.is_empty() {
        return Err(ExecError::InvalidParameter(
            "model response contained no FILENAME field".to_string(),
        ));
    }

    Ok(generated)
}

/// Interpreter candidates for a language, probed in order
fn interpreter_candidates(language: &str) -> &'static [&'static str] {
    match language {
        "python" | "py" => &["python3", "python", "py"],
        "lua" => &["lua"],
        _ => &[],
    }
}

/// Probe candidates with a short version check, returning the first that answers
async fn probe_interpreter(candidates: &[&'static str]) -> Option<&'static str> {
    for candidate in candidates {
        let probe = Command::new(candidate)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
            Ok(Ok(status)) if status.success() => {
                debug!(interpreter = candidate, "interpreter probe succeeded");
                return Some(candidate);
            }
            _ => continue,
        }
    }
    None
}

/// Generate code with the model, write it out, and run it when an
/// interpreter is available.
pub struct CodeGenerationStrategy {
    llm: Arc<dyn LanguageModel>,
}

impl CodeGenerationStrategy {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    async fn try_run(&self, language: &str, path: &Path, ctx: &ExecContext) -> Option<(String, i32)> {
        let interpreter = probe_interpreter(interpreter_candidates(language)).await?;

        println!("agent running generated code: {} {}", interpreter, path.display());

        let run = Command::new(interpreter)
            .arg(path)
            .current_dir(&ctx.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(RUN_TIMEOUT, run).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                Some((stdout, output.status.code().unwrap_or(-1)))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Strategy for CodeGenerationStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let prompt = task
            .param_str("prompt")
            .or_else(|| task.param_str("description"))
            .ok_or_else(|| ExecError::missing(TaskKind::CodeGeneration, "prompt"))?;

        println!("agent generating code: {}", prompt);
        ctx.cancel.check()?;

        // Step 1: structured generation
        let reply = self.llm.ask(CODEGEN_SYSTEM_PROMPT, prompt, &[]).await?;
        let generated = parse_generated(&reply.text)?;

        // Step 2: materialize on disk
        let mut result = TaskResult::success(String::new());
        for dir in &generated.directories {
            let full = ctx.resolve(dir);
            tokio::fs::create_dir_all(&full).await?;
        }

        let file_path = ctx.resolve(&generated.filename);
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file_path, &generated.code).await?;
        result.files_created.push(generated.filename.clone());

        println!("agent wrote generated {} code to {}", generated.language, file_path.display());

        result.artifacts.insert("language".to_string(), generated.language.clone().into());
        result.artifacts.insert("filename".to_string(), generated.filename.clone().into());

        // Optionally execute when an interpreter answers the probe
        ctx.cancel.check()?;
        match self.try_run(&generated.language, &file_path, ctx).await {
            Some((stdout, exit_code)) => {
                result.output = stdout;
                result.exit_code = Some(exit_code);
                result.success = exit_code == 0;
                if exit_code != 0 {
                    result.error = Some(format!("generated code exited with status {}", exit_code));
                }
            }
            None => {
                result.output = format!("generated {} ({} bytes), not executed", generated.filename, generated.code.len());
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLm;
    use tempfile::tempdir;

    #[test]
    fn test_parse_labeled_form() {
        let text = "LANGUAGE: python\nFILENAME: hello.py\nDIRECTORIES: src, tests\nCODE:\nprint('hi')\nEND_CODE";
        let generated = parse_generated(text).unwrap();

        assert_eq!(generated.language, "python");
        assert_eq!(generated.filename, "hello.py");
        assert_eq!(generated.directories, vec!["src", "tests"]);
        assert_eq!(generated.code, "print('hi')");
    }

    #[test]
    fn test_parse_fenced_form_takes_language_from_tag() {
        let text = "FILENAME: main.lua\n```lua\nprint('hi')\n```";
        let generated = parse_generated(text).unwrap();

        assert_eq!(generated.language, "lua");
        assert_eq!(generated.code, "print('hi')");
    }

    #[test]
    fn test_parse_explicit_language_wins_over_fence_tag() {
        let text = "LANGUAGE: python\nFILENAME: x.py\n```\nprint(1)\n```";
        let generated = parse_generated(text).unwrap();
        assert_eq!(generated.language, "python");
    }

    #[test]
    fn test_parse_empty_directories() {
        let text = "LANGUAGE: python\nFILENAME: x.py\nDIRECTORIES:\nCODE:\npass\nEND_CODE";
        let generated = parse_generated(text).unwrap();
        assert!(generated.directories.is_empty());
    }

    #[test]
    fn test_parse_missing_code_rejected() {
        let text = "LANGUAGE: python\nFILENAME: x.py";
        assert!(parse_generated(text).is_err());
    }

    #[test]
    fn test_parse_missing_filename_rejected() {
        let text = "LANGUAGE: python\nCODE:\npass\nEND_CODE";
        assert!(parse_generated(text).is_err());
    }

    #[tokio::test]
    async fn test_codegen_writes_file_and_directories() {
        let temp = tempdir().unwrap();
        let reply = "LANGUAGE: text\nFILENAME: out/gen.txt\nDIRECTORIES: extra\nCODE:\nhello generated\nEND_CODE";
        let strategy = CodeGenerationStrategy::new(Arc::new(MockLm::new([reply])));
        let ctx = ExecContext::new(temp.path());

        let task = Task::new(TaskKind::CodeGeneration, "gen").with_parameter("prompt", "make a file");
        let result = strategy.execute(&task, &ctx).await.unwrap();

        assert!(result.success);
        assert_eq!(result.files_created, vec!["out/gen.txt"]);
        assert!(temp.path().join("extra").is_dir());
        assert_eq!(
            std::fs::read_to_string(temp.path().join("out/gen.txt")).unwrap(),
            "hello generated"
        );
        // No interpreter for "text", so the file is written but not run
        assert!(result.exit_code.is_none());
    }

    #[tokio::test]
    async fn test_codegen_missing_prompt() {
        let strategy = CodeGenerationStrategy::new(Arc::new(MockLm::default()));
        let ctx = ExecContext::new(".");
        let task = Task::new(TaskKind::CodeGeneration, "gen");

        let err = strategy.execute(&task, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::MissingParameter { name: "prompt", .. }));
    }

    #[test]
    fn test_interpreter_candidates() {
        assert_eq!(interpreter_candidates("python"), &["python3", "python", "py"]);
        assert_eq!(interpreter_candidates("lua"), &["lua"]);
        assert!(interpreter_candidates("rust").is_empty());
    }
}
