//! Language-model-backed strategies: analysis, text processing, decisions

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Task, TaskKind, TaskResult};
use crate::llm::LanguageModel;

use super::{ExecContext, ExecError, Strategy};

/// System prompt per analysis type
fn analysis_system_prompt(analysis_type: &str) -> &'static str {
    match analysis_type {
        "code" => {
            "You are a senior engineer reviewing code. Assess structure, correctness, \
             and maintainability. Point at specific lines where possible."
        }
        "security" => {
            "You are a security analyst. Identify vulnerabilities, unsafe patterns, \
             and exposure of secrets. Rank findings by severity."
        }
        "performance" => {
            "You are a performance engineer. Identify hot paths, wasteful allocations, \
             and algorithmic issues. Suggest concrete improvements."
        }
        "documentation" => {
            "You are a technical writer. Produce clear, accurate documentation for \
             the provided content."
        }
        _ => "You are a helpful analyst. Analyze the provided content and report your findings concisely.",
    }
}

/// Run an analysis prompt over the provided content
pub struct AiAnalysisStrategy {
    llm: Arc<dyn LanguageModel>,
}

impl AiAnalysisStrategy {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Strategy for AiAnalysisStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let content = task
            .param_str("content")
            .ok_or_else(|| ExecError::missing(TaskKind::AiAnalysis, "content"))?;
        let analysis_type = task.param_str("analysis_type").unwrap_or("general");

        println!("agent running {} analysis ({} chars)", analysis_type, content.len());
        ctx.cancel.check()?;

        let reply = self.llm.ask(analysis_system_prompt(analysis_type), content, &[]).await?;

        let mut result = TaskResult::success(reply.text);
        result.artifacts.insert("analysis_type".to_string(), analysis_type.into());
        if let Some(tokens) = reply.usage.output_tokens {
            result.metrics.insert("output_tokens".to_string(), tokens as f64);
        }
        Ok(result)
    }
}

/// Transform text according to an instruction
pub struct TextProcessingStrategy {
    llm: Arc<dyn LanguageModel>,
}

impl TextProcessingStrategy {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Strategy for TextProcessingStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let content = task
            .param_str("content")
            .ok_or_else(|| ExecError::missing(TaskKind::TextProcessing, "content"))?;
        let instruction = task.param_str("instruction").unwrap_or("Summarize the following text.");

        println!("agent processing text ({} chars)", content.len());
        ctx.cancel.check()?;

        let reply = self
            .llm
            .ask(
                "You transform text exactly as instructed. Output only the transformed text.",
                &format!("{}\n\n---\n\n{}", instruction, content),
                &[],
            )
            .await?;

        Ok(TaskResult::success(reply.text))
    }
}

/// Ask the model to choose among options and justify the choice
pub struct DecisionStrategy {
    llm: Arc<dyn LanguageModel>,
}

impl DecisionStrategy {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Strategy for DecisionStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let question = task
            .param_str("question")
            .ok_or_else(|| ExecError::missing(TaskKind::Decision, "question"))?;
        let options = task.param_str("options").unwrap_or("");

        println!("agent making decision: {}", question);
        ctx.cancel.check()?;

        let user = if options.is_empty() {
            question.to_string()
        } else {
            format!("{}\n\nOptions:\n{}", question, options)
        };

        let reply = self
            .llm
            .ask(
                "You are a decision assistant. State the chosen option on the first \
                 line, then a short justification.",
                &user,
                &[],
            )
            .await?;

        Ok(TaskResult::success(reply.text))
    }
}
