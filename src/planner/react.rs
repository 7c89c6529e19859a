//! The Reason -> Act -> Observe -> Reflect execution loop

use std::sync::Arc;

use colored::Colorize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{Task, TaskKind};
use crate::llm::LanguageModel;
use crate::queue::QueueHandle;

use super::parser::{parse_action_decision, parse_memory_updates, parse_subtasks, parse_verdict, ActionDecision};
use super::plan::{Plan, PlanResult, Subtask, SubtaskStatus};
use super::prompts;
use super::PlanError;

/// Planner tunables
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Maximum ReAct cycles per subtask before it is marked failed
    pub max_cycles: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self { max_cycles: 5 }
    }
}

/// Drives goals through decomposition and ReAct execution. Holds only the
/// narrow queue handle, never the queue itself.
pub struct ReactPlanner {
    llm: Arc<dyn LanguageModel>,
    queue: QueueHandle,
    config: PlannerConfig,
}

impl ReactPlanner {
    pub fn new(llm: Arc<dyn LanguageModel>, queue: QueueHandle, config: PlannerConfig) -> Self {
        Self { llm, queue, config }
    }

    /// Phase 1 + 2: decompose the goal into subtasks, then ask for an
    /// execution strategy.
    pub async fn create_plan(&self, goal: &str) -> Result<Plan, PlanError> {
        println!("{} {}", "planning:".cyan().bold(), goal);

        let reply = self.llm.ask(prompts::DECOMPOSE_SYSTEM, &prompts::decompose_user(goal), &[]).await?;
        let subtasks = parse_subtasks(&reply.text)?;

        let mut plan = Plan::new(goal, subtasks);
        // Surface dependency problems before any execution
        plan.execution_order()?;

        println!("{} {} subtasks", "decomposed:".cyan().bold(), plan.subtasks.len());
        for subtask in &plan.subtasks {
            println!("  {}. {} (deps: {:?})", subtask.ordinal, subtask.description, subtask.dependencies);
        }

        let strategy = self.llm.ask(prompts::STRATEGY_SYSTEM, &prompts::strategy_user(&plan), &[]).await?;
        plan.strategy = strategy.text;
        println!("{}\n{}", "strategy:".cyan().bold(), plan.strategy);

        info!(plan_id = %plan.id, subtasks = plan.subtasks.len(), "plan created");
        Ok(plan)
    }

    /// Phase 3: execute every subtask in dependency order.
    pub async fn execute_plan(&self, plan: &mut Plan) -> Result<PlanResult, PlanError> {
        let order = plan.execution_order()?;
        let mut observations = Vec::new();

        for ordinal in order {
            let blocked: Vec<usize> = {
                let subtask = plan.subtask(ordinal).expect("ordinal from execution_order");
                subtask
                    .dependencies
                    .iter()
                    .copied()
                    .filter(|dep| plan.subtask(*dep).map(|d| d.status != SubtaskStatus::Succeeded).unwrap_or(true))
                    .collect()
            };

            if !blocked.is_empty() {
                warn!(subtask = ordinal, ?blocked, "skipping subtask, dependencies did not succeed");
                println!(
                    "{} subtask {} skipped (dependencies {:?} did not succeed)",
                    "react:".yellow().bold(),
                    ordinal,
                    blocked
                );
                if let Some(subtask) = plan.subtask_mut(ordinal) {
                    subtask.status = SubtaskStatus::Failed;
                }
                continue;
            }

            let succeeded = self.run_subtask(plan, ordinal, &mut observations).await?;
            if let Some(subtask) = plan.subtask_mut(ordinal) {
                subtask.status = if succeeded { SubtaskStatus::Succeeded } else { SubtaskStatus::Failed };
            }
        }

        let succeeded = plan.subtasks.iter().filter(|s| s.status == SubtaskStatus::Succeeded).count();
        let failed = plan.subtasks.len() - succeeded;
        let result = PlanResult {
            success: failed == 0,
            succeeded,
            failed,
            observations,
        };

        println!(
            "{} {} ({} succeeded, {} failed)",
            "plan finished:".cyan().bold(),
            if result.success { "SUCCESS".green().to_string() } else { "FAILURE".red().to_string() },
            result.succeeded,
            result.failed
        );
        info!(plan_id = %plan.id, success = result.success, succeeded, failed, "plan finished");
        Ok(result)
    }

    /// Run ReAct cycles for one subtask until reflection says YES or the
    /// cycle budget runs out.
    async fn run_subtask(&self, plan: &mut Plan, ordinal: usize, observations: &mut Vec<String>) -> Result<bool, PlanError> {
        for cycle in 1..=self.config.max_cycles {
            let subtask = plan.subtask(ordinal).expect("subtask exists").clone();
            println!(
                "{} subtask {} cycle {}/{}: {}",
                "react:".cyan().bold(),
                ordinal,
                cycle,
                self.config.max_cycles,
                subtask.description
            );

            // Reason
            let reasoning = self.llm.ask(prompts::REASON_SYSTEM, &prompts::reason_user(plan, &subtask), &[]).await?;
            println!("  {} {}", "reason:".blue(), first_line(&reasoning.text));

            // Act
            let decision_reply = self.llm.ask(prompts::ACT_SYSTEM, &prompts::act_user(&subtask, &reasoning.text), &[]).await?;
            let decision = match parse_action_decision(&decision_reply.text) {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(subtask = ordinal, cycle, error = %e, "unparseable action decision, burning cycle");
                    continue;
                }
            };
            println!("  {} {} - {}", "act:".blue(), decision.action_type, decision.description);

            let task = match self.task_from_decision(&decision, &subtask) {
                Ok(task) => task,
                Err(e) => {
                    warn!(subtask = ordinal, cycle, error = %e, "decision maps to no valid task, burning cycle");
                    continue;
                }
            };

            let done = self.queue.submit_and_wait(task).await?;
            debug!(subtask = ordinal, task_id = %done.id, status = %done.status, "action task finished");

            // Observe
            let observation = self.llm.ask(prompts::OBSERVE_SYSTEM, &prompts::observe_user(&done), &[]).await?;
            println!("  {} {}", "observe:".blue(), first_line(&observation.text));
            observations.push(observation.text.clone());

            // Reflect
            let verdict = self.llm.ask(prompts::REFLECT_SYSTEM, &prompts::reflect_user(&subtask, &observation.text), &[]).await?;
            plan.merge_memory(parse_memory_updates(&verdict.text));

            if parse_verdict(&verdict.text) {
                println!("  {} subtask {} succeeded", "reflect:".green(), ordinal);
                return Ok(true);
            }
            println!("  {} subtask {} not done, replanning", "reflect:".yellow(), ordinal);
        }

        warn!(subtask = ordinal, max_cycles = self.config.max_cycles, "subtask failed after cycle budget");
        Ok(false)
    }

    /// Map an action decision to a concrete task, filling in fallbacks from
    /// the subtask (file path, content, first suggested command).
    fn task_from_decision(&self, decision: &ActionDecision, subtask: &Subtask) -> Result<Task, PlanError> {
        let kind: TaskKind = decision
            .action_type
            .parse()
            .map_err(|e: String| PlanError::Parse(e))?;

        let name = if decision.description.is_empty() {
            format!("subtask {} action", subtask.ordinal)
        } else {
            decision.description.clone()
        };

        let mut task = Task::with_priority(kind, name, subtask.priority)
            .with_description(decision.expected_outcome.clone());
        task.parameters.extend(decision.parameters.clone());

        // Subtask-level hints fill gaps the decision left open
        if !task.parameters.contains_key("file_path") {
            if let Some(path) = &subtask.file_path {
                task.parameters.insert("file_path".to_string(), Value::String(path.clone()));
            }
        }
        if kind == TaskKind::FileWrite && !task.parameters.contains_key("content") {
            if let Some(content) = &subtask.file_content {
                task.parameters.insert("content".to_string(), Value::String(content.clone()));
            }
        }
        if kind == TaskKind::ShellCommand && !task.parameters.contains_key("command") {
            if let Some(command) = subtask.commands.first() {
                task.parameters.insert("command".to_string(), Value::String(command.clone()));
            }
        }

        Ok(task)
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}
