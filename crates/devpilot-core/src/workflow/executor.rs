//! Step executor — assembles the instruction payload for one step and
//! dispatches it to the agent capability with the step's timeout and retry
//! policy. Errors never escape: they end up on the returned `StepResult`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::models::{StepResult, StepStatus, WorkflowContext, WorkflowStep};
use crate::workflow::capability::{
    classify, AgentCapability, InstructionPayload, InvocationStrategy, PriorStepSummary,
    StepExecutionError,
};
use crate::workflow::specialist::SpecialistCatalog;

/// Run-level facts copied into every payload; owned so it can move into a task.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub workflow_id: String,
    pub workflow_name: String,
    pub execution_id: String,
    pub session_id: String,
    pub project: Option<String>,
}

impl DispatchContext {
    pub fn from_run(ctx: &WorkflowContext, workflow_name: &str) -> Self {
        Self {
            workflow_id: ctx.workflow_id.clone(),
            workflow_name: workflow_name.to_string(),
            execution_id: ctx.execution_id.clone(),
            session_id: ctx.session_id.clone(),
            project: ctx
                .variables
                .get("project")
                .and_then(|p| p.as_str())
                .map(str::to_string),
        }
    }
}

/// A finished step plus the shared variables it asked to write.
#[derive(Debug, Clone)]
pub struct StepDispatch {
    pub result: StepResult,
    pub variables: Map<String, Value>,
}

pub struct StepExecutor {
    agent: Arc<dyn AgentCapability>,
    specialists: Arc<SpecialistCatalog>,
    config: EngineConfig,
}

impl StepExecutor {
    pub fn new(
        agent: Arc<dyn AgentCapability>,
        specialists: Arc<SpecialistCatalog>,
        config: EngineConfig,
    ) -> Self {
        Self {
            agent,
            specialists,
            config,
        }
    }

    /// Summaries of the step's direct dependencies that completed.
    pub fn prior_summaries(&self, step: &WorkflowStep, ctx: &WorkflowContext) -> Vec<PriorStepSummary> {
        step.depends_on
            .iter()
            .filter_map(|dep| {
                let result = ctx.step_results.get(dep)?;
                let output = ctx.completed_output(dep)?;
                Some(PriorStepSummary {
                    step_id: dep.clone(),
                    agent_id: result.agent_id.clone(),
                    summary: summarize(output, self.config.prior_summary_chars),
                })
            })
            .collect()
    }

    pub async fn dispatch(
        &self,
        step: &WorkflowStep,
        input: Value,
        run: &DispatchContext,
        prior_steps: Vec<PriorStepSummary>,
    ) -> StepDispatch {
        let mut result = StepResult::started(&step.id, &step.agent, input.clone());
        let specialist = self.specialists.resolve(&step.agent);

        let environment = match classify(&step.agent).strategy() {
            InvocationStrategy::Direct => None,
            InvocationStrategy::PreparedEnvironment(runtime) => {
                match self.agent.prepare_environment(runtime).await {
                    Ok(env) => Some(env),
                    Err(e) => {
                        tracing::warn!(
                            execution_id = %run.execution_id,
                            step_id = %step.id,
                            "[StepExecutor] Environment preparation failed: {}",
                            e
                        );
                        result.error = Some(StepExecutionError::Environment(e).to_string());
                        return StepDispatch {
                            result: result.finish(StepStatus::Failed),
                            variables: Map::new(),
                        };
                    }
                }
            }
        };

        let timeout_ms = step.timeout.unwrap_or(self.config.default_step_timeout_ms);
        let retry_delay = step.retry_delay.unwrap_or(self.config.default_retry_delay_ms);
        let max_attempts = step.retries.unwrap_or(0) + 1;

        for attempt in 1..=max_attempts {
            result.retry_count = attempt - 1;
            let payload = InstructionPayload {
                role: specialist.role.clone(),
                system_prompt: specialist.system_prompt.clone(),
                role_reminder: specialist.role_reminder.clone(),
                workflow_id: run.workflow_id.clone(),
                workflow_name: run.workflow_name.clone(),
                execution_id: run.execution_id.clone(),
                session_id: run.session_id.clone(),
                step_id: step.id.clone(),
                step_name: step.name.clone(),
                project: run.project.clone(),
                input: input.clone(),
                prior_steps: prior_steps.clone(),
                environment: environment.clone(),
                attempt,
            };

            tracing::debug!(
                execution_id = %run.execution_id,
                step_id = %step.id,
                agent = %step.agent,
                attempt,
                "[StepExecutor] Dispatching step"
            );

            let invocation = tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                self.agent.invoke(&step.agent, payload),
            )
            .await;

            let error = match invocation {
                Err(_) => {
                    // A timed-out attempt ends the dispatch; no local retries follow.
                    tracing::warn!(
                        execution_id = %run.execution_id,
                        step_id = %step.id,
                        "[StepExecutor] Step timed out after {} ms",
                        timeout_ms
                    );
                    result.error = Some(StepExecutionError::Timeout(timeout_ms).to_string());
                    return StepDispatch {
                        result: result.finish(StepStatus::Failed),
                        variables: Map::new(),
                    };
                }
                Ok(Ok(outcome)) if outcome.success => {
                    result.tokens_used += outcome.tokens_used;
                    result.output = Some(outcome.output);
                    result.error = None;
                    return StepDispatch {
                        result: result.finish(StepStatus::Completed),
                        variables: outcome.variables,
                    };
                }
                Ok(Ok(outcome)) => {
                    result.tokens_used += outcome.tokens_used;
                    StepExecutionError::Invocation(
                        outcome
                            .error
                            .unwrap_or_else(|| "agent reported failure".to_string()),
                    )
                }
                Ok(Err(e)) => StepExecutionError::Invocation(e),
            };

            result.error = Some(error.to_string());
            if attempt < max_attempts {
                tracing::warn!(
                    execution_id = %run.execution_id,
                    step_id = %step.id,
                    attempt,
                    "[StepExecutor] Attempt failed, retrying in {} ms: {}",
                    retry_delay,
                    error
                );
                tokio::time::sleep(Duration::from_millis(retry_delay)).await;
            }
        }

        StepDispatch {
            result: result.finish(StepStatus::Failed),
            variables: Map::new(),
        }
    }
}

/// Compact one-line rendering of an output, cut at `max_chars` characters.
pub fn summarize(output: &Value, max_chars: usize) -> String {
    let text = match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}
