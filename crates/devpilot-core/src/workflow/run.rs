//! Run controller — drives one execution wave by wave.
//!
//! ```text
//! running ──► completed | failed | cancelled | timeout
//! ```
//!
//! Each round asks the scheduler for the next wave, evaluates step
//! conditions, spawns the eligible steps as tasks and joins the whole wave
//! before applying results and the error-handling policy. Cancellation and
//! the run deadline are checked between waves; the deadline is also raced
//! against the wave join.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::models::{
    AfterRetries, ErrorStrategy, ExecutionMetrics, ExecutionStatus, StepResult, StepStatus,
    WorkflowContext, WorkflowDefinition, WorkflowResult, WorkflowStep,
};
use crate::workflow::condition;
use crate::workflow::executor::{DispatchContext, StepDispatch, StepExecutor};
use crate::workflow::resolver::resolve_input;
use crate::workflow::scheduler::{DependencyScheduler, Progress};
use crate::workflow::tracker::ExecutionTracker;

/// Why the run stopped.
struct Halt {
    status: ExecutionStatus,
    error: Option<String>,
    fallback_step: Option<String>,
}

impl Halt {
    fn new(status: ExecutionStatus, error: Option<String>) -> Self {
        Self {
            status,
            error,
            fallback_step: None,
        }
    }
}

/// Joined results of one wave, in wave order.
struct WaveOutcome<'s> {
    dispatches: Vec<StepDispatch>,
    /// Steps still running when the run deadline elapsed
    interrupted: Vec<&'s WorkflowStep>,
}

/// Mutable bookkeeping for one run beyond the context itself.
#[derive(Default)]
struct RunState {
    waves: usize,
    warnings: Vec<String>,
    /// Attempts already spent on a step by earlier run-level retries
    spent_attempts: HashMap<String, u32>,
    /// Run-level retries used per step
    run_retries: HashMap<String, u32>,
}

pub struct RunController {
    executor: Arc<StepExecutor>,
    tracker: Arc<ExecutionTracker>,
}

impl RunController {
    pub fn new(executor: Arc<StepExecutor>, tracker: Arc<ExecutionTracker>) -> Self {
        Self { executor, tracker }
    }

    /// Drive the run to a terminal status and publish the final result.
    pub async fn run(
        &self,
        def: &WorkflowDefinition,
        mut ctx: WorkflowContext,
        cancel: CancellationToken,
    ) -> WorkflowResult {
        let span = tracing::info_span!(
            "workflow_run",
            execution_id = %ctx.execution_id,
            workflow_id = %ctx.workflow_id
        );
        async move {
            tracing::info!(
                "[RunController] Starting '{}' ({} steps, strategy {})",
                def.name,
                def.steps.len(),
                def.error_handling.strategy.as_str()
            );

            let mut state = RunState::default();
            let halt = match self.drive(def, &mut ctx, &cancel, &mut state).await {
                Ok(halt) => halt,
                Err(e) => {
                    tracing::error!("[RunController] Internal error: {}", e);
                    Halt::new(ExecutionStatus::Failed, Some(format!("internal error: {}", e)))
                }
            };

            let result = finalize(def, ctx, state, halt);
            tracing::info!(
                status = result.status.as_str(),
                duration_ms = result.metrics.duration_ms,
                "[RunController] Run finished"
            );
            self.tracker.finalize(result.clone()).await;
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        def: &WorkflowDefinition,
        ctx: &mut WorkflowContext,
        cancel: &CancellationToken,
        state: &mut RunState,
    ) -> Result<Halt, String> {
        for expr in &def.conditions {
            match condition::evaluate(expr, ctx) {
                Ok(true) => {}
                Ok(false) => {
                    return Ok(Halt::new(
                        ExecutionStatus::Failed,
                        Some(format!("precondition not met: {}", expr)),
                    ))
                }
                Err(e) => {
                    return Ok(Halt::new(
                        ExecutionStatus::Failed,
                        Some(format!("invalid precondition '{}': {}", expr, e)),
                    ))
                }
            }
        }

        let policy = &def.error_handling;
        let reserved = match policy.strategy {
            ErrorStrategy::Fallback => policy.fallback_step.as_deref(),
            _ => None,
        };
        let scheduler = DependencyScheduler::new(&def.steps, reserved);
        let deadline = def
            .timeout
            .map(|ms| Instant::now() + Duration::from_millis(ms));

        loop {
            if cancel.is_cancelled() {
                tracing::info!("[RunController] Cancelled at wave boundary");
                return Ok(Halt::new(ExecutionStatus::Cancelled, None));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(run_timeout(def));
            }

            let plan = scheduler.plan(Progress::from(&*ctx));
            if plan.is_empty() {
                break;
            }

            for (step_id, reason) in plan.skipped {
                let agent = def.step(&step_id).map(|s| s.agent.as_str()).unwrap_or_default();
                self.record(ctx, StepResult::skipped(&step_id, agent, reason)).await;
            }

            let mut wave: Vec<&WorkflowStep> = Vec::new();
            for step_id in &plan.ready {
                let step = def
                    .step(step_id)
                    .ok_or_else(|| format!("scheduled unknown step '{}'", step_id))?;
                let Some(expr) = step.condition.as_deref() else {
                    wave.push(step);
                    continue;
                };
                match condition::evaluate(expr, &*ctx) {
                    Ok(true) => wave.push(step),
                    Ok(false) => {
                        let reason = format!("condition not met: {}", expr);
                        self.record(ctx, StepResult::skipped(&step.id, &step.agent, reason)).await;
                    }
                    Err(e) => {
                        let mut failed = StepResult::started(&step.id, &step.agent, serde_json::Value::Null);
                        failed.error = Some(format!("invalid condition: {}", e));
                        let failed = failed.finish(StepStatus::Failed);
                        if let Some(halt) = self.apply_failures(def, ctx, state, vec![failed]).await? {
                            return Ok(halt);
                        }
                    }
                }
            }
            if wave.is_empty() {
                continue;
            }

            state.waves += 1;
            let ids: Vec<&str> = wave.iter().map(|s| s.id.as_str()).collect();
            tracing::info!("[RunController] Wave {}: {}", state.waves, ids.join(", "));

            let dispatch_ctx = DispatchContext::from_run(ctx, &def.name);
            let outcome = self.run_wave(&wave, ctx, &dispatch_ctx, deadline).await?;
            self.apply_variable_writes(ctx, state, &outcome.dispatches);

            if !outcome.interrupted.is_empty() {
                // Deadline hit mid-wave: finished steps keep their results,
                // whatever was still in flight counts as failed.
                for dispatch in outcome.dispatches {
                    let result = with_spent_attempts(state, dispatch.result);
                    self.record(ctx, result).await;
                }
                for step in outcome.interrupted {
                    let mut result = StepResult::started(&step.id, &step.agent, serde_json::Value::Null);
                    result.error = Some("run timed out while the step was running".to_string());
                    self.record(ctx, result.finish(StepStatus::Failed)).await;
                }
                return Ok(run_timeout(def));
            }
            let dispatches = outcome.dispatches;

            let mut failures = Vec::new();
            for dispatch in dispatches {
                if dispatch.result.status == StepStatus::Failed {
                    failures.push(dispatch.result);
                } else {
                    let result = with_spent_attempts(state, dispatch.result);
                    self.record(ctx, result).await;
                }
            }
            if let Some(halt) = self.apply_failures(def, ctx, state, failures).await? {
                return Ok(halt);
            }
        }

        let stuck = scheduler.unresolved(Progress::from(&*ctx));
        if !stuck.is_empty() {
            return Err(format!("steps never became eligible: {}", stuck.join(", ")));
        }
        if ctx.failed_steps.is_empty() {
            Ok(Halt::new(ExecutionStatus::Completed, None))
        } else {
            let failed: Vec<&str> = ctx.failed_steps.iter().map(String::as_str).collect();
            Ok(Halt::new(
                ExecutionStatus::Failed,
                Some(format!("steps failed: {}", failed.join(", "))),
            ))
        }
    }

    /// Spawn every step of the wave and join them. When the run deadline
    /// elapses first, the remaining tasks are aborted and reported as
    /// interrupted.
    async fn run_wave<'s>(
        &self,
        wave: &[&'s WorkflowStep],
        ctx: &WorkflowContext,
        dispatch_ctx: &DispatchContext,
        deadline: Option<Instant>,
    ) -> Result<WaveOutcome<'s>, String> {
        let mut handles = Vec::with_capacity(wave.len());
        for step in wave {
            let input = resolve_input(step, ctx)?;
            let prior = self.executor.prior_summaries(step, ctx);
            self.tracker
                .record_step(
                    &ctx.execution_id,
                    StepResult::started(&step.id, &step.agent, input.clone()),
                )
                .await;

            let executor = self.executor.clone();
            let owned_step = (*step).clone();
            let run = dispatch_ctx.clone();
            handles.push(tokio::spawn(
                async move { executor.dispatch(&owned_step, input, &run, prior).await }
                    .in_current_span(),
            ));
        }
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let mut pending: FuturesUnordered<_> = handles
            .into_iter()
            .enumerate()
            .map(|(i, handle)| async move { (i, handle.await) })
            .collect();
        let mut finished: Vec<Option<StepDispatch>> = (0..wave.len()).map(|_| None).collect();

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, pending.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        for abort in &aborts {
                            abort.abort();
                        }
                        break;
                    }
                },
                None => pending.next().await,
            };
            let Some((i, joined)) = next else {
                break;
            };
            let step = wave[i];
            finished[i] = Some(match joined {
                Ok(dispatch) => dispatch,
                Err(e) => {
                    tracing::error!(step_id = %step.id, "[RunController] Step task aborted: {}", e);
                    let mut result = StepResult::started(&step.id, &step.agent, serde_json::Value::Null);
                    result.error = Some(format!("step task panicked: {}", e));
                    StepDispatch {
                        result: result.finish(StepStatus::Failed),
                        variables: Default::default(),
                    }
                }
            });
        }

        let mut outcome = WaveOutcome {
            dispatches: Vec::with_capacity(wave.len()),
            interrupted: Vec::new(),
        };
        for (step, slot) in wave.iter().zip(finished) {
            match slot {
                Some(dispatch) => outcome.dispatches.push(dispatch),
                None => outcome.interrupted.push(*step),
            }
        }
        Ok(outcome)
    }

    /// Merge variable writes from one wave. Keys written by more than one
    /// step are left unchanged and reported as warnings.
    fn apply_variable_writes(
        &self,
        ctx: &mut WorkflowContext,
        state: &mut RunState,
        dispatches: &[StepDispatch],
    ) {
        let mut writes: BTreeMap<&str, Vec<(&str, &serde_json::Value)>> = BTreeMap::new();
        for dispatch in dispatches
            .iter()
            .filter(|d| d.result.status == StepStatus::Completed)
        {
            for (key, value) in &dispatch.variables {
                writes
                    .entry(key.as_str())
                    .or_default()
                    .push((dispatch.result.step_id.as_str(), value));
            }
        }

        for (key, writers) in writes {
            if let [(_, value)] = writers.as_slice() {
                ctx.variables.insert(key.to_string(), (*value).clone());
                continue;
            }
            let steps: Vec<&str> = writers.iter().map(|(id, _)| *id).collect();
            let warning = format!(
                "variable '{}' written by steps {} in the same wave; left unchanged",
                key,
                steps.join(", ")
            );
            tracing::warn!("[RunController] {}", warning);
            state.warnings.push(warning);
        }
    }

    /// Apply the error-handling policy to the failed results of one round.
    /// Returns a halt when the policy ends the run.
    async fn apply_failures(
        &self,
        def: &WorkflowDefinition,
        ctx: &mut WorkflowContext,
        state: &mut RunState,
        failures: Vec<StepResult>,
    ) -> Result<Option<Halt>, String> {
        if failures.is_empty() {
            return Ok(None);
        }
        let policy = &def.error_handling;

        let mut exhausted = Vec::new();
        let mut requeued = false;
        for result in failures {
            tracing::warn!(
                step_id = %result.step_id,
                "[RunController] Step failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            );
            if policy.strategy == ErrorStrategy::Retry {
                let used = state.run_retries.entry(result.step_id.clone()).or_insert(0);
                if *used < policy.max_retries {
                    *used += 1;
                    *state
                        .spent_attempts
                        .entry(result.step_id.clone())
                        .or_insert(0) += result.retry_count + 1;
                    tracing::info!(
                        step_id = %result.step_id,
                        "[RunController] Re-dispatching step (run-level retry {}/{})",
                        used,
                        policy.max_retries
                    );
                    self.tracker.record_step(&ctx.execution_id, result).await;
                    requeued = true;
                    continue;
                }
            }
            let result = with_spent_attempts(state, result);
            exhausted.push(result.step_id.clone());
            self.record(ctx, result).await;
        }

        if requeued {
            tokio::time::sleep(Duration::from_millis(policy.retry_delay)).await;
        }
        let Some(first_failed) = exhausted.first().cloned() else {
            return Ok(None);
        };
        let first_error = ctx
            .step_results
            .get(&first_failed)
            .and_then(|r| r.error.clone())
            .unwrap_or_default();
        let failure = format!("step '{}' failed: {}", first_failed, first_error);

        match policy.strategy {
            ErrorStrategy::Continue => Ok(None),
            ErrorStrategy::Retry => match policy.after_retries {
                AfterRetries::Continue => Ok(None),
                AfterRetries::Stop => Ok(Some(Halt::new(ExecutionStatus::Failed, Some(failure)))),
            },
            ErrorStrategy::Stop => Ok(Some(Halt::new(ExecutionStatus::Failed, Some(failure)))),
            ErrorStrategy::Fallback => {
                let fallback_id = policy
                    .fallback_step
                    .clone()
                    .ok_or_else(|| "fallback strategy without a fallbackStep".to_string())?;
                let step = def
                    .step(&fallback_id)
                    .ok_or_else(|| format!("fallback step '{}' does not exist", fallback_id))?;

                tracing::info!(step_id = %fallback_id, "[RunController] Running fallback step");
                state.waves += 1;
                let dispatch_ctx = DispatchContext::from_run(ctx, &def.name);
                let outcome = self.run_wave(&[step], ctx, &dispatch_ctx, None).await?;
                self.apply_variable_writes(ctx, state, &outcome.dispatches);
                for dispatch in outcome.dispatches {
                    self.record(ctx, dispatch.result).await;
                }

                Ok(Some(Halt {
                    status: ExecutionStatus::Failed,
                    error: Some(failure),
                    fallback_step: Some(fallback_id),
                }))
            }
        }
    }

    async fn record(&self, ctx: &mut WorkflowContext, result: StepResult) {
        self.tracker
            .record_step(&ctx.execution_id, result.clone())
            .await;
        ctx.record(result);
    }
}

fn with_spent_attempts(state: &RunState, mut result: StepResult) -> StepResult {
    if let Some(spent) = state.spent_attempts.get(&result.step_id) {
        result.retry_count += spent;
    }
    result
}

fn run_timeout(def: &WorkflowDefinition) -> Halt {
    Halt::new(
        ExecutionStatus::Timeout,
        Some(format!(
            "run exceeded its timeout of {} ms",
            def.timeout.unwrap_or_default()
        )),
    )
}

fn finalize(def: &WorkflowDefinition, ctx: WorkflowContext, state: RunState, halt: Halt) -> WorkflowResult {
    let completed_at = Utc::now();
    let metrics = ExecutionMetrics {
        total_steps: def.steps.len(),
        completed_steps: ctx.completed_steps.len(),
        failed_steps: ctx.failed_steps.len(),
        skipped_steps: ctx.skipped_steps.len(),
        total_tokens: ctx.step_results.values().map(|r| r.tokens_used).sum(),
        duration_ms: (completed_at - ctx.start_time).num_milliseconds().max(0) as u64,
        waves: state.waves,
    };
    WorkflowResult {
        execution_id: ctx.execution_id,
        workflow_id: ctx.workflow_id,
        workflow_name: def.name.clone(),
        session_id: ctx.session_id,
        status: halt.status,
        started_at: ctx.start_time,
        completed_at: Some(completed_at),
        step_results: ctx.step_results,
        success: halt.status == ExecutionStatus::Completed,
        metrics,
        error: halt.error,
        warnings: state.warnings,
        fallback_step: halt.fallback_step,
        feedback: Vec::new(),
    }
}
