//! Workflow engine — the facade the server and CLI talk to.
//!
//! ```text
//! execute(id) ──► WorkflowStore ──► RunController ──► StepExecutor ──► AgentCapability
//!                                        │
//!                                  ExecutionTracker
//! ```
//!
//! Runs started with [`WorkflowEngine::execute`] are spawned onto the tokio
//! runtime and observed through the tracker; [`WorkflowEngine::execute_and_wait`]
//! drives the run on the caller's task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::WorkflowError;
use crate::models::{
    AmbientSignal, CreateScheduleInput, ExecutionFeedback, ExecutionStatus, ScheduledWorkflow,
    SuggestionContext, TriggerContext, UpdateScheduleInput, WorkflowContext, WorkflowDefinition,
    WorkflowResult, WorkflowSuggestion, WorkflowTrigger,
};
use crate::storage::StoragePort;
use crate::store::{ScheduleStore, SeedReport, WorkflowStore};
use crate::trigger::{matching_workflows, ContextScorer};
use crate::workflow::builtin::builtin_workflows;
use crate::workflow::capability::AgentCapability;
use crate::workflow::executor::StepExecutor;
use crate::workflow::run::RunController;
use crate::workflow::scheduler::preview_waves;
use crate::workflow::specialist::SpecialistCatalog;
use crate::workflow::tracker::ExecutionTracker;
use crate::workflow::validate::validate_definition;

/// Options for starting a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    pub trigger: Option<TriggerContext>,
    /// Initial shared variables
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// One schedule handled by [`WorkflowEngine::tick`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleFiring {
    pub schedule_id: String,
    pub workflow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct WorkflowEngine {
    workflows: Arc<WorkflowStore>,
    schedules: ScheduleStore,
    tracker: Arc<ExecutionTracker>,
    controller: Arc<RunController>,
    specialists: Arc<SpecialistCatalog>,
    scorer: ContextScorer,
}

impl WorkflowEngine {
    pub async fn new(
        agent: Arc<dyn AgentCapability>,
        storage: Arc<dyn StoragePort>,
        config: EngineConfig,
    ) -> Result<Self, WorkflowError> {
        let mut specialists = SpecialistCatalog::with_builtins();
        if let Some(dir) = &config.specialist_dir {
            match specialists.load_dir(std::path::Path::new(dir)) {
                Ok(n) => tracing::info!("[WorkflowEngine] Loaded {} specialists from '{}'", n, dir),
                Err(e) => tracing::warn!("[WorkflowEngine] Failed to load specialists: {}", e),
            }
        }
        let specialists = Arc::new(specialists);

        let tracker = Arc::new(ExecutionTracker::with_retention(config.max_finished_executions));
        let executor = Arc::new(StepExecutor::new(agent, specialists.clone(), config.clone()));
        let controller = Arc::new(RunController::new(executor, tracker.clone()));

        Ok(Self {
            workflows: Arc::new(WorkflowStore::open(storage.clone()).await?),
            schedules: ScheduleStore::open(storage).await?,
            tracker,
            controller,
            specialists,
            scorer: ContextScorer::new(config.suggestion_threshold),
        })
    }

    pub fn specialists(&self) -> &SpecialistCatalog {
        &self.specialists
    }

    // ── Definitions ─────────────────────────────────────────────────────

    /// The embedded built-in catalog.
    pub fn builtin_catalog(&self) -> Result<Vec<WorkflowDefinition>, WorkflowError> {
        builtin_workflows().map_err(WorkflowError::Internal)
    }

    /// Seed the built-ins, then register the schedule trigger of every
    /// stored workflow.
    pub async fn seed_builtins(&self) -> Result<SeedReport, WorkflowError> {
        let report = self.workflows.seed_builtins(self.builtin_catalog()?).await?;
        for def in self.workflows.list(None).await {
            self.sync_trigger_schedule(&def).await?;
        }
        Ok(report)
    }

    pub async fn create_workflow(&self, def: WorkflowDefinition) -> Result<WorkflowDefinition, WorkflowError> {
        let created = self.workflows.create(def).await?;
        self.sync_trigger_schedule(&created).await?;
        Ok(created)
    }

    pub async fn get_workflow(&self, id: &str) -> Result<WorkflowDefinition, WorkflowError> {
        self.workflows
            .get(id)
            .await
            .ok_or_else(|| WorkflowError::NotFound(format!("Workflow {} not found", id)))
    }

    pub async fn list_workflows(&self, category: Option<&str>) -> Vec<WorkflowDefinition> {
        self.workflows.list(category).await
    }

    pub async fn update_workflow(
        &self,
        id: &str,
        def: WorkflowDefinition,
    ) -> Result<WorkflowDefinition, WorkflowError> {
        let updated = self.workflows.update(id, def).await?;
        self.sync_trigger_schedule(&updated).await?;
        Ok(updated)
    }

    /// A `schedule` trigger owns one schedule record; any other trigger owns none.
    async fn sync_trigger_schedule(&self, def: &WorkflowDefinition) -> Result<(), WorkflowError> {
        let trigger = match &def.trigger {
            WorkflowTrigger::Schedule { cron, timezone } => Some((cron.as_str(), timezone.as_str())),
            _ => None,
        };
        self.schedules.sync_trigger(&def.id, trigger).await?;
        Ok(())
    }

    /// Delete a workflow together with its schedules.
    pub async fn delete_workflow(&self, id: &str) -> Result<(), WorkflowError> {
        self.workflows.delete(id).await?;
        let removed = self.schedules.delete_for_workflow(id).await?;
        if removed > 0 {
            tracing::info!(workflow_id = %id, "[WorkflowEngine] Removed {} schedules", removed);
        }
        Ok(())
    }

    /// Validate without storing; returns the wave plan assuming every step completes.
    pub fn validate_workflow(&self, def: &WorkflowDefinition) -> Result<Vec<Vec<String>>, WorkflowError> {
        validate_definition(def)?;
        let reserved = match def.error_handling.strategy {
            crate::models::ErrorStrategy::Fallback => def.error_handling.fallback_step.as_deref(),
            _ => None,
        };
        Ok(preview_waves(&def.steps, reserved)?)
    }

    // ── Executions ──────────────────────────────────────────────────────

    async fn prepare(
        &self,
        workflow_id: &str,
        request: ExecuteRequest,
    ) -> Result<(WorkflowDefinition, WorkflowContext, CancellationToken), WorkflowError> {
        let def = self.get_workflow(workflow_id).await?;
        let (ctx, cancel) = self.start_context(&def, request).await;
        Ok((def, ctx, cancel))
    }

    async fn start_context(
        &self,
        def: &WorkflowDefinition,
        request: ExecuteRequest,
    ) -> (WorkflowContext, CancellationToken) {
        let ctx = WorkflowContext::new(
            &def.id,
            &Uuid::new_v4().to_string(),
            &request
                .session_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            request.trigger.unwrap_or_else(TriggerContext::manual),
            request.variables,
        );
        let cancel = self.tracker.start(&ctx, &def.name).await;
        (ctx, cancel)
    }

    /// Start a run in the background and return its execution id.
    pub async fn execute(&self, workflow_id: &str, request: ExecuteRequest) -> Result<String, WorkflowError> {
        let (def, ctx, cancel) = self.prepare(workflow_id, request).await?;
        let execution_id = ctx.execution_id.clone();

        let controller = self.controller.clone();
        let workflows = self.workflows.clone();
        tokio::spawn(async move {
            run_to_completion(&controller, &workflows, &def, ctx, cancel).await;
        });
        Ok(execution_id)
    }

    /// Run to a terminal status on the current task.
    pub async fn execute_and_wait(
        &self,
        workflow_id: &str,
        request: ExecuteRequest,
    ) -> Result<WorkflowResult, WorkflowError> {
        let (def, ctx, cancel) = self.prepare(workflow_id, request).await?;
        Ok(run_to_completion(&self.controller, &self.workflows, &def, ctx, cancel).await)
    }

    /// Validate and run a definition that is not stored; its statistics
    /// are not recorded.
    pub async fn run_definition(
        &self,
        def: &WorkflowDefinition,
        request: ExecuteRequest,
    ) -> Result<WorkflowResult, WorkflowError> {
        validate_definition(def)?;
        let (ctx, cancel) = self.start_context(def, request).await;
        Ok(self.controller.run(def, ctx, cancel).await)
    }

    pub async fn get_execution(&self, execution_id: &str) -> Result<WorkflowResult, WorkflowError> {
        self.tracker
            .get(execution_id)
            .await
            .ok_or_else(|| WorkflowError::NotFound(format!("Execution {} not found", execution_id)))
    }

    pub async fn list_executions(&self, workflow_id: Option<&str>) -> Vec<WorkflowResult> {
        self.tracker.list(workflow_id).await
    }

    pub async fn cancel_execution(&self, execution_id: &str) -> Result<(), WorkflowError> {
        self.tracker.cancel(execution_id).await
    }

    pub async fn add_feedback(
        &self,
        execution_id: &str,
        feedback: ExecutionFeedback,
    ) -> Result<WorkflowResult, WorkflowError> {
        self.tracker.add_feedback(execution_id, feedback).await
    }

    // ── Triggers ────────────────────────────────────────────────────────

    pub async fn suggest(&self, ctx: &SuggestionContext) -> Vec<WorkflowSuggestion> {
        let workflows = self.workflows.list(None).await;
        self.scorer.suggest(&workflows, ctx)
    }

    /// Start every workflow whose trigger matches `signal`.
    pub async fn handle_signal(&self, signal: &AmbientSignal) -> Result<Vec<String>, WorkflowError> {
        let workflows = self.workflows.list(None).await;
        let matched = matching_workflows(&workflows, signal);
        tracing::info!(
            "[WorkflowEngine] Signal '{}' matched {} workflows",
            signal.kind(),
            matched.len()
        );

        let payload = serde_json::to_value(signal)
            .map_err(|e| WorkflowError::Internal(format!("failed to encode signal: {}", e)))?;
        let mut started = Vec::with_capacity(matched.len());
        for def in matched {
            let request = ExecuteRequest {
                trigger: Some(TriggerContext {
                    source: def.trigger.kind().to_string(),
                    payload: payload.clone(),
                }),
                ..Default::default()
            };
            started.push(self.execute(&def.id, request).await?);
        }
        Ok(started)
    }

    // ── Schedules ───────────────────────────────────────────────────────

    pub async fn create_schedule(&self, input: CreateScheduleInput) -> Result<ScheduledWorkflow, WorkflowError> {
        self.get_workflow(&input.workflow_id).await?;
        self.schedules.create(input).await
    }

    pub async fn get_schedule(&self, id: &str) -> Result<ScheduledWorkflow, WorkflowError> {
        self.schedules
            .get(id)
            .await
            .ok_or_else(|| WorkflowError::NotFound(format!("Schedule {} not found", id)))
    }

    pub async fn list_schedules(&self, workflow_id: Option<&str>) -> Vec<ScheduledWorkflow> {
        self.schedules.list(workflow_id).await
    }

    pub async fn update_schedule(
        &self,
        id: &str,
        input: UpdateScheduleInput,
    ) -> Result<ScheduledWorkflow, WorkflowError> {
        self.schedules.update(id, input).await
    }

    pub async fn delete_schedule(&self, id: &str) -> Result<(), WorkflowError> {
        self.schedules.delete(id).await
    }

    /// Fire every due schedule as of `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<ScheduleFiring>, WorkflowError> {
        let due = self.schedules.due(now).await;
        let mut firings = Vec::with_capacity(due.len());

        for schedule in due {
            let signal = AmbientSignal::ScheduleTick {
                workflow_id: schedule.workflow_id.clone(),
            };
            let request = ExecuteRequest {
                trigger: Some(TriggerContext {
                    source: signal.kind().to_string(),
                    payload: serde_json::json!({
                        "scheduleId": schedule.id,
                        "signal": signal,
                        "firedAt": now,
                    }),
                }),
                ..Default::default()
            };

            let (execution_id, error) = match self.execute(&schedule.workflow_id, request).await {
                Ok(id) => (Some(id), None),
                Err(e) => {
                    tracing::warn!(
                        workflow_id = %schedule.workflow_id,
                        "[WorkflowEngine] Scheduled run failed to start: {}",
                        e
                    );
                    (None, Some(e.to_string()))
                }
            };
            self.schedules
                .mark_fired(&schedule.id, now, execution_id.clone())
                .await?;
            firings.push(ScheduleFiring {
                schedule_id: schedule.id,
                workflow_id: schedule.workflow_id,
                execution_id,
                error,
            });
        }
        Ok(firings)
    }
}

async fn run_to_completion(
    controller: &RunController,
    workflows: &WorkflowStore,
    def: &WorkflowDefinition,
    ctx: WorkflowContext,
    cancel: CancellationToken,
) -> WorkflowResult {
    let result = controller.run(def, ctx, cancel).await;
    if matches!(result.status, ExecutionStatus::Completed | ExecutionStatus::Failed) {
        if let Err(e) = workflows.record_outcome(&def.id, result.success).await {
            tracing::warn!(
                workflow_id = %def.id,
                "[WorkflowEngine] Failed to record run outcome: {}",
                e
            );
        }
    }
    result
}
