//! Execution tracker — in-memory registry of running and finished runs.
//!
//! Running entries expose partial step results; finalized entries are
//! immutable apart from appended feedback. Only the newest `max_finished`
//! finished runs are kept; running entries are never evicted.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::WorkflowError;
use crate::models::{ExecutionFeedback, StepResult, WorkflowContext, WorkflowResult};

pub const DEFAULT_MAX_FINISHED: usize = 1_000;

struct Entry {
    result: WorkflowResult,
    cancel: CancellationToken,
}

pub struct ExecutionTracker {
    entries: RwLock<HashMap<String, Entry>>,
    max_finished: usize,
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self::with_retention(DEFAULT_MAX_FINISHED)
    }
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(max_finished: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_finished,
        }
    }

    /// Register a new run and hand back its cancellation token.
    pub async fn start(&self, ctx: &WorkflowContext, workflow_name: &str) -> CancellationToken {
        let cancel = CancellationToken::new();
        let entry = Entry {
            result: WorkflowResult::running(ctx, workflow_name),
            cancel: cancel.clone(),
        };
        self.entries
            .write()
            .await
            .insert(ctx.execution_id.clone(), entry);
        cancel
    }

    /// Publish a step result while the run is still going.
    pub async fn record_step(&self, execution_id: &str, result: StepResult) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(execution_id) {
            if !entry.result.status.is_terminal() {
                entry
                    .result
                    .step_results
                    .insert(result.step_id.clone(), result);
            }
        }
    }

    /// Store the final result. A finalized entry is never replaced.
    pub async fn finalize(&self, result: WorkflowResult) {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&result.execution_id) {
            Some(entry) if entry.result.status.is_terminal() => {
                tracing::warn!(
                    execution_id = %result.execution_id,
                    "[ExecutionTracker] Ignoring second finalization"
                );
            }
            Some(entry) => {
                let feedback = std::mem::take(&mut entry.result.feedback);
                entry.result = result;
                entry.result.feedback = feedback;
            }
            None => {
                entries.insert(
                    result.execution_id.clone(),
                    Entry {
                        result,
                        cancel: CancellationToken::new(),
                    },
                );
            }
        }
        self.evict_finished(&mut entries);
    }

    /// Drop the oldest finished runs beyond the retention cap.
    fn evict_finished(&self, entries: &mut HashMap<String, Entry>) {
        let mut finished: Vec<(chrono::DateTime<chrono::Utc>, String)> = entries
            .values()
            .filter(|e| e.result.status.is_terminal())
            .map(|e| {
                let at = e.result.completed_at.unwrap_or(e.result.started_at);
                (at, e.result.execution_id.clone())
            })
            .collect();
        if finished.len() <= self.max_finished {
            return;
        }
        finished.sort();
        let excess = finished.len() - self.max_finished;
        for (_, id) in finished.into_iter().take(excess) {
            entries.remove(&id);
        }
        tracing::debug!("[ExecutionTracker] Evicted {} finished run(s)", excess);
    }

    /// Request cooperative cancellation; honoured at the next wave boundary.
    pub async fn cancel(&self, execution_id: &str) -> Result<(), WorkflowError> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(execution_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("Execution {} not found", execution_id)))?;
        if entry.result.status.is_terminal() {
            return Err(WorkflowError::Conflict(format!(
                "Execution {} already finished as {}",
                execution_id,
                entry.result.status.as_str()
            )));
        }
        entry.cancel.cancel();
        tracing::info!(execution_id = %execution_id, "[ExecutionTracker] Cancellation requested");
        Ok(())
    }

    pub async fn get(&self, execution_id: &str) -> Option<WorkflowResult> {
        self.entries
            .read()
            .await
            .get(execution_id)
            .map(|e| e.result.clone())
    }

    /// Newest first.
    pub async fn list(&self, workflow_id: Option<&str>) -> Vec<WorkflowResult> {
        let entries = self.entries.read().await;
        let mut results: Vec<WorkflowResult> = entries
            .values()
            .filter(|e| workflow_id.map_or(true, |id| e.result.workflow_id == id))
            .map(|e| e.result.clone())
            .collect();
        results.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| a.execution_id.cmp(&b.execution_id))
        });
        results
    }

    pub async fn add_feedback(
        &self,
        execution_id: &str,
        feedback: ExecutionFeedback,
    ) -> Result<WorkflowResult, WorkflowError> {
        if !(1..=5).contains(&feedback.rating) {
            return Err(WorkflowError::InvalidInput(format!(
                "rating must be between 1 and 5, got {}",
                feedback.rating
            )));
        }
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(execution_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("Execution {} not found", execution_id)))?;
        if !entry.result.status.is_terminal() {
            return Err(WorkflowError::Conflict(format!(
                "Execution {} is still running",
                execution_id
            )));
        }
        entry.result.feedback.push(feedback);
        Ok(entry.result.clone())
    }
}
