//! Execution-time types: per-run context, step results and the final
//! workflow result.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// What started a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TriggerContext {
    /// Trigger kind: "manual", "schedule", "file-change", ...
    pub source: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TriggerContext {
    pub fn manual() -> Self {
        Self {
            source: "manual".to_string(),
            payload: serde_json::Value::Null,
        }
    }
}

/// Outcome of one step, created when the step starts or is skipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub agent_id: String,
    #[serde(default)]
    pub input: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub retry_count: u32,
}

impl StepResult {
    /// A result for a step that was started.
    pub fn started(step_id: &str, agent_id: &str, input: serde_json::Value) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Running,
            started_at: Some(Utc::now()),
            completed_at: None,
            duration_ms: None,
            agent_id: agent_id.to_string(),
            input,
            output: None,
            error: None,
            tokens_used: 0,
            retry_count: 0,
        }
    }

    /// A terminal result for a step that never ran.
    pub fn skipped(step_id: &str, agent_id: &str, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Skipped,
            started_at: None,
            completed_at: Some(now),
            duration_ms: None,
            agent_id: agent_id.to_string(),
            input: serde_json::Value::Null,
            output: None,
            error: Some(reason.into()),
            tokens_used: 0,
            retry_count: 0,
        }
    }

    /// Move a running result to a terminal status.
    pub fn finish(mut self, status: StepStatus) -> Self {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.duration_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds().max(0) as u64);
        self
    }
}

/// Per-run mutable state, owned by exactly one running instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowContext {
    pub workflow_id: String,
    pub execution_id: String,
    pub session_id: String,
    pub trigger: TriggerContext,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub completed_steps: BTreeSet<String>,
    #[serde(default)]
    pub failed_steps: BTreeSet<String>,
    #[serde(default)]
    pub skipped_steps: BTreeSet<String>,
    #[serde(default)]
    pub step_results: BTreeMap<String, StepResult>,
}

impl WorkflowContext {
    pub fn new(
        workflow_id: &str,
        execution_id: &str,
        session_id: &str,
        trigger: TriggerContext,
        variables: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            execution_id: execution_id.to_string(),
            session_id: session_id.to_string(),
            trigger,
            start_time: Utc::now(),
            variables,
            completed_steps: BTreeSet::new(),
            failed_steps: BTreeSet::new(),
            skipped_steps: BTreeSet::new(),
            step_results: BTreeMap::new(),
        }
    }

    /// Record a terminal step result and update the status sets.
    pub fn record(&mut self, result: StepResult) {
        let id = result.step_id.clone();
        self.completed_steps.remove(&id);
        self.failed_steps.remove(&id);
        self.skipped_steps.remove(&id);
        match result.status {
            StepStatus::Completed => {
                self.completed_steps.insert(id.clone());
            }
            StepStatus::Failed => {
                self.failed_steps.insert(id.clone());
            }
            StepStatus::Skipped => {
                self.skipped_steps.insert(id.clone());
            }
            StepStatus::Pending | StepStatus::Running => {}
        }
        self.step_results.insert(id, result);
    }

    /// Output of a step, only once it has completed.
    pub fn completed_output(&self, step_id: &str) -> Option<&serde_json::Value> {
        self.step_results
            .get(step_id)
            .filter(|r| r.status == StepStatus::Completed)
            .and_then(|r| r.output.as_ref())
    }

    pub fn is_resolved(&self, step_id: &str) -> bool {
        self.completed_steps.contains(step_id)
            || self.failed_steps.contains(step_id)
            || self.skipped_steps.contains(step_id)
    }
}

/// Aggregate metrics for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
    pub total_tokens: u64,
    pub duration_ms: u64,
    pub waves: usize,
}

/// User feedback appended to a finished run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFeedback {
    /// 1–5
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default = "Utc::now")]
    pub submitted_at: DateTime<Utc>,
}

/// Result of a workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub execution_id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub session_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub step_results: BTreeMap<String, StepResult>,
    pub success: bool,
    pub metrics: ExecutionMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_step: Option<String>,
    #[serde(default)]
    pub feedback: Vec<ExecutionFeedback>,
}

impl WorkflowResult {
    /// Snapshot of a run that has not finished yet.
    pub fn running(context: &WorkflowContext, workflow_name: &str) -> Self {
        Self {
            execution_id: context.execution_id.clone(),
            workflow_id: context.workflow_id.clone(),
            workflow_name: workflow_name.to_string(),
            session_id: context.session_id.clone(),
            status: ExecutionStatus::Running,
            started_at: context.start_time,
            completed_at: None,
            step_results: context.step_results.clone(),
            success: false,
            metrics: ExecutionMetrics::default(),
            error: None,
            warnings: Vec::new(),
            fallback_step: None,
            feedback: Vec::new(),
        }
    }
}
