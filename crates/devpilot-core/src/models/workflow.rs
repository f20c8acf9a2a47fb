//! Workflow definition types.
//!
//! A workflow is a DAG of steps, each bound to one agent capability, plus a
//! trigger declaration and an error-handling policy. Definitions are stored
//! as JSON and authored as YAML:
//!
//! ```yaml
//! id: code-review-commit
//! name: "Review and Commit"
//! category: git
//! trigger:
//!   type: conversation
//!   keywords: [commit, "review my changes"]
//! errorHandling:
//!   strategy: stop
//! steps:
//!   - id: review
//!     name: "Review staged changes"
//!     agent: code-reviewer
//!     input:
//!       scope: staged
//!   - id: message
//!     name: "Write commit message"
//!     agent: commit-writer
//!     dependsOn: [review]
//!     inputMapping:
//!       review.summary: "review.summary"
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author recorded on definitions loaded from the built-in catalog.
pub const SYSTEM_AUTHOR: &str = "system";
/// Author recorded on user-created or user-edited definitions.
pub const USER_AUTHOR: &str = "user";

/// Top-level workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Unique id; generated on create when empty
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "default_category")]
    pub category: String,

    #[serde(default = "default_version")]
    pub version: String,

    /// `"system"` for built-ins, `"user"` otherwise
    #[serde(default = "default_author")]
    pub author: String,

    #[serde(default)]
    pub trigger: WorkflowTrigger,

    /// Steps in declaration order (ties in the schedule follow this order)
    pub steps: Vec<WorkflowStep>,

    /// Precondition expressions evaluated before the first wave
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,

    #[serde(default)]
    pub error_handling: ErrorHandling,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Estimated duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<u64>,

    /// Whole-run timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Rolling success rate, 0–100
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,

    #[serde(default)]
    pub run_count: u64,

    #[serde(default)]
    pub success_count: u64,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_category() -> String {
    "general".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_author() -> String {
    USER_AUTHOR.to_string()
}

fn default_success_rate() -> f64 {
    100.0
}

impl WorkflowDefinition {
    /// Parse a workflow definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| format!("Failed to parse workflow YAML: {}", e))
    }

    /// Load a workflow definition from a `.yaml`/`.yml` or `.json` file.
    pub fn from_file(path: &str) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read workflow file '{}': {}", path, e))?;
        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .map_err(|e| format!("Failed to parse workflow JSON '{}': {}", path, e))
        } else {
            Self::from_yaml(&content)
        }
    }

    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn is_system(&self) -> bool {
        self.author == SYSTEM_AUTHOR
    }

    /// Fold one finished run into the rolling success statistics.
    pub fn record_outcome(&mut self, success: bool) {
        self.run_count += 1;
        if success {
            self.success_count += 1;
        }
        self.success_rate = (self.success_count as f64 / self.run_count as f64) * 100.0;
    }
}

/// How a workflow can be started automatically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkflowTrigger {
    /// Only started on request
    #[default]
    Manual,
    /// Cron-based schedule
    Schedule {
        cron: String,
        #[serde(default = "default_timezone")]
        timezone: String,
    },
    /// Changed files matching any glob pattern
    FileChange {
        #[serde(default)]
        patterns: Vec<String>,
    },
    /// Git hook / VCS event (e.g. "commit", "push", "pre-push")
    GitEvent {
        #[serde(default)]
        events: Vec<String>,
        #[serde(default)]
        branches: Vec<String>,
    },
    /// Conversation text containing any keyword
    Conversation {
        #[serde(default)]
        keywords: Vec<String>,
    },
    /// Error messages matching any pattern
    Error {
        #[serde(default)]
        patterns: Vec<String>,
    },
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl WorkflowTrigger {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Schedule { .. } => "schedule",
            Self::FileChange { .. } => "file-change",
            Self::GitEvent { .. } => "git-event",
            Self::Conversation { .. } => "conversation",
            Self::Error { .. } => "error",
        }
    }
}

/// A single step in the workflow DAG.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    /// Unique within the workflow; used by `dependsOn` and `inputMapping`
    pub id: String,

    pub name: String,

    /// Target capability id (e.g. "code-reviewer", "python-runner")
    pub agent: String,

    /// Static input payload (JSON object)
    #[serde(default = "empty_object")]
    pub input: serde_json::Value,

    /// Per-attempt timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Local retries after the first attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    /// Delay between local retries in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<u64>,

    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Target dot-path in the input → `"sourceStepId.outputPath"`
    #[serde(default)]
    pub input_mapping: BTreeMap<String, String>,

    /// Expression that must hold for the step to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// What the run controller does when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStrategy {
    /// Halt the run as failed (default)
    #[default]
    Stop,
    /// Keep going; dependents of the failed step are skipped
    Continue,
    /// Re-dispatch the failed step, then apply `afterRetries`
    Retry,
    /// Run the designated fallback step instead of continuing
    Fallback,
}

impl ErrorStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Continue => "continue",
            Self::Retry => "retry",
            Self::Fallback => "fallback",
        }
    }
}

/// Behaviour once run-level retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AfterRetries {
    #[default]
    Stop,
    Continue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorHandling {
    #[serde(default)]
    pub strategy: ErrorStrategy,

    /// Run-level re-dispatches for the `retry` strategy
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between run-level retries in milliseconds
    #[serde(default = "default_policy_retry_delay")]
    pub retry_delay: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_step: Option<String>,

    #[serde(default)]
    pub after_retries: AfterRetries,
}

fn default_max_retries() -> u32 {
    2
}

fn default_policy_retry_delay() -> u64 {
    1_000
}

impl Default for ErrorHandling {
    fn default() -> Self {
        Self {
            strategy: ErrorStrategy::Stop,
            max_retries: default_max_retries(),
            retry_delay: default_policy_retry_delay(),
            fallback_step: None,
            after_retries: AfterRetries::Stop,
        }
    }
}
