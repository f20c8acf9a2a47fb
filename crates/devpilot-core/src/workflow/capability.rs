//! Agent capabilities — the injected collaborator that actually performs a
//! step, and the closed table that decides how each capability is invoked.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Language runtime required by interpreter-backed capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpreterRuntime {
    Python,
    Node,
    Shell,
}

impl InterpreterRuntime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Node => "node",
            Self::Shell => "shell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityClass {
    General,
    Interpreter(InterpreterRuntime),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStrategy {
    /// Invoke the capability straight away
    Direct,
    /// Await `prepare_environment` first and attach the handle to the payload
    PreparedEnvironment(InterpreterRuntime),
}

impl CapabilityClass {
    pub fn strategy(&self) -> InvocationStrategy {
        match self {
            Self::General => InvocationStrategy::Direct,
            Self::Interpreter(runtime) => InvocationStrategy::PreparedEnvironment(*runtime),
        }
    }
}

/// Capability ids that need an interpreter. Everything else is `General`.
const CAPABILITY_TABLE: &[(&str, CapabilityClass)] = &[
    ("python-runner", CapabilityClass::Interpreter(InterpreterRuntime::Python)),
    ("data-analyst", CapabilityClass::Interpreter(InterpreterRuntime::Python)),
    ("notebook-runner", CapabilityClass::Interpreter(InterpreterRuntime::Python)),
    ("node-runner", CapabilityClass::Interpreter(InterpreterRuntime::Node)),
    ("script-runner", CapabilityClass::Interpreter(InterpreterRuntime::Shell)),
    ("test-runner", CapabilityClass::Interpreter(InterpreterRuntime::Shell)),
];

pub fn classify(capability_id: &str) -> CapabilityClass {
    CAPABILITY_TABLE
        .iter()
        .find(|(id, _)| *id == capability_id)
        .map(|(_, class)| *class)
        .unwrap_or(CapabilityClass::General)
}

/// Handle describing a prepared interpreter environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedEnvironment {
    pub runtime: InterpreterRuntime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Summary of a direct dependency's finished output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorStepSummary {
    pub step_id: String,
    pub agent_id: String,
    pub summary: String,
}

/// Everything the agent needs to perform one attempt of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionPayload {
    pub role: String,
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_reminder: Option<String>,
    pub workflow_id: String,
    pub workflow_name: String,
    pub execution_id: String,
    pub session_id: String,
    pub step_id: String,
    pub step_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub input: serde_json::Value,
    #[serde(default)]
    pub prior_steps: Vec<PriorStepSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<PreparedEnvironment>,
    /// 1-based attempt number within this dispatch
    pub attempt: u32,
}

impl InstructionPayload {
    /// Render the payload as a single prompt for text-only agents.
    pub fn to_prompt(&self) -> String {
        let mut prompt = format!(
            "Workflow: {} ({})\nStep: {} ({})\n",
            self.workflow_name, self.workflow_id, self.step_name, self.step_id
        );
        if let Some(project) = &self.project {
            prompt.push_str(&format!("Project: {}\n", project));
        }
        if !self.prior_steps.is_empty() {
            prompt.push_str("\nPrevious steps:\n");
            for prior in &self.prior_steps {
                prompt.push_str(&format!("- {} ({}): {}\n", prior.step_id, prior.agent_id, prior.summary));
            }
        }
        if let Some(env) = &self.environment {
            prompt.push_str(&format!("\nEnvironment: {}\n", env.runtime.as_str()));
        }
        let input = serde_json::to_string_pretty(&self.input).unwrap_or_default();
        prompt.push_str(&format!("\nInput:\n{}\n", input));
        if let Some(reminder) = &self.role_reminder {
            prompt.push_str(&format!("\nReminder: {}\n", reminder));
        }
        prompt
    }
}

/// What a capability reports back for one attempt.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutcome {
    pub success: bool,
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Shared variables this step wants to set
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
}

impl AgentOutcome {
    pub fn ok(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepExecutionError {
    #[error("agent invocation failed: {0}")]
    Invocation(String),

    #[error("step timed out after {0} ms")]
    Timeout(u64),

    #[error("environment preparation failed: {0}")]
    Environment(String),
}

/// An external skill that performs workflow steps.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    /// Perform one attempt. Transport failures are `Err`; an agent that ran
    /// but reported failure returns `Ok` with `success: false`.
    async fn invoke(
        &self,
        capability_id: &str,
        payload: InstructionPayload,
    ) -> Result<AgentOutcome, String>;

    async fn prepare_environment(
        &self,
        runtime: InterpreterRuntime,
    ) -> Result<PreparedEnvironment, String> {
        Ok(PreparedEnvironment {
            runtime,
            handle: None,
            details: serde_json::Value::Null,
        })
    }
}
