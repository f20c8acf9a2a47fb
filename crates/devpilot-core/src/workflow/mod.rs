//! Workflow engine — DAG-based multi-step agent orchestration.
//!
//! Workflows are defined in YAML (or JSON over the API), validated once at
//! create/update time, then executed wave by wave against an injected
//! [`AgentCapability`].
//!
//! # Architecture
//!
//! ```text
//! workflow.yaml ──► WorkflowDefinition ──► validate ──► WorkflowStore
//!                                                           │
//!                                     WorkflowEngine ◄──────┘
//!                                           │
//!      DependencyScheduler ◄── RunController ──► ExecutionTracker
//!                                           │
//!               resolver / condition ──► StepExecutor ──► SpecialistCatalog
//!                                           │
//!                                   AgentCapability (HTTP, scripted, ...)
//! ```

pub mod agent_caller;
pub mod builtin;
pub mod capability;
pub mod condition;
pub mod engine;
pub mod executor;
pub mod resolver;
pub mod run;
pub mod scheduler;
pub mod specialist;
pub mod tracker;
pub mod validate;

pub use agent_caller::{AgentEndpointConfig, HttpAgentCapability};
pub use capability::{
    classify, AgentCapability, AgentOutcome, CapabilityClass, InstructionPayload,
    InterpreterRuntime, InvocationStrategy, PreparedEnvironment, StepExecutionError,
};
pub use engine::{ExecuteRequest, ScheduleFiring, WorkflowEngine};
pub use executor::StepExecutor;
pub use run::RunController;
pub use scheduler::{preview_waves, topological_order, DependencyScheduler};
pub use specialist::{SpecialistCatalog, SpecialistDef};
pub use tracker::ExecutionTracker;
pub use validate::validate_definition;
