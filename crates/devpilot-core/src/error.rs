//! Core error types for the DevPilot platform.
//!
//! `WorkflowError` is raised by the engine and its stores. `ServerError` is
//! the transport-facing error used by the HTTP server and the CLI; when the
//! `axum` feature is enabled it also implements `IntoResponse` so it can be
//! used directly as an axum handler error type.

use crate::storage::StorageError;

/// Structural problems found while validating a workflow definition.
///
/// Always raised synchronously at create/update time, never during a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("workflow must have a non-empty name")]
    MissingName,

    #[error("workflow must contain at least one step")]
    NoSteps,

    #[error("step at position {0} has an empty id")]
    MissingStepId(usize),

    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("step '{0}' depends on itself")]
    SelfDependency(String),

    #[error("dependency cycle between steps: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("step '{step}' maps '{target}' from unknown step '{source_step}'")]
    UnknownMappingSource {
        step: String,
        target: String,
        source_step: String,
    },

    #[error("step '{step}' has a malformed input mapping for '{target}': '{mapping}'")]
    MalformedMapping {
        step: String,
        target: String,
        mapping: String,
    },

    #[error("step '{0}' input must be a JSON object")]
    InputNotObject(String),

    #[error("fallback strategy requires a fallbackStep")]
    MissingFallbackStep,

    #[error("fallback step '{0}' does not exist")]
    UnknownFallbackStep(String),

    #[error("step '{step}' depends on the fallback step '{fallback}'")]
    DependsOnFallback { step: String, fallback: String },

    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("unknown timezone '{0}'")]
    InvalidTimezone(String),
}

/// Errors raised by the workflow engine and stores.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Transport-facing error used by the HTTP server and CLI.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<WorkflowError> for ServerError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(e) => ServerError::BadRequest(e.to_string()),
            WorkflowError::NotFound(msg) => ServerError::NotFound(msg),
            WorkflowError::Conflict(msg) => ServerError::Conflict(msg),
            WorkflowError::InvalidInput(msg) => ServerError::BadRequest(msg),
            WorkflowError::Storage(e) => ServerError::Database(e.to_string()),
            WorkflowError::Internal(msg) => ServerError::Internal(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, message) = match &self {
            ServerError::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ServerError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_error_maps_to_server_error() {
        let err: ServerError = WorkflowError::NotFound("Workflow x not found".into()).into();
        assert!(matches!(err, ServerError::NotFound(ref m) if m == "Workflow x not found"));

        let err: ServerError =
            WorkflowError::Validation(ValidationError::DuplicateStepId("a".into())).into();
        match err {
            ServerError::BadRequest(msg) => assert!(msg.contains("duplicate step id 'a'")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cycle_message_lists_steps() {
        let err = ValidationError::Cycle(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "dependency cycle between steps: a, b");
    }
}
