use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use devpilot_core::models::WorkflowDefinition;
use devpilot_core::workflow::ExecuteRequest;
use devpilot_core::{AppState, ServerError};
use serde::Deserialize;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_workflows).post(create_workflow))
        .route("/builtin", get(list_builtins))
        .route("/validate", post(validate_workflow))
        .route(
            "/{id}",
            get(get_workflow).put(update_workflow).delete(delete_workflow),
        )
        .route("/{id}/execute", post(execute_workflow))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    category: Option<String>,
}

/// Accepts either a JSON definition or `{"yaml": "<definition>"}`.
fn parse_definition(body: serde_json::Value) -> Result<WorkflowDefinition, ServerError> {
    if let Some(yaml) = body.get("yaml").and_then(|v| v.as_str()) {
        return WorkflowDefinition::from_yaml(yaml).map_err(ServerError::BadRequest);
    }
    serde_json::from_value(body)
        .map_err(|e| ServerError::BadRequest(format!("Invalid workflow definition: {}", e)))
}

async fn list_workflows(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Json<serde_json::Value> {
    let workflows = state.engine.list_workflows(q.category.as_deref()).await;
    Json(serde_json::json!({ "workflows": workflows }))
}

async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let def = parse_definition(body)?;
    let workflow = state.engine.create_workflow(def).await?;
    Ok(Json(serde_json::json!({ "workflow": workflow })))
}

/// GET /api/workflows/builtin — The embedded catalog, as shipped.
async fn list_builtins(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ServerError> {
    let workflows = state.engine.builtin_catalog()?;
    Ok(Json(serde_json::json!({ "workflows": workflows })))
}

/// POST /api/workflows/validate — Validate without storing.
async fn validate_workflow(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let def = parse_definition(body)?;
    let waves = state.engine.validate_workflow(&def)?;
    Ok(Json(serde_json::json!({ "valid": true, "waves": waves })))
}

async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let workflow = state.engine.get_workflow(&id).await?;
    Ok(Json(serde_json::json!({ "workflow": workflow })))
}

async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let def = parse_definition(body)?;
    let workflow = state.engine.update_workflow(&id, def).await?;
    Ok(Json(serde_json::json!({ "workflow": workflow })))
}

async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.engine.delete_workflow(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// POST /api/workflows/{id}/execute — Start a run in the background.
///
/// The body is optional; when present it carries `trigger`, `variables`
/// and `sessionId`.
async fn execute_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ServerError> {
    let request: ExecuteRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ExecuteRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ServerError::BadRequest(format!("Invalid execute request: {}", e)))?
    };
    let execution_id = state.engine.execute(&id, request).await?;
    Ok(Json(serde_json::json!({ "executionId": execution_id })))
}
