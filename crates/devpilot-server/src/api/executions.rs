use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use devpilot_core::models::ExecutionFeedback;
use devpilot_core::{AppState, ServerError};
use serde::Deserialize;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_executions))
        .route("/{id}", get(get_execution))
        .route("/{id}/cancel", post(cancel_execution))
        .route("/{id}/feedback", post(add_feedback))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    workflow_id: Option<String>,
}

async fn list_executions(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Json<serde_json::Value> {
    let executions = state.engine.list_executions(q.workflow_id.as_deref()).await;
    Json(serde_json::json!({ "executions": executions }))
}

/// GET /api/executions/{id} — Partial results while running, final result after.
async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let execution = state.engine.get_execution(&id).await?;
    Ok(Json(serde_json::json!({ "execution": execution })))
}

async fn cancel_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.engine.cancel_execution(&id).await?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}

async fn add_feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ExecutionFeedback>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let execution = state.engine.add_feedback(&id, body).await?;
    Ok(Json(serde_json::json!({ "execution": execution })))
}
