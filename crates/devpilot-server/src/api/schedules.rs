use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use devpilot_core::models::{CreateScheduleInput, UpdateScheduleInput};
use devpilot_core::{AppState, ServerError};
use serde::Deserialize;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_schedules).post(create_schedule))
        .route("/tick", post(trigger_tick))
        .route(
            "/{id}",
            get(get_schedule).patch(update_schedule).delete(delete_schedule),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    workflow_id: Option<String>,
}

async fn list_schedules(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Json<serde_json::Value> {
    let schedules = state.engine.list_schedules(q.workflow_id.as_deref()).await;
    Json(serde_json::json!({ "schedules": schedules }))
}

async fn create_schedule(
    State(state): State<AppState>,
    Json(body): Json<CreateScheduleInput>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let schedule = state.engine.create_schedule(body).await?;
    Ok(Json(serde_json::json!({ "schedule": schedule })))
}

async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let schedule = state.engine.get_schedule(&id).await?;
    Ok(Json(serde_json::json!({ "schedule": schedule })))
}

async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateScheduleInput>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let schedule = state.engine.update_schedule(&id, body).await?;
    Ok(Json(serde_json::json!({ "schedule": schedule })))
}

async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.engine.delete_schedule(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// POST /api/schedules/tick — Fire every schedule that is due now.
async fn trigger_tick(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ServerError> {
    let firings = state.engine.tick(chrono::Utc::now()).await?;
    Ok(Json(serde_json::json!({ "firings": firings })))
}
