use axum::{extract::State, routing::post, Json, Router};
use devpilot_core::models::AmbientSignal;
use devpilot_core::{AppState, ServerError};

pub fn router() -> Router<AppState> {
    Router::new().route("/signal", post(handle_signal))
}

/// POST /api/triggers/signal — Start every workflow whose trigger matches.
async fn handle_signal(
    State(state): State<AppState>,
    Json(signal): Json<AmbientSignal>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let execution_ids = state.engine.handle_signal(&signal).await?;
    Ok(Json(serde_json::json!({ "executionIds": execution_ids })))
}
