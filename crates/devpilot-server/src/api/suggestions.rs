use axum::{extract::State, routing::post, Json, Router};
use devpilot_core::models::SuggestionContext;
use devpilot_core::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(suggest))
}

/// POST /api/suggestions — Rank workflows against the caller's activity.
async fn suggest(
    State(state): State<AppState>,
    Json(ctx): Json<SuggestionContext>,
) -> Json<serde_json::Value> {
    let suggestions = state.engine.suggest(&ctx).await;
    Json(serde_json::json!({ "suggestions": suggestions }))
}
