pub mod executions;
pub mod schedules;
pub mod suggestions;
pub mod triggers;
pub mod workflows;

use axum::Router;
use devpilot_core::AppState;

/// Build the complete API router with all sub-routes.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/api/workflows", workflows::router())
        .nest("/api/executions", executions::router())
        .nest("/api/suggestions", suggestions::router())
        .nest("/api/triggers", triggers::router())
        .nest("/api/schedules", schedules::router())
}
