//! Shared application state for the axum server.

use std::sync::Arc;

use crate::db::Database;
use crate::workflow::WorkflowEngine;

/// Shared state accessible by all API handlers.
pub struct AppStateInner {
    pub db: Database,
    pub engine: WorkflowEngine,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn new(db: Database, engine: WorkflowEngine) -> Self {
        Self { db, engine }
    }
}
