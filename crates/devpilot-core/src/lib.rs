//! DevPilot Core — transport-agnostic domain logic for the DevPilot platform.
//!
//! This crate contains workflow definitions and validation, the DAG run
//! engine, trigger matching and suggestion scoring, cron schedules, and the
//! persistence port. It has **no HTTP framework dependency** by default,
//! making it suitable for use in:
//!
//! - HTTP servers (via `devpilot-server`)
//! - CLI tools (via `devpilot-cli`)
//!
//! # Feature Flags
//!
//! - `axum` — Enables `IntoResponse` impl on `ServerError` for use in axum handlers.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod state;
pub mod storage;
pub mod store;
pub mod trigger;
pub mod workflow;

// Convenience re-exports
pub use config::EngineConfig;
pub use db::Database;
pub use error::{ServerError, ValidationError, WorkflowError};
pub use state::{AppState, AppStateInner};
pub use storage::{MemoryStorage, SqliteStorage, StoragePort};
pub use workflow::WorkflowEngine;
