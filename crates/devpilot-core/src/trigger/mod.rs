//! Trigger matching and context scoring.
//!
//! [`matcher`] decides which workflows an ambient signal should auto-start;
//! [`scorer`] ranks workflows against what the caller is doing right now.

pub mod matcher;
pub mod scorer;

pub use matcher::{matching_workflows, trigger_matches};
pub use scorer::ContextScorer;
