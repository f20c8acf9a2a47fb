pub mod schedule_store;
pub mod workflow_store;

pub use schedule_store::ScheduleStore;
pub use workflow_store::{SeedReport, WorkflowStore};
