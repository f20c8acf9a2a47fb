pub mod execution;
pub mod schedule;
pub mod signal;
pub mod workflow;

pub use execution::*;
pub use schedule::*;
pub use signal::*;
pub use workflow::*;
