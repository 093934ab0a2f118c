//! Runtime: the stepping scheduler and stepping-thread placement.
//!
//! - `scheduler`: stepping thread, simulation clock and deterministic run
//!   primitives.
//! - `topology`: CPU detection and core pinning for the stepping thread.

pub mod scheduler;
pub mod topology;

pub use scheduler::{SchedulerConfig, SchedulerError, StepScheduler};
