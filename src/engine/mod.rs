// src/engine/mod.rs

//! Task plan execution.
//!
//! [`runner`] drives stages in order, owns the status poller for the run and
//! decides when a failure ends the run. [`state`] is the per-task state
//! machine it keeps along the way.

pub mod runner;
pub mod state;

pub use runner::{RunnerOptions, TaskRunner};
pub use state::{PlanState, TaskState};
