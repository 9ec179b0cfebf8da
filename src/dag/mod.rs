// src/dag/mod.rs

//! Stage graph and scheduling.
//!
//! [`DagGraph`] is the validated dependency graph between stages;
//! [`Scheduler`] walks it once per run, handing out stages as their
//! dependencies finish.

pub mod graph;
mod run;
pub mod scheduler;

pub use graph::{DagGraph, TaskSpec, stage_specs};
pub use run::{ScheduledTask, TaskRunState};
pub use scheduler::{Scheduler, SchedulerStep};
