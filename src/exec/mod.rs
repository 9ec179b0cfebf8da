// src/exec/mod.rs

//! Stage execution layer.
//!
//! Stages are synchronous, so each dispatched task runs on Tokio's blocking
//! pool and reports back to the orchestration runtime via `RuntimeEvent`s.
//!
//! - [`executor_loop`] owns the main loop and keeps at most one instance
//!   of each stage in flight.
//! - [`task_runner`] runs one stage instance.
//! - [`backend`] provides the `ExecutorBackend` trait, the
//!   `StageExecutorBackend` used in production, and the `StageRunner` seam
//!   that tests replace with fakes.

pub mod backend;
pub mod executor_loop;
pub mod task_runner;

pub use backend::{ExecutorBackend, StageExecutorBackend, StageRunner};
pub use executor_loop::spawn_executor;
