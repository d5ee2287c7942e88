// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] holds the immutable, validated dependency graph.
//! - [`task_info`] defines per-run task state and scheduled task types.
//! - [`state_manager`] applies per-run state transitions.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which tasks run, which retry and which are skipped.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`report`] summarises a finished run.

pub mod graph;
pub mod report;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::{DependencyGraph, DependencyGraphBuilder};
pub use report::RunReport;
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use task_info::{RetryRequest, RunState, ScheduledTask, TaskState};
