// src/exec/mod.rs

//! Task execution layer.
//!
//! This module runs [`crate::task::Task`]s against the warehouse and reports
//! each attempt back to the orchestration runtime as a
//! [`crate::engine::RuntimeEvent::TaskCompleted`].
//!
//! - [`executor_loop`] owns the background loop and the worker pool.
//! - [`task_runner`] runs a single attempt.
//! - [`backend`] provides the `ExecutorBackend` trait and the
//!   `WarehouseExecutor` used in production; tests swap in a fake.

pub mod backend;
pub mod executor_loop;
pub mod task_runner;

pub use backend::{ExecutorBackend, WarehouseExecutor};
pub use executor_loop::{spawn_executor, ExecutionEnv};
