// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender,
//! so tests can replace warehouse execution with a scripted fake.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::errors::{EtlError, Result};

use super::executor_loop::{spawn_executor, ExecutionEnv};

/// Trait abstracting how scheduled tasks are executed.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    ///
    /// Every dispatched attempt must eventually produce exactly one
    /// `RuntimeEvent::TaskCompleted` carrying the same task id and attempt.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Executor backend that runs tasks against the configured warehouse.
///
/// Wraps the background loop started by [`spawn_executor`]; the runtime's
/// `spawn_ready_tasks` calls are forwarded over an mpsc channel.
pub struct WarehouseExecutor {
    tx: mpsc::Sender<ScheduledTask>,
}

impl WarehouseExecutor {
    /// Spawns the background executor loop immediately.
    pub fn new(env: Arc<ExecutionEnv>, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        let tx = spawn_executor(env, runtime_tx);
        Self { tx }
    }
}

impl ExecutorBackend for WarehouseExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();

        Box::pin(async move {
            for task in tasks {
                let id = task.id.clone();
                tx.send(task).await.map_err(|_| {
                    EtlError::Other(anyhow!("executor loop stopped before task '{id}' was sent"))
                })?;
            }
            Ok(())
        })
    }
}
