// src/pipeline.rs

//! One-shot pipeline runs.
//!
//! A [`Pipeline`] owns a validated [`DependencyGraph`] and the services its
//! tasks talk to. Each call to [`Pipeline::run_once`] builds a fresh
//! scheduler, executor and runtime, and drives the graph to a terminal state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::dag::{DependencyGraph, RunReport, Scheduler};
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent};
use crate::errors::Result;
use crate::exec::{ExecutionEnv, WarehouseExecutor};
use crate::task::{RunContext, TaskServices};

pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug)]
pub struct Pipeline {
    graph: Arc<DependencyGraph>,
    services: TaskServices,
    workers: usize,
    next_run_id: AtomicU64,
}

impl Pipeline {
    pub fn new(graph: impl Into<Arc<DependencyGraph>>, services: TaskServices) -> Self {
        Self {
            graph: graph.into(),
            services,
            workers: DEFAULT_WORKERS,
            next_run_id: AtomicU64::new(1),
        }
    }

    /// Upper bound on tasks executing at the same time (at least 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Execute every task once (plus retries) for the given logical run time.
    pub async fn run_once(&self, run: RunContext) -> Result<RunReport> {
        self.run_once_with_abort(run, CancellationToken::new()).await
    }

    /// Like [`Pipeline::run_once`]; cancelling `cancel` aborts the run and
    /// still yields a report.
    pub async fn run_once_with_abort(
        &self,
        run: RunContext,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        info!(
            run_id,
            logical_run_time = %run.logical_run_time,
            tasks = self.graph.len(),
            workers = self.workers,
            "starting pipeline run"
        );

        let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

        let env = Arc::new(ExecutionEnv::new(
            Arc::clone(&self.graph),
            self.services.clone(),
            run,
            self.workers,
            cancel.clone(),
        ));
        let executor = WarehouseExecutor::new(env, rt_tx.clone());

        let core = CoreRuntime::new(Scheduler::new(Arc::clone(&self.graph), run_id));
        let runtime = Runtime::new(core, rt_tx, rt_rx, executor, cancel);
        runtime.run().await
    }
}
