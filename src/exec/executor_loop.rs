// src/exec/executor_loop.rs

//! Background loop that turns scheduled attempts into running tasks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dag::{DependencyGraph, ScheduledTask};
use crate::engine::{RuntimeEvent, TaskId};
use crate::exec::task_runner::run_task;
use crate::task::{RunContext, TaskServices};

/// Everything a running attempt needs, shared by all attempts of one run.
#[derive(Debug)]
pub struct ExecutionEnv {
    pub graph: Arc<DependencyGraph>,
    pub services: TaskServices,
    pub run: RunContext,
    /// Bounds how many tasks talk to the warehouse at once.
    pub permits: Arc<Semaphore>,
    pub cancel: CancellationToken,
}

impl ExecutionEnv {
    pub fn new(
        graph: Arc<DependencyGraph>,
        services: TaskServices,
        run: RunContext,
        workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            graph,
            services,
            run,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            cancel,
        }
    }
}

/// Internal handle for an attempt that has been spawned.
struct ActiveTask {
    attempt: u32,
    handle: JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// The returned sender is what [`super::WarehouseExecutor`] feeds. Each
/// attempt runs in its own Tokio task, gated by the worker semaphore. When the
/// sender side is dropped the loop waits for in-flight attempts and exits.
pub fn spawn_executor(
    env: Arc<ExecutionEnv>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> mpsc::Sender<ScheduledTask> {
    let (tx, mut rx) = mpsc::channel::<ScheduledTask>(32);

    tokio::spawn(async move {
        info!(workers = env.permits.available_permits(), "executor loop started");

        let mut active: HashMap<TaskId, ActiveTask> = HashMap::new();

        while let Some(task) = rx.recv().await {
            handle_scheduled_task(task, &mut active, &env, &runtime_tx);
        }

        for (id, running) in active.drain() {
            if running.handle.await.is_err() {
                debug!(task = %id, attempt = running.attempt, "task runner panicked or was cancelled");
            }
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

fn handle_scheduled_task(
    task: ScheduledTask,
    active: &mut HashMap<TaskId, ActiveTask>,
    env: &Arc<ExecutionEnv>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) {
    active.retain(|_, running| !running.handle.is_finished());

    if let Some(previous) = active.get(&task.id) {
        // The previous attempt already reported back; its future is just
        // unwinding.
        debug!(
            task = %task.id,
            previous_attempt = previous.attempt,
            attempt = task.attempt,
            "previous attempt still winding down"
        );
    }

    let id = task.id.clone();
    let attempt = task.attempt;
    let env = Arc::clone(env);
    let rt_tx = runtime_tx.clone();

    let handle = tokio::spawn(async move {
        let id = task.id.clone();
        run_task(task, env, rt_tx).await;
        debug!(task = %id, "task runner future finished");
    });

    active.insert(id, ActiveTask { attempt, handle });
}
