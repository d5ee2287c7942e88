// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::{RetryRequest, RunReport, ScheduledTask};
use crate::errors::Result;
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent};

/// Drives the DAG scheduler in response to `RuntimeEvent`s,
/// and delegates actual task execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading events from
/// channels, arming retry timers and dispatching tasks to the executor.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    /// Used by retry timers to report back.
    event_tx: mpsc::Sender<RuntimeEvent>,
    executor: E,
    cancel: CancellationToken,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    /// `event_tx` must feed `event_rx`; cancelling `cancel` aborts the run.
    pub fn new(
        core: CoreRuntime,
        event_tx: mpsc::Sender<RuntimeEvent>,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            core,
            event_rx,
            event_tx,
            executor,
            cancel,
        }
    }

    /// Main event loop; returns once every task is terminal.
    ///
    /// - Seeds the run with the root tasks.
    /// - Consumes `RuntimeEvent`s from `event_rx` (and the abort token).
    /// - Feeds them into the core runtime.
    /// - Executes the returned commands.
    pub async fn run(mut self) -> Result<RunReport> {
        info!(run_id = self.core.scheduler().run_id(), "runtime started");

        let step = self.core.start();
        let mut keep_running = step.keep_running;
        for command in step.commands {
            self.execute_command(command).await?;
        }

        let mut abort_seen = false;

        while keep_running {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled(), if !abort_seen => {
                    abort_seen = true;
                    RuntimeEvent::AbortRequested
                }
                received = self.event_rx.recv() => match received {
                    Some(e) => e,
                    None => {
                        warn!("runtime event channel closed before the run finished");
                        break;
                    }
                },
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            for command in step.commands {
                self.execute_command(command).await?;
            }
            keep_running = step.keep_running;
        }

        let report = self.core.report();
        info!(
            run_id = report.run_id,
            success = report.is_success(),
            "runtime exiting"
        );
        Ok(report)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => {
                self.spawn_ready(tasks).await?;
            }
            CoreCommand::ScheduleRetry(request) => {
                self.arm_retry_timer(request);
            }
            CoreCommand::Finish => {
                debug!("core issued Finish command");
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        debug!(?ids, "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }

    /// Sleep out the backoff, unless the run is aborted first.
    fn arm_retry_timer(&self, request: RetryRequest) {
        let tx = self.event_tx.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(request.delay) => {
                    let _ = tx.send(RuntimeEvent::RetryDue { task: request.id }).await;
                }
                _ = cancel.cancelled() => {
                    debug!(task = %request.id, "retry backoff cancelled");
                }
            }
        });
    }
}
