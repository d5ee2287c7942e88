//! Executor backend that never touches a warehouse.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use tokio::sync::mpsc;

use etldag::dag::ScheduledTask;
use etldag::engine::{RuntimeEvent, TaskOutcome};
use etldag::errors::{EtlError, Result, TaskError};
use etldag::exec::ExecutorBackend;

/// Shared log of `(task, attempt)` pairs in dispatch order.
pub type ExecutionLog = Arc<Mutex<Vec<(String, u32)>>>;

/// A fake executor that:
/// - records which attempts were dispatched
/// - immediately reports the next scripted outcome for the task, or
///   `Success` once its script is exhausted.
pub struct ScriptedExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    script: BTreeMap<String, VecDeque<TaskOutcome>>,
    executed: ExecutionLog,
}

impl ScriptedExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            script: BTreeMap::new(),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue an outcome for the next attempt of `task`.
    pub fn then(mut self, task: &str, outcome: TaskOutcome) -> Self {
        self.script.entry(task.to_string()).or_default().push_back(outcome);
        self
    }

    /// Queue `times` failures with `error`.
    pub fn failing(mut self, task: &str, times: usize, error: TaskError) -> Self {
        for _ in 0..times {
            self = self.then(task, TaskOutcome::Failed(error.clone()));
        }
        self
    }

    pub fn log(&self) -> ExecutionLog {
        Arc::clone(&self.executed)
    }
}

impl ExecutorBackend for ScriptedExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);

        let completions: Vec<RuntimeEvent> = tasks
            .into_iter()
            .map(|t| {
                executed.lock().unwrap().push((t.id.clone(), t.attempt));
                let outcome = self
                    .script
                    .get_mut(&t.id)
                    .and_then(VecDeque::pop_front)
                    .unwrap_or(TaskOutcome::Success);
                RuntimeEvent::TaskCompleted {
                    task: t.id,
                    attempt: t.attempt,
                    outcome,
                }
            })
            .collect();

        Box::pin(async move {
            for event in completions {
                tx.send(event)
                    .await
                    .map_err(|_| EtlError::Other(anyhow!("runtime channel closed")))?;
            }
            Ok(())
        })
    }
}
