// src/exec/task_runner.rs

//! Single attempt runner.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::errors::TaskError;
use crate::exec::ExecutionEnv;
use crate::task::{TaskContext, TaskResult};

/// Run one attempt of a task and report its outcome as `TaskCompleted`.
///
/// Aborting the run drops the attempt (including any in-flight statement)
/// and reports it as [`TaskError::Aborted`].
pub async fn run_task(
    scheduled: ScheduledTask,
    env: Arc<ExecutionEnv>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let task_id = scheduled.id.clone();
    let attempt = scheduled.attempt;
    let run_id = scheduled.run_id;

    let result = run_task_inner(scheduled, &env).await;

    match &result {
        Ok(summary) => info!(
            task = %task_id,
            run_id,
            attempt,
            statements = summary.statements,
            note = summary.note.as_deref().unwrap_or(""),
            "task attempt succeeded"
        ),
        Err(TaskError::Aborted) => warn!(task = %task_id, run_id, attempt, "task attempt aborted"),
        Err(err) => error!(
            task = %task_id,
            run_id,
            attempt,
            retryable = err.is_retryable(),
            error = %err,
            "task attempt failed"
        ),
    }

    let event = RuntimeEvent::TaskCompleted {
        task: task_id.clone(),
        attempt,
        outcome: TaskOutcome::from(result),
    };
    if runtime_tx.send(event).await.is_err() {
        warn!(task = %task_id, run_id, attempt, "runtime gone; dropping completion");
    }
}

async fn run_task_inner(scheduled: ScheduledTask, env: &ExecutionEnv) -> TaskResult {
    let Some(task) = env.graph.task(&scheduled.id) else {
        return Err(TaskError::Internal(format!(
            "task '{}' is not part of the graph",
            scheduled.id
        )));
    };

    let _permit = tokio::select! {
        biased;
        _ = env.cancel.cancelled() => return Err(TaskError::Aborted),
        permit = Arc::clone(&env.permits).acquire_owned() => {
            permit.map_err(|_| TaskError::Aborted)?
        }
    };

    let ctx = TaskContext::new(
        &env.run,
        scheduled.run_id,
        scheduled.id.clone(),
        scheduled.attempt,
        scheduled.upstream,
    );

    info!(
        task = %task.id,
        run_id = ctx.run_id,
        attempt = ctx.attempt,
        kind = %task.kind,
        "starting task attempt"
    );

    tokio::select! {
        biased;
        _ = env.cancel.cancelled() => Err(TaskError::Aborted),
        result = task.execute(&ctx, &env.services) => result,
    }
}
