// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use crate::dag::{RetryRequest, ScheduledTask, Scheduler, SchedulerStep};
use crate::engine::{TaskId, TaskOutcome};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Deliver `RetryDue` for this task after its delay.
    ScheduleRetry(RetryRequest),
    /// Every task is terminal; the run is over.
    Finish,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Seed the run with its root tasks.
pub fn start_run(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.start();
    into_core_step(scheduler, step)
}

/// Handle a task completion event.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    task: TaskId,
    attempt: u32,
    outcome: TaskOutcome,
) -> CoreStep {
    let step = scheduler.handle_completion(&task, attempt, outcome);
    into_core_step(scheduler, step)
}

/// Handle the end of a retry backoff.
pub fn handle_retry_due(scheduler: &mut Scheduler, task: TaskId) -> CoreStep {
    let step = scheduler.handle_retry_due(&task);
    into_core_step(scheduler, step)
}

/// Handle an external abort.
pub fn handle_abort(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.abort();
    into_core_step(scheduler, step)
}

fn into_core_step(scheduler: &Scheduler, step: SchedulerStep) -> CoreStep {
    let mut commands = Vec::new();

    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }
    commands.extend(step.retries.into_iter().map(CoreCommand::ScheduleRetry));

    let finished = scheduler.is_finished();
    if finished {
        commands.push(CoreCommand::Finish);
    }

    CoreStep {
        commands,
        keep_running: !finished,
    }
}
