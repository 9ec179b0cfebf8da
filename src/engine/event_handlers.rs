// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::dag::{ScheduledTask, Scheduler, TaskRunState};
use crate::engine::queue::TriggerQueue;
use crate::engine::{RuntimeOptions, TaskName, TaskOutcome, TriggerReason};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// A run finished; connected browsers should reload.
    NotifyReload,
    /// Request that the process exits (one-shot builds, once idle).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute (send tasks, reload, exit).
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn running(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }
}

/// Handle one or more triggers arriving together.
///
/// - If the scheduler is idle, we start a new run and seed it with these
///   triggers plus anything that was already queued.
/// - If a run is active:
///   - tasks already participating in this run are recorded in the queue
///     for a *future* run;
///   - tasks not in the run are merged into it immediately, sharing its
///     run id.
pub fn handle_task_triggers(
    scheduler: &mut Scheduler,
    queue: &mut TriggerQueue,
    failed: &mut BTreeSet<TaskName>,
    tasks: Vec<TaskName>,
    reason: TriggerReason,
) -> CoreStep {
    let mut commands = Vec::new();
    debug!(?tasks, ?reason, "handling trigger");

    if scheduler.is_idle() {
        let mut triggers: HashSet<TaskName> = queue.drain_pending().into_iter().collect();
        triggers.extend(tasks);

        let mut step = start_new_run_from_triggers(scheduler, failed, triggers.into_iter().collect());
        commands.append(&mut step.commands);
        return CoreStep::running(commands);
    }

    let mut merged = Vec::new();
    for task in tasks {
        match scheduler.run_state_of(&task) {
            None => {
                debug!(task = %task, "trigger for unknown task; ignoring");
            }
            Some(TaskRunState::NotInRun) => merged.push(task),
            Some(_already_in_run) => queue.record_trigger(&task),
        }
    }

    if !merged.is_empty() {
        let newly_ready = scheduler.handle_triggers(&merged);
        if !newly_ready.is_empty() {
            commands.push(CoreCommand::DispatchTasks(newly_ready));
        }
    }

    CoreStep::running(commands)
}

/// Handle a task completion event.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    queue: &mut TriggerQueue,
    failed: &mut BTreeSet<TaskName>,
    options: &RuntimeOptions,
    task: TaskName,
    outcome: TaskOutcome,
) -> CoreStep {
    let mut commands = Vec::new();

    let step = scheduler.step_completion(&task, outcome);
    failed.extend(step.newly_failed);
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }
    if step.run_just_finished && options.live_reload {
        commands.push(CoreCommand::NotifyReload);
    }

    let mut queued_cmds = maybe_start_queued_run(scheduler, queue, failed);
    commands.append(&mut queued_cmds);

    // One-shot builds exit once idle with nothing queued.
    let mut keep_running = true;
    if options.exit_when_idle && scheduler.is_idle() && queue.is_empty() {
        keep_running = false;
        commands.push(CoreCommand::RequestExit);
    }

    CoreStep {
        commands,
        keep_running,
    }
}

/// Seed a new run from a batch of triggers.
///
/// Failures recorded for the previous run are forgotten.
pub fn start_new_run_from_triggers(
    scheduler: &mut Scheduler,
    failed: &mut BTreeSet<TaskName>,
    mut triggers: Vec<TaskName>,
) -> CoreStep {
    let mut commands = Vec::new();

    if triggers.is_empty() {
        return CoreStep::running(commands);
    }
    triggers.sort();

    failed.clear();
    scheduler.start_new_run();

    let ready = scheduler.handle_triggers(&triggers);
    if !ready.is_empty() {
        commands.push(CoreCommand::DispatchTasks(ready));
    }

    CoreStep::running(commands)
}

/// If the scheduler is idle and there are queued triggers, start a new run.
fn maybe_start_queued_run(
    scheduler: &mut Scheduler,
    queue: &mut TriggerQueue,
    failed: &mut BTreeSet<TaskName>,
) -> Vec<CoreCommand> {
    if !scheduler.is_idle() {
        return Vec::new();
    }

    let triggers = queue.drain_pending();
    if triggers.is_empty() {
        return Vec::new();
    }

    start_new_run_from_triggers(scheduler, failed, triggers).commands
}
