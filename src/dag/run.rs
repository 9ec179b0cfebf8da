// src/dag/run.rs

//! Per-run bookkeeping: which stages take part in the current run and how
//! far each of them got.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::dag::DagGraph;
use crate::engine::TaskName;

/// Where a participating stage is within the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting on dependencies.
    Pending,
    /// Dispatched to the executor.
    Running,
    /// Finished; reported errors count as success.
    Succeeded,
    /// Failed, or blocked by a failed dependency.
    Failed,
}

/// Public, read-only view of a stage's state in the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    /// The stage is not participating in this run.
    NotInRun,
    Pending,
    Running,
    DoneSuccess,
    DoneFailed,
}

fn view(phase: Option<Phase>) -> TaskRunState {
    match phase {
        None => TaskRunState::NotInRun,
        Some(Phase::Pending) => TaskRunState::Pending,
        Some(Phase::Running) => TaskRunState::Running,
        Some(Phase::Succeeded) => TaskRunState::DoneSuccess,
        Some(Phase::Failed) => TaskRunState::DoneFailed,
    }
}

/// A stage the scheduler wants the executor to run now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub name: TaskName,
    /// All stages dispatched for the same run share this id.
    pub run_id: u64,
}

#[derive(Debug, Clone)]
struct Slot {
    deps: Vec<TaskName>,
    /// `None` while not participating in the current run.
    phase: Option<Phase>,
    /// Runs this stage has finished in, either way.
    finished_runs: u64,
}

/// Phases of every stage for the current run, keyed (and so iterated) by
/// stage name.
#[derive(Debug, Clone)]
pub(crate) struct RunTable {
    slots: BTreeMap<TaskName, Slot>,
}

impl RunTable {
    pub(crate) fn new(graph: &DagGraph) -> Self {
        let slots = graph
            .tasks()
            .map(|name| {
                let slot = Slot {
                    deps: graph.dependencies_of(name).to_vec(),
                    phase: None,
                    finished_runs: 0,
                };
                (name.to_string(), slot)
            })
            .collect();
        Self { slots }
    }

    pub(crate) fn contains(&self, task: &str) -> bool {
        self.slots.contains_key(task)
    }

    /// Forget every phase; nobody participates any more.
    pub(crate) fn reset(&mut self) {
        for slot in self.slots.values_mut() {
            slot.phase = None;
        }
    }

    pub(crate) fn state_of(&self, task: &str) -> Option<TaskRunState> {
        self.slots.get(task).map(|slot| view(slot.phase))
    }

    pub(crate) fn participants(&self) -> Vec<TaskName> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.phase.is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Bring `root` and everything downstream of it into the run.
    ///
    /// Stages already participating keep their phase.
    pub(crate) fn include(&mut self, graph: &DagGraph, root: &str) {
        let mut stack = vec![root.to_string()];
        let mut seen = BTreeSet::new();

        while let Some(name) = stack.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let Some(slot) = self.slots.get_mut(&name) else {
                warn!(task = %name, "stage missing from run table");
                continue;
            };
            if slot.phase.is_none() {
                slot.phase = Some(Phase::Pending);
                debug!(task = %name, "stage joins the run");
            }
            stack.extend(graph.dependents_of(&name).iter().cloned());
        }
    }

    /// Every dependency finished successfully, or is not part of the run.
    ///
    /// Running a single stage on its own therefore never waits for its
    /// upstream stages.
    pub(crate) fn deps_satisfied(&self, task: &str) -> Option<bool> {
        let slot = self.slots.get(task)?;
        Some(slot.deps.iter().all(|dep| {
            match self.slots.get(dep).map(|d| d.phase) {
                Some(Some(Phase::Succeeded)) | Some(None) => true,
                Some(Some(_)) => false,
                None => {
                    warn!(task = %task, dep = %dep, "dependency missing from run table");
                    false
                }
            }
        }))
    }

    /// Move every pending stage whose dependencies are done to `Running`
    /// and return them in name order.
    pub(crate) fn take_ready(&mut self, run_id: u64) -> Vec<ScheduledTask> {
        let ready: Vec<TaskName> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.phase == Some(Phase::Pending))
            .filter(|(name, _)| self.deps_satisfied(name) == Some(true))
            .map(|(name, _)| name.clone())
            .collect();

        ready
            .into_iter()
            .filter_map(|name| {
                let slot = self.slots.get_mut(&name)?;
                info!(
                    task = %name,
                    run_id,
                    rerun = slot.finished_runs > 0,
                    "dependencies satisfied; scheduling stage"
                );
                slot.phase = Some(Phase::Running);
                Some(ScheduledTask { name, run_id })
            })
            .collect()
    }

    /// Record the end of a stage. Returns `false` for unknown stages.
    pub(crate) fn finish(&mut self, task: &str, succeeded: bool) -> bool {
        let Some(slot) = self.slots.get_mut(task) else {
            return false;
        };
        slot.phase = Some(if succeeded { Phase::Succeeded } else { Phase::Failed });
        slot.finished_runs += 1;
        true
    }

    /// Fail every participating, unfinished stage downstream of `failed`.
    ///
    /// Returns the newly failed stages, not including `failed` itself.
    pub(crate) fn block_dependents(&mut self, graph: &DagGraph, failed: &str) -> Vec<TaskName> {
        let mut stack: Vec<TaskName> = graph.dependents_of(failed).to_vec();
        let mut blocked = Vec::new();

        while let Some(name) = stack.pop() {
            let Some(slot) = self.slots.get_mut(&name) else {
                continue;
            };
            if matches!(slot.phase, Some(Phase::Pending | Phase::Running)) {
                slot.phase = Some(Phase::Failed);
                debug!(task = %name, upstream = %failed, "stage blocked by upstream failure");
                blocked.push(name.clone());
                stack.extend(graph.dependents_of(&name).iter().cloned());
            }
        }

        blocked
    }

    /// No participating stage is pending or running.
    pub(crate) fn is_settled(&self) -> bool {
        !self
            .slots
            .values()
            .any(|slot| matches!(slot.phase, Some(Phase::Pending | Phase::Running)))
    }
}
