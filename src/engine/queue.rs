// src/engine/queue.rs

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};

use crate::engine::TaskName;
use crate::types::TriggerWhileRunningBehaviour;

/// Queue of triggers that arrive while a build run is already executing.
///
/// Semantics:
/// - Each queued entry represents a *batch* of task names that should be
///   treated as triggers for a future build run.
/// - `queue_length` (max_runs) defines how many such batches to keep. The
///   default is 1: at most one future run is queued.
/// - When the runtime is idle and wants to start a new run, it calls
///   `drain_pending()`, which merges all queued batches into a single set of
///   task names for that run.
///
/// If `styles` and `scripts` both change during a run, the next run unions
/// them and `templates` still runs only once.
#[derive(Debug)]
pub struct TriggerQueue {
    behaviour: TriggerWhileRunningBehaviour,
    max_runs: usize,
    /// Each entry is a set of tasks that should be triggered together as one
    /// "batch" when the current run completes.
    runs: VecDeque<HashSet<TaskName>>,
}

impl TriggerQueue {
    /// Create a new queue with the given behaviour and maximum queued runs.
    ///
    /// `max_runs` is clamped to at least 1, as a zero-length queue would make
    /// queuing semantics meaningless.
    pub fn new(behaviour: TriggerWhileRunningBehaviour, max_runs: usize) -> Self {
        let max_runs = max_runs.max(1);
        Self {
            behaviour,
            max_runs,
            runs: VecDeque::new(),
        }
    }

    /// Returns true if there are no queued triggers.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Returns the configured behaviour.
    pub fn behaviour(&self) -> TriggerWhileRunningBehaviour {
        self.behaviour
    }

    /// Record that a task was triggered while a run is in progress.
    ///
    /// How this is stored depends on the configured behaviour:
    ///
    /// - `Queue`:
    ///   - If there is already at least one queued batch, we merge this task
    ///     into the *last* batch (coalescing multiple triggers into the same
    ///     future run).
    ///   - If there are no batches yet, we create a new one.
    ///   - If the number of batches exceeds `max_runs`, we drop the oldest.
    ///
    /// - `Cancel`:
    ///   - We drop all existing batches and keep only a single batch containing
    ///     this task.
    pub fn record_trigger(&mut self, task: &str) {
        let name = task.to_string();

        match self.behaviour {
            TriggerWhileRunningBehaviour::Queue => {
                if let Some(last_batch) = self.runs.back_mut() {
                    let inserted = last_batch.insert(name.clone());
                    debug!(
                        task = %name,
                        inserted,
                        "merged trigger into last queued batch (queue mode)",
                    );
                } else {
                    let mut set = HashSet::new();
                    set.insert(name.clone());
                    self.runs.push_back(set);
                    debug!(task = %name, "created first queued batch (queue mode)");
                }

                if self.runs.len() > self.max_runs {
                    warn!(
                        current_batches = self.runs.len(),
                        max_runs = self.max_runs,
                        "exceeded max_runs; dropping oldest queued batches"
                    );
                    while self.runs.len() > self.max_runs {
                        self.runs.pop_front();
                    }
                }
            }
            TriggerWhileRunningBehaviour::Cancel => {
                debug!(
                    task = %name,
                    "resetting queued batches to this task only (cancel mode)"
                );
                self.runs.clear();
                let mut set = HashSet::new();
                set.insert(name.clone());
                self.runs.push_back(set);
            }
        }
    }

    /// Drain all pending queued batches and merge them into a single vector of
    /// task names.
    ///
    /// Called when the scheduler becomes idle, to seed the next run.
    pub fn drain_pending(&mut self) -> Vec<TaskName> {
        let mut merged: HashSet<TaskName> = HashSet::new();

        while let Some(batch) = self.runs.pop_front() {
            merged.extend(batch);
        }

        let tasks: Vec<TaskName> = merged.into_iter().collect();
        debug!(drained = tasks.len(), "drained queued triggers into new run");
        tasks
    }
}
