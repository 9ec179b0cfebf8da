// src/exec/task_runner.rs

//! Individual stage instance runner.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::exec::backend::StageRunner;

/// Run one stage instance on the blocking pool and emit `TaskCompleted`.
///
/// If the cancel channel fires first, the instance is abandoned and **no**
/// `TaskCompleted` event is sent for it. The blocking job itself runs to
/// completion in the background, holding the stage lock until it returns.
pub async fn run_task(
    task: ScheduledTask,
    runner: Arc<dyn StageRunner>,
    lock: Arc<Mutex<()>>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel_rx: oneshot::Receiver<()>,
) {
    let task_name = task.name.clone();
    let run_id = task.run_id;
    if let Err(err) = run_task_inner(task, runner, lock, &runtime_tx, cancel_rx).await {
        error!(task = %task_name, run_id, error = %err, "stage execution error");
        let _ = runtime_tx
            .send(RuntimeEvent::TaskCompleted {
                task: task_name,
                outcome: TaskOutcome::Failed,
            })
            .await;
    }
}

async fn run_task_inner(
    task: ScheduledTask,
    runner: Arc<dyn StageRunner>,
    lock: Arc<Mutex<()>>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) -> Result<()> {
    info!(task = %task.name, run_id = task.run_id, "starting stage");

    let name = task.name.clone();
    let mut job = tokio::task::spawn_blocking(move || {
        // A poisoned lock only means an earlier instance panicked.
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        runner.run(&name)
    });

    let outcome = tokio::select! {
        joined = &mut job => joined
            .with_context(|| format!("stage '{}' panicked", task.name))?,

        cancel = &mut cancel_rx => match cancel {
            Ok(()) => {
                info!(
                    task = %task.name,
                    run_id = task.run_id,
                    "cancellation requested; abandoning stage instance"
                );
                return Ok(());
            }
            Err(_) => {
                debug!(task = %task.name, run_id = task.run_id, "cancel channel dropped");
                job.await
                    .with_context(|| format!("stage '{}' panicked", task.name))?
            }
        },
    };

    info!(task = %task.name, run_id = task.run_id, ?outcome, "stage exited");

    runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            task: task.name.clone(),
            outcome,
        })
        .await
        .with_context(|| format!("sending TaskCompleted event for stage '{}' to runtime", task.name))?;

    Ok(())
}
