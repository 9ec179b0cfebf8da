// src/exec/executor_loop.rs

//! Main executor loop that manages running stage instances.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::exec::backend::StageRunner;
use crate::exec::task_runner::run_task;

/// Internal handle for a currently-running stage instance.
///
/// `cancel` abandons the instance: its result is discarded and no
/// completion is reported for it.
struct ActiveTask {
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// Each scheduled task runs in its own Tokio task, so different stages run
/// in parallel. Per stage name there is never more than one instance doing
/// work: a new dispatch cancels the previous instance, and the new one
/// waits on the stage's lock until the old blocking job has returned.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    runner: Arc<dyn StageRunner>,
) -> mpsc::Sender<ScheduledTask> {
    let (tx, mut rx) = mpsc::channel::<ScheduledTask>(32);

    tokio::spawn(async move {
        info!("executor loop started");

        let mut active: HashMap<String, ActiveTask> = HashMap::new();
        let mut locks: HashMap<String, Arc<Mutex<()>>> = HashMap::new();

        while let Some(task) = rx.recv().await {
            let lock = locks.entry(task.name.clone()).or_default().clone();
            handle_scheduled_task(task, &mut active, lock, &runner, &runtime_tx);
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

fn handle_scheduled_task(
    task: ScheduledTask,
    active: &mut HashMap<String, ActiveTask>,
    lock: Arc<Mutex<()>>,
    runner: &Arc<dyn StageRunner>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) {
    let name = task.name.clone();

    if let Some(existing) = active.get_mut(&name) {
        if !existing.handle.is_finished() {
            cancel_existing_task(&task, existing);
        }
    }

    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let rt_tx = runtime_tx.clone();
    let runner = runner.clone();
    let spawn_name = name.clone();

    let handle = tokio::spawn(async move {
        run_task(task, runner, lock, rt_tx, cancel_rx).await;
        debug!(task = %spawn_name, "task runner future finished");
    });

    active.insert(
        name,
        ActiveTask {
            cancel: Some(cancel_tx),
            handle,
        },
    );
}

fn cancel_existing_task(task: &ScheduledTask, existing: &mut ActiveTask) {
    info!(
        task = %task.name,
        run_id = task.run_id,
        "stage dispatched again; cancelling previous instance"
    );

    if let Some(cancel) = existing.cancel.take() {
        if cancel.send(()).is_err() {
            debug!(
                task = %task.name,
                run_id = task.run_id,
                "previous instance already finished while cancelling"
            );
        }
    }
}
