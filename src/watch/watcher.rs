// src/watch/watcher.rs

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::DagGraph;
use crate::engine::RuntimeEvent;
use crate::fs::FileSystem;
use crate::types::HashStorageMode;
use crate::watch::cache::FileCache;
use crate::watch::event_handler::{ChangeContext, process_file_change};
use crate::watch::hash::{FileHashStore, HashStore, MemoryHashStore};
use crate::watch::patterns::StageWatchProfile;

/// Keeps the underlying `RecommendedWatcher` alive. Dropping this handle
/// stops file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// What to watch and where to send triggers.
pub struct WatchOptions {
    /// Source root, watched recursively.
    pub source_root: PathBuf,
    /// Directory holding `.assetpipe/hashes` in file storage mode.
    pub state_root: PathBuf,
    pub profiles: Vec<StageWatchProfile>,
    pub graph: DagGraph,
    pub hash_storage: HashStorageMode,
    pub fs: Arc<dyn FileSystem>,
}

/// Spawn a filesystem watcher over the source root that sends
/// `RuntimeEvent::TasksTriggered` for stages whose patterns match a changed
/// path.
pub fn spawn_watcher(options: WatchOptions, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Result<WatcherHandle> {
    let root = options.source_root;
    let root = root.canonicalize().unwrap_or(root);

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event_tx.send(event).is_err() {
                    debug!("watch event dropped; event loop has stopped");
                }
            }
            Err(err) => warn!(error = %err, "file watch error"),
        },
        Config::default(),
    )?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("watching {:?}", root))?;
    info!(root = ?root, "file watcher started");

    let mut hash_store: Box<dyn HashStore> = match options.hash_storage {
        HashStorageMode::File => Box::new(FileHashStore::new(options.state_root, options.fs.clone())),
        HashStorageMode::Memory => Box::new(MemoryHashStore::new()),
    };

    // Prune hashes of stages that no longer exist.
    let active: Vec<&str> = options.profiles.iter().map(|p| p.name()).collect();
    if let Err(e) = hash_store.prune(&active) {
        warn!(error = %e, "failed to prune stale hashes");
    }

    let ctx = ChangeContext {
        fs: options.fs,
        root,
        profiles: Arc::new(options.profiles),
        graph: Arc::new(options.graph),
        runtime_tx,
        hash_store: Arc::new(Mutex::new(hash_store)),
        file_cache: Arc::new(Mutex::new(FileCache::new())),
    };

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if matches!(event.kind, EventKind::Access(_)) {
                continue;
            }
            debug!(?event, "received notify event");
            for path in &event.paths {
                if !process_file_change(&ctx, path).await {
                    debug!("runtime gone; stopping watcher loop");
                    return;
                }
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}
