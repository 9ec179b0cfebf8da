// src/watch/event_handler.rs

//! Event processing logic for file system changes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::DagGraph;
use crate::engine::{RuntimeEvent, TriggerReason};
use crate::fs::FileSystem;
use crate::watch::cache::FileCache;
use crate::watch::dag_filter::has_ancestor_in_matching;
use crate::watch::hash::{HashStore, compute_aggregate_hash};
use crate::watch::patterns::{StageWatchProfile, collect_matching_files};

/// Shared state of the watcher's event loop.
pub struct ChangeContext {
    pub fs: Arc<dyn FileSystem>,
    /// Source root; profile patterns are relative to it.
    pub root: PathBuf,
    pub profiles: Arc<Vec<StageWatchProfile>>,
    pub graph: Arc<DagGraph>,
    pub runtime_tx: mpsc::Sender<RuntimeEvent>,
    pub hash_store: Arc<Mutex<Box<dyn HashStore>>>,
    pub file_cache: Arc<Mutex<FileCache>>,
}

/// Turn one changed path into stage triggers.
///
/// 1. Find every stage whose patterns match the path.
/// 2. Drop stages with a matching upstream stage (they run as dependents).
/// 3. Drop `use_hash` stages whose watched content is unchanged.
/// 4. Send the rest to the runtime as one batch.
///
/// Returns `false` once the runtime channel is closed.
pub async fn process_file_change(ctx: &ChangeContext, path: &Path) -> bool {
    let Some(rel_str) = relative_str(&ctx.root, path) else {
        debug!(?path, root = ?ctx.root, "event outside the source root");
        return true;
    };

    let matching: Vec<&StageWatchProfile> = ctx.profiles.iter().filter(|p| p.matches(&rel_str)).collect();
    if matching.is_empty() {
        return true;
    }

    let matching_names: HashSet<&str> = matching.iter().map(|p| p.name()).collect();
    let roots: Vec<&StageWatchProfile> = matching
        .into_iter()
        .filter(|p| !has_ancestor_in_matching(p.name(), &matching_names, &ctx.graph))
        .collect();

    let mut tasks = Vec::new();
    for profile in roots {
        if should_trigger_task(ctx, path, &rel_str, profile).await {
            tasks.push(profile.name().to_string());
        }
    }
    if tasks.is_empty() {
        return true;
    }

    info!(path = %rel_str, ?tasks, "change detected; triggering stages");
    let event = RuntimeEvent::TasksTriggered {
        tasks,
        reason: TriggerReason::FileWatch,
    };
    if let Err(err) = ctx.runtime_tx.send(event).await {
        warn!("failed to send RuntimeEvent::TasksTriggered: {err}");
        return false;
    }
    true
}

/// Path relative to `root` with forward slashes, falling back to
/// canonical paths when the event uses a different absolute prefix (e.g.
/// `/private/var` on macOS).
fn relative_str(root: &Path, path: &Path) -> Option<String> {
    let rel = match path.strip_prefix(root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => {
            let root = root.canonicalize().ok()?;
            let path = path.canonicalize().ok()?;
            path.strip_prefix(&root).ok()?.to_path_buf()
        }
    };
    Some(rel.to_string_lossy().replace('\\', "/"))
}

/// Whether a matching stage should be triggered, honouring `use_hash`.
///
/// Any hashing problem errs on the side of triggering.
async fn should_trigger_task(ctx: &ChangeContext, abs_path: &Path, rel_path: &str, profile: &StageWatchProfile) -> bool {
    if !profile.use_hash() {
        return true;
    }

    let fs = Arc::clone(&ctx.fs);
    let root = ctx.root.clone();
    let abs_path = abs_path.to_path_buf();
    let profile = profile.clone();
    let rel_path = rel_path.to_string();
    let hash_store = Arc::clone(&ctx.hash_store);
    let file_cache = Arc::clone(&ctx.file_cache);

    tokio::task::spawn_blocking(move || {
        let task_name = profile.name();
        let files = match collect_matching_files(fs.as_ref(), &root, &profile) {
            Ok(f) => f,
            Err(err) => {
                warn!(task = %task_name, error = %err, "failed to collect watched files; triggering anyway");
                return true;
            }
        };

        let file_hashes = {
            let Ok(mut cache) = file_cache.lock() else {
                warn!("file cache mutex poisoned; triggering anyway");
                return true;
            };
            cache.invalidate(&abs_path);

            let mut hashes = Vec::with_capacity(files.len());
            for file_path in files {
                match cache.get_or_compute(fs.as_ref(), &file_path) {
                    Ok(h) => hashes.push(h),
                    Err(err) => {
                        warn!(task = %task_name, file = ?file_path, error = %err, "failed to compute file hash; triggering anyway");
                        return true;
                    }
                }
            }
            hashes
        };
        let new_hash = compute_aggregate_hash(&file_hashes);

        let Ok(mut store) = hash_store.lock() else {
            warn!(task = %task_name, "hash store mutex poisoned; triggering anyway");
            return true;
        };
        match store.load(task_name) {
            Ok(Some(old_hash)) if old_hash == new_hash => {
                info!(task = %task_name, path = %rel_path, "watched content unchanged; skipping rebuild");
                false
            }
            Ok(_) => {
                if let Err(err) = store.save(task_name, &new_hash) {
                    warn!(task = %task_name, error = %err, "failed to save stage hash");
                }
                true
            }
            Err(err) => {
                warn!(task = %task_name, error = %err, "failed to load stage hash; triggering anyway");
                true
            }
        }
    })
    .await
    .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchSection;
    use crate::fs::mock::MockFileSystem;
    use crate::paths::PathConfig;
    use crate::watch::hash::MemoryHashStore;
    use crate::watch::patterns::build_watch_profiles;

    fn context(fs: &MockFileSystem, use_hash: bool) -> (ChangeContext, mpsc::Receiver<RuntimeEvent>) {
        let watch = WatchSection {
            use_hash,
            ..WatchSection::default()
        };
        let (tx, rx) = mpsc::channel(8);
        let ctx = ChangeContext {
            fs: Arc::new(fs.clone()),
            root: PathBuf::from("src"),
            profiles: Arc::new(build_watch_profiles(&PathConfig::default(), &watch).unwrap()),
            graph: Arc::new(DagGraph::stages().unwrap()),
            runtime_tx: tx,
            hash_store: Arc::new(Mutex::new(Box::new(MemoryHashStore::new()) as Box<dyn HashStore>)),
            file_cache: Arc::new(Mutex::new(FileCache::new())),
        };
        (ctx, rx)
    }

    fn triggered(rx: &mut mpsc::Receiver<RuntimeEvent>) -> Option<Vec<String>> {
        match rx.try_recv() {
            Ok(RuntimeEvent::TasksTriggered { tasks, reason }) => {
                assert_eq!(reason, TriggerReason::FileWatch);
                Some(tasks)
            }
            _ => None,
        }
    }

    #[tokio::test]
    async fn changed_stylesheet_triggers_styles() {
        let fs = MockFileSystem::new();
        let (ctx, mut rx) = context(&fs, false);
        assert!(process_file_change(&ctx, Path::new("src/styles/_base.scss")).await);
        assert_eq!(triggered(&mut rx), Some(vec!["styles".to_string()]));

        process_file_change(&ctx, Path::new("src/notes.txt")).await;
        process_file_change(&ctx, Path::new("elsewhere/index.html")).await;
        assert_eq!(triggered(&mut rx), None);
    }

    #[tokio::test]
    async fn unchanged_content_is_skipped_with_hashing() {
        let fs = MockFileSystem::new();
        fs.add_file("src/fonts/a.woff2", "v1");
        let (ctx, mut rx) = context(&fs, true);
        let path = Path::new("src/fonts/a.woff2");

        process_file_change(&ctx, path).await;
        assert_eq!(triggered(&mut rx), Some(vec!["fonts".to_string()]));

        process_file_change(&ctx, path).await;
        assert_eq!(triggered(&mut rx), None);

        fs.add_file(path, "v2");
        process_file_change(&ctx, path).await;
        assert_eq!(triggered(&mut rx), Some(vec!["fonts".to_string()]));
    }

    #[tokio::test]
    async fn closed_runtime_stops_the_loop() {
        let fs = MockFileSystem::new();
        let (ctx, rx) = context(&fs, false);
        drop(rx);
        assert!(!process_file_change(&ctx, Path::new("src/index.html")).await);
    }
}
