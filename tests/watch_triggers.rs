// tests/watch_triggers.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, SourceTree};
use crate::common::{init_tracing, with_timeout};

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use assetpipe::config::ConfigFile;
use assetpipe::dag::DagGraph;
use assetpipe::engine::RuntimeEvent;
use assetpipe::fs::{FileSystem, RealFileSystem};
use assetpipe::watch::cache::FileCache;
use assetpipe::watch::event_handler::{ChangeContext, process_file_change};
use assetpipe::watch::{FileHashStore, HASH_FILE_PATH, HashStore, build_watch_profiles};

fn change_context(
    project: &SourceTree,
    cfg: &ConfigFile,
) -> (ChangeContext, mpsc::Receiver<RuntimeEvent>) {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let paths = project.paths();
    let (tx, rx) = mpsc::channel(16);
    let store: Box<dyn HashStore> = Box::new(FileHashStore::new(project.root().to_path_buf(), fs.clone()));

    let ctx = ChangeContext {
        fs,
        root: project.source(),
        profiles: Arc::new(build_watch_profiles(&paths, &cfg.watch).unwrap()),
        graph: Arc::new(DagGraph::stages().unwrap()),
        runtime_tx: tx,
        hash_store: Arc::new(Mutex::new(store)),
        file_cache: Arc::new(Mutex::new(FileCache::new())),
    };
    (ctx, rx)
}

fn next_batch(rx: &mut mpsc::Receiver<RuntimeEvent>) -> Option<Vec<String>> {
    match rx.try_recv() {
        Ok(RuntimeEvent::TasksTriggered { tasks, .. }) => Some(tasks),
        _ => None,
    }
}

#[tokio::test]
async fn each_category_triggers_only_its_own_stage() {
    init_tracing();
    let project = SourceTree::new()
        .file("src/index.html", "<p></p>")
        .file("src/styles.scss", "a { b: c; }")
        .file("src/scripts/lib/util.js", "export const x = 1;")
        .file("src/img/logo.svg", "<svg/>")
        .file("src/fonts/a.woff2", "font");
    let (ctx, mut rx) = change_context(&project, &ConfigFile::default());

    let cases = [
        ("src/index.html", "templates"),
        ("src/styles.scss", "styles"),
        ("src/scripts/lib/util.js", "scripts"),
        ("src/img/logo.svg", "images"),
        ("src/fonts/a.woff2", "fonts"),
    ];
    for (rel, stage) in cases {
        assert!(with_timeout(process_file_change(&ctx, &project.root().join(rel))).await);
        assert_eq!(next_batch(&mut rx), Some(vec![stage.to_string()]), "{rel}");
    }

    // Nested templates are not inputs of the template stage.
    process_file_change(&ctx, &project.root().join("src/partials/nav.html")).await;
    process_file_change(&ctx, &project.root().join("README.md")).await;
    assert_eq!(next_batch(&mut rx), None);
}

#[tokio::test]
async fn excluded_files_never_trigger() {
    init_tracing();
    let project = SourceTree::new().file("src/styles/_draft.scss", "a { b: c; }");
    let cfg = ConfigFileBuilder::new().with_exclude("**/_draft.scss").build();
    let (ctx, mut rx) = change_context(&project, &cfg);

    process_file_change(&ctx, &project.root().join("src/styles/_draft.scss")).await;
    assert_eq!(next_batch(&mut rx), None);

    process_file_change(&ctx, &project.root().join("src/styles/_base.scss")).await;
    assert_eq!(next_batch(&mut rx), Some(vec!["styles".to_string()]));
}

#[tokio::test]
async fn content_hashes_survive_restarts() {
    init_tracing();
    let project = SourceTree::new().file("src/fonts/a.woff2", "v1");
    let cfg = ConfigFileBuilder::new().with_use_hash(true).build();
    let font = project.root().join("src/fonts/a.woff2");

    let (ctx, mut rx) = change_context(&project, &cfg);
    process_file_change(&ctx, &font).await;
    assert_eq!(next_batch(&mut rx), Some(vec!["fonts".to_string()]));
    assert!(project.exists(HASH_FILE_PATH));
    drop(ctx);

    // A fresh watcher reads the stored hash and sees nothing new.
    let (ctx, mut rx) = change_context(&project, &cfg);
    process_file_change(&ctx, &font).await;
    assert_eq!(next_batch(&mut rx), None);

    project.write("src/fonts/a.woff2", "v2");
    process_file_change(&ctx, &font).await;
    assert_eq!(next_batch(&mut rx), Some(vec!["fonts".to_string()]));
}
