// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling per-stage glob patterns from the path layout.
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - (Optionally) content hashing, so a stage is not rebuilt when its
//!   watched files haven't actually changed.
//!
//! It only turns filesystem changes into stage-level triggers; the
//! scheduler decides what runs.

pub mod cache;
pub mod dag_filter;
pub mod event_handler;
pub mod hash;
pub mod patterns;
pub mod watcher;

pub use hash::{FileHashStore, HASH_FILE_PATH, HashStore, MemoryHashStore};
pub use patterns::{StageWatchProfile, build_watch_profiles};
pub use watcher::{WatcherHandle, spawn_watcher};
