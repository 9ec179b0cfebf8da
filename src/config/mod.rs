// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk, or fall back to defaults (`loader.rs`).
//! - Validate invariants such as "destination never contains the source"
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_raw_or_default};
pub use model::{
    BuildSection, ConfigFile, ConfigSection, ImagesSection, PathsSection, RawConfigFile,
    ScriptsSection, ServerSection, WatchSection,
};
