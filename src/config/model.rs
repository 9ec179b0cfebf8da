// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::environment::Environment;
use crate::paths::{DEFAULT_DESTINATION, DEFAULT_SOURCE};
use crate::types::{HashStorageMode, TriggerWhileRunningBehaviour};

/// Default dev server port.
pub const DEFAULT_PORT: u16 = 3010;

/// Top-level configuration as read from `Assetpipe.toml`.
///
/// ```toml
/// [config]
/// triggered_while_running_behaviour = "queue"
/// queue_length = 1
///
/// [paths]
/// source = "src"
/// destination = "dist"
///
/// [scripts.provide]
/// "$" = "jquery"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub scripts: ScriptsSection,
    #[serde(default)]
    pub images: ImagesSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub watch: WatchSection,
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (see `validate.rs`), so
/// holders can rely on the invariants checked there.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub paths: PathsSection,
    pub build: BuildSection,
    pub scripts: ScriptsSection,
    pub images: ImagesSection,
    pub server: ServerSection,
    pub watch: WatchSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            paths: raw.paths,
            build: raw.build,
            scripts: raw.scripts,
            images: raw.images,
            server: raw.server,
            watch: raw.watch,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(RawConfigFile::default())
    }
}

/// `[config]` section: what happens to triggers arriving mid-run.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    #[serde(default)]
    pub triggered_while_running_behaviour: TriggerWhileRunningBehaviour,

    /// Maximum number of queued runs to remember.
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,
}

fn default_queue_length() -> usize {
    1
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            triggered_while_running_behaviour: TriggerWhileRunningBehaviour::default(),
            queue_length: default_queue_length(),
        }
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    #[serde(default = "default_source")]
    pub source: PathBuf,
    #[serde(default = "default_destination")]
    pub destination: PathBuf,
}

fn default_source() -> PathBuf {
    PathBuf::from(DEFAULT_SOURCE)
}

fn default_destination() -> PathBuf {
    PathBuf::from(DEFAULT_DESTINATION)
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            source: default_source(),
            destination: default_destination(),
        }
    }
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    /// Used only when neither `--env` nor `ASSETPIPE_ENV` is set.
    #[serde(default)]
    pub environment: Option<Environment>,

    /// Browserslist queries for CSS prefixing.
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,
}

fn default_browsers() -> Vec<String> {
    vec!["last 2 versions".to_string()]
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            environment: None,
            browsers: default_browsers(),
        }
    }
}

/// `[scripts]` section: bundler knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptsSection {
    /// ECMAScript level the bundle is lowered to.
    #[serde(default = "default_js_target")]
    pub target: String,

    /// Global name → module specifier, made available to every module that
    /// references the name without importing it.
    #[serde(default = "default_provide")]
    pub provide: BTreeMap<String, String>,

    /// Libraries whose named imports are rewritten to per-method modules.
    #[serde(default = "default_cherry_pick")]
    pub cherry_pick: Vec<String>,
}

fn default_js_target() -> String {
    "es2020".to_string()
}

fn default_provide() -> BTreeMap<String, String> {
    ["$", "jQuery", "window.jQuery", "window.$"]
        .into_iter()
        .map(|name| (name.to_string(), "jquery".to_string()))
        .collect()
}

fn default_cherry_pick() -> Vec<String> {
    vec!["lodash".to_string()]
}

impl Default for ScriptsSection {
    fn default() -> Self {
        Self {
            target: default_js_target(),
            provide: default_provide(),
            cherry_pick: default_cherry_pick(),
        }
    }
}

/// `[images]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ImagesSection {
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_jpeg_quality() -> u8 {
    90
}

impl Default for ImagesSection {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchSection {
    /// Only rebuild when the aggregated contents of a category change.
    #[serde(default)]
    pub use_hash: bool,

    #[serde(default)]
    pub hash_storage: HashStorageMode,

    /// Globs (relative to the source root) never treated as changes.
    #[serde(default)]
    pub exclude: Vec<String>,
}
