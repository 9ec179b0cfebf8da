use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assetpipe::config::{ConfigFile, RawConfigFile};
use assetpipe::environment::Environment;
use assetpipe::fs::RealFileSystem;
use assetpipe::paths::PathConfig;
use assetpipe::stages::BuildContext;
use assetpipe::types::TriggerWhileRunningBehaviour;
use tempfile::TempDir;

/// Builder for `ConfigFile` to simplify test setup.
#[derive(Debug, Default)]
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paths(mut self, source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        self.config.paths.source = source.into();
        self.config.paths.destination = destination.into();
        self
    }

    pub fn with_behaviour(mut self, behaviour: TriggerWhileRunningBehaviour, queue_length: usize) -> Self {
        self.config.config.triggered_while_running_behaviour = behaviour;
        self.config.config.queue_length = queue_length;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.config.images.jpeg_quality = quality;
        self
    }

    pub fn with_use_hash(mut self, val: bool) -> Self {
        self.config.watch.use_hash = val;
        self
    }

    pub fn with_exclude(mut self, pattern: &str) -> Self {
        self.config.watch.exclude.push(pattern.to_string());
        self
    }

    pub fn with_provide(mut self, name: &str, specifier: &str) -> Self {
        self.config.scripts.provide.insert(name.to_string(), specifier.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// A throwaway project on disk: `src/` holds sources, `dist/` receives
/// output. Removed when dropped.
pub struct SourceTree {
    dir: TempDir,
}

impl SourceTree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp project"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn source(&self) -> PathBuf {
        self.root().join("src")
    }

    pub fn dest(&self) -> PathBuf {
        self.root().join("dist")
    }

    /// Write a file relative to the project root, creating parents.
    pub fn file(self, rel: &str, contents: impl AsRef<[u8]>) -> Self {
        self.write(rel, contents);
        self
    }

    pub fn write(&self, rel: &str, contents: impl AsRef<[u8]>) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent directories");
        }
        fs::write(&path, contents).expect("write fixture file");
    }

    pub fn read(&self, rel: &str) -> Vec<u8> {
        fs::read(self.root().join(rel)).expect("read project file")
    }

    pub fn read_to_string(&self, rel: &str) -> String {
        fs::read_to_string(self.root().join(rel)).expect("read project file")
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.root().join(rel).exists()
    }

    pub fn paths(&self) -> Arc<PathConfig> {
        Arc::new(PathConfig::resolve(self.source(), self.dest()))
    }

    /// A build context over the real filesystem with default settings.
    pub fn context(&self, env: Environment) -> BuildContext {
        self.context_with(&ConfigFile::default(), env)
    }

    pub fn context_with(&self, cfg: &ConfigFile, env: Environment) -> BuildContext {
        BuildContext::new(cfg, self.paths(), env, Arc::new(RealFileSystem))
    }
}

impl Default for SourceTree {
    fn default() -> Self {
        Self::new()
    }
}
