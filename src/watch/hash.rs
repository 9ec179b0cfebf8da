// src/watch/hash.rs

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::{debug, info};

use crate::engine::TaskName;
use crate::fs::FileSystem;

/// Location of the hashes file, relative to the project root.
pub const HASH_FILE_PATH: &str = ".assetpipe/hashes";

/// blake3 hash of a single file, hex encoded.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Hash of per-file hashes.
///
/// `hashes` must be ordered by file path for the result to be stable.
pub fn compute_aggregate_hash(hashes: &[String]) -> String {
    let mut hasher = Hasher::new();
    for h in hashes {
        hasher.update(h.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Storage for the last aggregated hash of each stage.
pub trait HashStore: Send + Sync {
    fn load(&self, task: &str) -> Result<Option<String>>;
    fn save(&mut self, task: &str, hash: &str) -> Result<()>;
    /// Remove hashes for tasks that are not in the `active_tasks` list.
    fn prune(&mut self, active_tasks: &[&str]) -> Result<()>;
}

/// Stores hashes in `<root>/.assetpipe/hashes`, one `name hash` per line.
pub struct FileHashStore {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileHashStore {
    pub fn new(root: PathBuf, fs: Arc<dyn FileSystem>) -> Self {
        Self { root, fs }
    }

    fn path(&self) -> PathBuf {
        self.root.join(HASH_FILE_PATH)
    }

    fn load_all(&self) -> Result<BTreeMap<TaskName, String>> {
        let path = self.path();
        if !self.fs.exists(&path) {
            return Ok(BTreeMap::new());
        }

        let contents = self
            .fs
            .read_to_string(&path)
            .with_context(|| format!("reading hash file at {:?}", path))?;
        Ok(contents
            .lines()
            .filter_map(|line| line.trim().split_once(char::is_whitespace))
            .map(|(name, hash)| (name.to_string(), hash.trim().to_string()))
            .collect())
    }

    fn save_all(&self, map: &BTreeMap<TaskName, String>) -> Result<()> {
        let contents: String = map
            .iter()
            .map(|(name, hash)| format!("{name} {hash}\n"))
            .collect();
        let path = self.path();
        self.fs
            .write(&path, contents.as_bytes())
            .with_context(|| format!("writing hash file at {:?}", path))
    }
}

impl HashStore for FileHashStore {
    fn load(&self, task: &str) -> Result<Option<String>> {
        Ok(self.load_all()?.remove(task))
    }

    fn save(&mut self, task: &str, hash: &str) -> Result<()> {
        let mut map = self.load_all()?;
        map.insert(task.to_string(), hash.to_string());
        self.save_all(&map)?;
        debug!(task = %task, hash = %hash, "stored stage hash (file)");
        Ok(())
    }

    fn prune(&mut self, active_tasks: &[&str]) -> Result<()> {
        let mut map = self.load_all()?;
        let initial_len = map.len();
        map.retain(|k, _| active_tasks.contains(&k.as_str()));

        if map.len() < initial_len {
            self.save_all(&map)?;
            info!(removed = initial_len - map.len(), "pruned stale stage hashes (file)");
        }
        Ok(())
    }
}

/// Stores hashes in memory only.
#[derive(Debug, Default)]
pub struct MemoryHashStore {
    map: HashMap<String, String>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HashStore for MemoryHashStore {
    fn load(&self, task: &str) -> Result<Option<String>> {
        Ok(self.map.get(task).cloned())
    }

    fn save(&mut self, task: &str, hash: &str) -> Result<()> {
        self.map.insert(task.to_string(), hash.to_string());
        debug!(task = %task, hash = %hash, "stored stage hash (memory)");
        Ok(())
    }

    fn prune(&mut self, active_tasks: &[&str]) -> Result<()> {
        let initial_len = self.map.len();
        self.map.retain(|k, _| active_tasks.contains(&k.as_str()));
        if self.map.len() < initial_len {
            info!(removed = initial_len - self.map.len(), "pruned stale stage hashes (memory)");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn file_store_round_trips_and_prunes() {
        let fs = MockFileSystem::new();
        let mut store = FileHashStore::new(PathBuf::from("project"), Arc::new(fs.clone()));
        store.save("styles", "abc").unwrap();
        store.save("old", "def").unwrap();
        assert_eq!(store.load("styles").unwrap().as_deref(), Some("abc"));

        store.prune(&["styles", "scripts"]).unwrap();
        assert_eq!(store.load("old").unwrap(), None);
        assert_eq!(
            fs.read_to_string(Path::new("project/.assetpipe/hashes")).unwrap(),
            "styles abc\n"
        );
    }

    #[test]
    fn file_hash_depends_on_content_only() {
        let fs = MockFileSystem::new();
        fs.add_file("a.txt", "same");
        fs.add_file("b.txt", "same");
        fs.add_file("c.txt", "other");
        let a = compute_file_hash(&fs, Path::new("a.txt")).unwrap();
        assert_eq!(a, compute_file_hash(&fs, Path::new("b.txt")).unwrap());
        assert_ne!(a, compute_file_hash(&fs, Path::new("c.txt")).unwrap());
        assert_ne!(compute_aggregate_hash(&[a.clone()]), compute_aggregate_hash(&[a.clone(), a]));
    }
}
