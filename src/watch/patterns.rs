// src/watch/patterns.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::config::WatchSection;
use crate::engine::TaskName;
use crate::fs::{FileSystem, walk_files};
use crate::paths::{AssetCategory, PathConfig};

/// Compiled watch/exclude patterns for one stage.
///
/// Patterns are relative to the source root; the watcher passes relative
/// paths such as `"styles/_base.scss"` into [`StageWatchProfile::matches`].
#[derive(Clone)]
pub struct StageWatchProfile {
    name: TaskName,
    watch_set: GlobSet,
    exclude_set: Option<GlobSet>,
    use_hash: bool,
}

impl fmt::Debug for StageWatchProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageWatchProfile")
            .field("name", &self.name)
            .field("use_hash", &self.use_hash)
            .finish_non_exhaustive()
    }
}

impl StageWatchProfile {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether triggers wait for the aggregated content hash to change.
    pub fn use_hash(&self) -> bool {
        self.use_hash
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.watch_set.is_match(rel_path) {
            return false;
        }
        match &self.exclude_set {
            Some(exclude) => !exclude.is_match(rel_path),
            None => true,
        }
    }
}

/// One profile per asset category, in category order.
pub fn build_watch_profiles(paths: &PathConfig, watch: &WatchSection) -> Result<Vec<StageWatchProfile>> {
    let exclude_set = if watch.exclude.is_empty() {
        None
    } else {
        Some(build_globset(&watch.exclude).context("building exclude globset")?)
    };

    AssetCategory::ALL
        .into_iter()
        .map(|category| {
            let patterns = paths.watch_patterns(category);
            let watch_set = build_globset(&patterns)
                .with_context(|| format!("building watch globset for stage {category}"))?;
            Ok(StageWatchProfile {
                name: category.name().to_string(),
                watch_set,
                exclude_set: exclude_set.clone(),
                use_hash: watch.use_hash,
            })
        })
        .collect()
}

/// `*` never crosses a directory separator, matching how stages collect
/// their inputs.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Files under `root` that the profile is interested in, sorted.
///
/// Used when computing aggregated hashes for `use_hash` profiles.
pub fn collect_matching_files(
    fs: &dyn FileSystem,
    root: &Path,
    profile: &StageWatchProfile,
) -> Result<Vec<PathBuf>> {
    Ok(walk_files(fs, root)?
        .into_iter()
        .filter(|path| {
            path.strip_prefix(root)
                .map(|rel| profile.matches(&rel.to_string_lossy().replace('\\', "/")))
                .unwrap_or(false)
        })
        .collect())
}
