//! Skip-if-newer filtering for copy stages.

use std::path::Path;

use crate::fs::FileSystem;

/// Whether `output` must be (re)written from `source`.
///
/// An output whose mtime is at least the source's is fresh and left alone.
/// Missing outputs and unreadable timestamps always count as stale.
pub fn is_stale(fs: &dyn FileSystem, source: &Path, output: &Path) -> bool {
    let Ok(source_time) = fs.modified(source) else {
        return true;
    };
    if !fs.is_file(output) {
        return true;
    }
    fs.modified(output)
        .map(|output_time| output_time < source_time)
        .unwrap_or(true)
}
