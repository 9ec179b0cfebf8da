//! Module specifier resolution.
//!
//! Relative and absolute specifiers resolve against the importing module's
//! directory. Bare specifiers are looked up in `node_modules` directories
//! from the importer upwards, honouring the `browser`, `module` and `main`
//! fields of `package.json`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::trace;

use crate::fs::FileSystem;
use crate::paths::normalize;

/// Extensions tried, in order, when a specifier names a file without one.
const EXTENSIONS: [&str; 4] = ["js", "mjs", "cjs", "json"];

#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    /// Only the string form is honoured; object remaps are ignored.
    #[serde(default)]
    browser: Option<serde_json::Value>,
    #[serde(default)]
    module: Option<String>,
    #[serde(default)]
    main: Option<String>,
}

impl PackageManifest {
    fn entry_fields(&self) -> impl Iterator<Item = &str> {
        let browser = self.browser.as_ref().and_then(|b| b.as_str());
        browser
            .into_iter()
            .chain(self.module.as_deref())
            .chain(self.main.as_deref())
    }
}

/// Whether `specifier` is a path rather than a package name.
pub fn is_path_specifier(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
        || specifier == "."
        || specifier == ".."
}

/// Resolve `specifier` as imported from a module in `from_dir`.
pub fn resolve(fs: &dyn FileSystem, from_dir: &Path, specifier: &str) -> Option<PathBuf> {
    let resolved = if is_path_specifier(specifier) {
        resolve_path(fs, &normalize(&from_dir.join(specifier)))
    } else {
        resolve_package(fs, from_dir, specifier)
    };
    trace!(specifier, from = ?from_dir, resolved = ?resolved, "resolve");
    resolved
}

/// Split `@scope/name/sub/path` or `name/sub/path` into package name and
/// optional subpath.
fn split_package(specifier: &str) -> (&str, Option<&str>) {
    let name_segments = if specifier.starts_with('@') { 2 } else { 1 };
    let mut boundary = None;
    for (count, (idx, _)) in specifier.match_indices('/').enumerate() {
        if count + 1 == name_segments {
            boundary = Some(idx);
            break;
        }
    }
    match boundary {
        Some(idx) => (&specifier[..idx], Some(&specifier[idx + 1..])),
        None => (specifier, None),
    }
}

fn resolve_package(fs: &dyn FileSystem, from_dir: &Path, specifier: &str) -> Option<PathBuf> {
    let (name, subpath) = split_package(specifier);
    for dir in from_dir.ancestors() {
        let package_dir = dir.join("node_modules").join(name);
        if !fs.is_dir(&package_dir) {
            continue;
        }
        return match subpath {
            Some(sub) => resolve_path(fs, &normalize(&package_dir.join(sub))),
            None => resolve_dir(fs, &package_dir),
        };
    }
    None
}

/// A file, the file with a known extension appended, or a directory.
fn resolve_path(fs: &dyn FileSystem, path: &Path) -> Option<PathBuf> {
    resolve_file(fs, path).or_else(|| resolve_dir(fs, path))
}

fn resolve_file(fs: &dyn FileSystem, path: &Path) -> Option<PathBuf> {
    if fs.is_file(path) {
        return Some(path.to_path_buf());
    }
    EXTENSIONS.iter().find_map(|ext| {
        let mut candidate = OsString::from(path.as_os_str());
        candidate.push(".");
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        fs.is_file(&candidate).then_some(candidate)
    })
}

/// `dir` is already normalised.
fn resolve_dir(fs: &dyn FileSystem, dir: &Path) -> Option<PathBuf> {
    if !fs.is_dir(dir) {
        return None;
    }

    let manifest_path = dir.join("package.json");
    if fs.is_file(&manifest_path) {
        let manifest: PackageManifest = fs
            .read_to_string(&manifest_path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        for field in manifest.entry_fields() {
            let target = normalize(&dir.join(field));
            if target == dir {
                continue;
            }
            if let Some(found) = resolve_file(fs, &target).or_else(|| resolve_index(fs, &target)) {
                return Some(found);
            }
        }
    }

    resolve_index(fs, dir)
}

fn resolve_index(fs: &dyn FileSystem, dir: &Path) -> Option<PathBuf> {
    resolve_file(fs, &dir.join("index"))
}
