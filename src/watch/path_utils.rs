// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::Path;

use crate::types::STATE_DIR;

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. due to symlinks or different absolute prefixes),
///   we canonicalize both paths and try again.
///
/// Returns `None` if the path cannot be related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_string_lossy().replace('\\', "/"));
    }

    // Needed on platforms (notably macOS) where the same directory shows up
    // under different absolute prefixes (/private/var/...).
    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(rel.to_string_lossy().replace('\\', "/"));
        }
    }

    None
}

/// True for paths inside the coordinator's own state directory, at any
/// depth (`.incbuild/state.json`, `core/.incbuild/index-core.json`).
///
/// Writes there must never trigger another pass.
pub fn is_state_path(rel: &str) -> bool {
    rel.split('/').any(|component| component == STATE_DIR)
}
