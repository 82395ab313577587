//! Immutable snapshots of the source tree.
//!
//! Both modes enumerate their units before any unit is processed, so
//! directories and files created by the run itself are never visited.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::types::SourceUnit;
use crate::naming::is_partial_file;

/// Canonical form of `path`, resolving the longest existing ancestor when
/// the path itself does not exist yet.
pub(crate) fn canonical_or_lexical(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }

    let mut missing = Vec::new();
    let mut current = path;
    while let Some(parent) = current.parent() {
        if let Some(name) = current.file_name() {
            missing.push(name.to_os_string());
        }
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(mut resolved) = std::fs::canonicalize(parent) {
            for name in missing.iter().rev() {
                resolved.push(name);
            }
            return resolved;
        }
        current = parent;
    }
    path.to_path_buf()
}

/// The part of the source tree that belongs to the destination, spelled
/// under `source_root`. `None` unless the destination lies strictly inside
/// the source.
pub fn excluded_subtree(source_root: &Path, destination_root: &Path) -> Option<PathBuf> {
    let source = canonical_or_lexical(source_root);
    let destination = canonical_or_lexical(destination_root);
    if source == destination {
        return None;
    }
    destination
        .strip_prefix(&source)
        .ok()
        .map(|relative| source_root.join(relative))
}

fn walk(source_root: &Path, excluded: Option<PathBuf>) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(source_root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| match &excluded {
            Some(excluded) => e.path() != excluded.as_path(),
            None => true,
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Error accessing entry: {}", e);
                None
            }
        })
}

/// Every regular file under `source_root`, outside the destination subtree.
pub fn snapshot_items(source_root: &Path, destination_root: &Path) -> Vec<SourceUnit> {
    let excluded = excluded_subtree(source_root, destination_root);
    walk(source_root, excluded)
        .filter(|e| e.file_type().is_file() && !is_partial_file(e.path()))
        .enumerate()
        .map(|(index, e)| SourceUnit {
            path: e.into_path(),
            index,
        })
        .collect()
}

/// Every directory below `source_root` (the root itself excluded), outside
/// the destination subtree. Symlinked directories are not followed.
pub fn snapshot_folders(source_root: &Path, destination_root: &Path) -> Vec<SourceUnit> {
    let excluded = excluded_subtree(source_root, destination_root);
    walk(source_root, excluded)
        .filter(|e| e.file_type().is_dir())
        .enumerate()
        .map(|(index, e)| SourceUnit {
            path: e.into_path(),
            index,
        })
        .collect()
}
