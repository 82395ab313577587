//! Canonical extension enforcement.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::error::NormalizeError;
use super::is_partial_file;
use crate::config::NamingConfig;

/// Result of normalizing one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedName {
    /// Path the item now lives at.
    pub path: PathBuf,
    /// Whether a rename happened.
    pub renamed: bool,
}

/// Result of normalizing the immediate files of one folder.
#[derive(Debug, Default)]
pub struct NormalizeReport {
    /// `(old, new)` pairs of renamed items.
    pub renamed: Vec<(PathBuf, PathBuf)>,
    /// Items left as they were because the rename was refused or failed.
    pub refused: Vec<NormalizeError>,
    /// Items that already carried the canonical extension.
    pub unchanged: usize,
}

/// Appends the canonical extension to item names that lack it.
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    canonical_extension: String,
    probe_extensions: Vec<String>,
    probe_name_markers: Vec<String>,
}

impl NameNormalizer {
    /// Creates a normalizer from the naming section of the config.
    pub fn from_config(naming: &NamingConfig) -> Self {
        Self {
            canonical_extension: naming.canonical_extension.clone(),
            probe_extensions: naming.probe_extensions.clone(),
            probe_name_markers: naming.probe_name_markers.clone(),
        }
    }

    pub fn canonical_extension(&self) -> &str {
        &self.canonical_extension
    }

    /// Whether the item already ends in the canonical extension
    /// (case-insensitive).
    pub fn has_canonical_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.canonical_extension))
    }

    /// Name the item should carry. Appends rather than replaces, so
    /// UID-style names such as `1.2.840.10008` keep every component.
    pub fn canonical_path(&self, path: &Path) -> PathBuf {
        if self.has_canonical_extension(path) {
            return path.to_path_buf();
        }
        let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
        name.push(".");
        name.push(&self.canonical_extension);
        path.with_file_name(name)
    }

    /// Whether the name alone marks the item as a probable record.
    pub fn is_probe_candidate(&self, path: &Path) -> bool {
        let by_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| {
                self.probe_extensions
                    .iter()
                    .any(|p| p.eq_ignore_ascii_case(e))
            });
        let by_marker = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| self.probe_name_markers.iter().any(|m| n.contains(m.as_str())));
        by_extension || by_marker
    }

    /// Renames one item to its canonical name. A no-op for canonical names.
    pub async fn normalize(&self, path: &Path) -> Result<NormalizedName, NormalizeError> {
        let target = self.canonical_path(path);
        if target == path {
            return Ok(NormalizedName {
                path: target,
                renamed: false,
            });
        }

        let taken = fs::try_exists(&target)
            .await
            .map_err(|e| NormalizeError::RenameFailed {
                path: path.to_path_buf(),
                target: target.clone(),
                source: e,
            })?;
        if taken {
            return Err(NormalizeError::TargetExists {
                path: path.to_path_buf(),
                target,
            });
        }

        fs::rename(path, &target)
            .await
            .map_err(|e| NormalizeError::RenameFailed {
                path: path.to_path_buf(),
                target: target.clone(),
                source: e,
            })?;

        tracing::debug!("Renamed {} -> {}", path.display(), target.display());
        Ok(NormalizedName {
            path: target,
            renamed: true,
        })
    }

    /// Normalizes every regular file directly inside `dir`.
    ///
    /// Subdirectories are neither renamed nor descended into. A refused
    /// rename is recorded and does not stop the others.
    pub async fn normalize_dir(&self, dir: &Path) -> Result<NormalizeReport, NormalizeError> {
        let read_dir_failed = |e| NormalizeError::ReadDirFailed {
            path: dir.to_path_buf(),
            source: e,
        };

        let mut entries = fs::read_dir(dir).await.map_err(read_dir_failed)?;
        let mut report = NormalizeReport::default();

        while let Some(entry) = entries.next_entry().await.map_err(read_dir_failed)? {
            let path = entry.path();
            let is_file = match entry.file_type().await {
                Ok(ft) => ft.is_file(),
                Err(e) => {
                    tracing::warn!("Cannot stat {}: {}", path.display(), e);
                    false
                }
            };
            if !is_file || is_partial_file(&path) {
                continue;
            }

            match self.normalize(&path).await {
                Ok(NormalizedName { renamed: true, path: new_path }) => {
                    report.renamed.push((path, new_path));
                }
                Ok(_) => report.unchanged += 1,
                Err(e) => {
                    tracing::warn!("{}", e);
                    report.refused.push(e);
                }
            }
        }

        Ok(report)
    }
}
