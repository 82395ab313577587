//! Error types for the naming module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while normalizing item names.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The canonical name is already taken by another entry.
    #[error("Cannot rename {path}: {target} already exists")]
    TargetExists { path: PathBuf, target: PathBuf },

    /// The rename itself failed.
    #[error("Failed to rename {path} to {target}")]
    RenameFailed {
        path: PathBuf,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The folder could not be listed.
    #[error("Failed to list directory: {path}")]
    ReadDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
