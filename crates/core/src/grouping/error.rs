//! Error types for the grouping module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving a folder key.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The folder could not be listed.
    #[error("Failed to list directory: {path}")]
    ReadDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
