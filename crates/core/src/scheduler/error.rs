//! Error types for the scheduler module.

use std::path::PathBuf;
use thiserror::Error;

/// Run-level errors. Everything that goes wrong inside a unit is reported
/// in that unit's outcome instead.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The source root does not exist or is not a directory.
    #[error("Source root does not exist or is not a directory: {path}")]
    SourceRootMissing { path: PathBuf },

    /// The snapshot walk could not complete.
    #[error("Snapshot of {path} aborted: {reason}")]
    SnapshotAborted { path: PathBuf, reason: String },
}
