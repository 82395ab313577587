//! Error types for the metadata module.

use std::path::PathBuf;
use thiserror::Error;

/// Why an item could not be read as a record.
///
/// Callers recover from every variant locally: the item is treated as
/// non-matching, or as a failed candidate while resolving a folder key.
#[derive(Debug, Error)]
pub enum ExtractionFailure {
    /// The item is not a recognizable record (wrong format, corrupt header).
    #[error("Not a recognizable record: {path}: {reason}")]
    NotRecognized { path: PathBuf, reason: String },

    /// The item exists but cannot be opened.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// The item vanished before it could be read.
    #[error("Item not found: {path}")]
    NotFound { path: PathBuf },

    /// Other I/O error while probing the header.
    #[error("I/O error reading {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocking decode task panicked or was cancelled.
    #[error("Header decode aborted for {path}: {reason}")]
    Aborted { path: PathBuf, reason: String },
}

impl ExtractionFailure {
    /// Classifies an I/O error raised while opening `path`.
    pub fn from_io(path: PathBuf, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io {
                path,
                source: error,
            },
        }
    }

    /// Creates a not-recognized failure.
    pub fn not_recognized(path: PathBuf, reason: impl Into<String>) -> Self {
        Self::NotRecognized {
            path,
            reason: reason.into(),
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotRecognized { .. } => "not_recognized",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::NotFound { .. } => "not_found",
            Self::Io { .. } => "io",
            Self::Aborted { .. } => "aborted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_from_io_classification() {
        let path = PathBuf::from("/in/a.dcm");
        assert_eq!(
            ExtractionFailure::from_io(path.clone(), Error::from(ErrorKind::NotFound)).kind(),
            "not_found"
        );
        assert_eq!(
            ExtractionFailure::from_io(path.clone(), Error::from(ErrorKind::PermissionDenied))
                .kind(),
            "permission_denied"
        );
        assert_eq!(
            ExtractionFailure::from_io(path, Error::from(ErrorKind::UnexpectedEof)).kind(),
            "io"
        );
    }
}
