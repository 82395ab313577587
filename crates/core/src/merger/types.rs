//! Types for the merger module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Information about one copied file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopiedFile {
    /// Final destination path.
    pub destination: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
    /// SHA-256 of the content, when verification is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Totals for one directory merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub files_copied: usize,
    pub bytes_copied: u64,
    pub directories_created: usize,
}

impl MergeStats {
    pub(crate) fn record_file(&mut self, file: &CopiedFile) {
        self.files_copied += 1;
        self.bytes_copied += file.size_bytes;
    }
}
