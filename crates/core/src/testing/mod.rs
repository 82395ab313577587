//! Testing utilities and mock implementations.
//!
//! This module provides a mock [`MetadataReader`](crate::metadata::MetadataReader)
//! and fixture helpers, allowing end-to-end tests of both sorting modes
//! without real DICOM files.
//!
//! # Example
//!
//! ```rust,ignore
//! use dicomsort_core::testing::{fixtures, MockMetadataReader};
//!
//! fixtures::write_item(&src.join("A/x"), &[("AccessionNumber", "123")]).await;
//! let scheduler = TraversalScheduler::new(config, MockMetadataReader::new());
//! let summary = scheduler.run().await?;
//! ```

mod mock_reader;

pub use mock_reader::{InjectedFailure, MockMetadataReader, MOCK_MAGIC};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};
    use walkdir::WalkDir;

    use super::MOCK_MAGIC;

    /// Renders a mock item body.
    pub fn item_body(fields: &[(&str, &str)]) -> String {
        let mut body = format!("{}\n", MOCK_MAGIC);
        for (key, value) in fields {
            body.push_str(&format!("{}={}\n", key, value));
        }
        body
    }

    /// Writes a mock item, creating parent directories.
    ///
    /// Panics on I/O failure; meant for test setup only.
    pub async fn write_item(path: &Path, fields: &[(&str, &str)]) {
        write_raw(path, item_body(fields).as_bytes()).await;
    }

    /// Writes arbitrary bytes, creating parent directories.
    pub async fn write_raw(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .unwrap_or_else(|e| panic!("create {}: {}", parent.display(), e));
        }
        tokio::fs::write(path, content)
            .await
            .unwrap_or_else(|e| panic!("write {}: {}", path.display(), e));
    }

    /// Every regular file under `root`, relative to it, sorted.
    pub fn list_files(root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.path().strip_prefix(root).ok().map(Path::to_path_buf))
            .collect();
        files.sort();
        files
    }
}
