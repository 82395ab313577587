//! Merger module for materializing units in the destination tree.
//!
//! # Features
//!
//! - Race-tolerant directory creation: "already exists" is success
//! - Copy-then-rename through a uniquely named hidden temp file
//! - Content, permissions and modification time preserved
//! - Optional SHA-256 verification of every copy
//! - Last writer wins on name collisions; sources are never deleted
//!
//! # Example
//!
//! ```ignore
//! use dicomsort_core::merger::DirectoryMerger;
//!
//! let merger = DirectoryMerger::with_defaults();
//! let stats = merger.merge(Path::new("/studies/A"), Path::new("/studies/123")).await?;
//! println!("Merged {} files ({} bytes)", stats.files_copied, stats.bytes_copied);
//! ```

mod error;
mod fs_merger;
mod types;

pub use error::MergeError;
pub use fs_merger::DirectoryMerger;
pub use types::{CopiedFile, MergeStats};
