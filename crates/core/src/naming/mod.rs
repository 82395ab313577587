//! Naming module: canonical extension handling for items.
//!
//! Renaming happens in place on the source tree and is irreversible, so the
//! normalizer never overwrites an existing sibling.

mod error;
mod normalizer;

pub use error::NormalizeError;
pub use normalizer::{NameNormalizer, NormalizeReport, NormalizedName};

use std::path::Path;

/// Suffix of in-flight copies written by the merger.
pub const PARTIAL_SUFFIX: &str = "dicomsort-partial";

/// Whether `path` names an in-flight (or abandoned) copy.
pub fn is_partial_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(PARTIAL_SUFFIX))
}
