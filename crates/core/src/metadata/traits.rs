//! Trait definitions for the metadata module.

use async_trait::async_trait;
use std::path::Path;

use super::error::ExtractionFailure;
use super::types::MetadataRecord;

/// A reader that decodes the header of one item.
///
/// Implementations must not require decoding the payload and must not modify
/// the item.
#[async_trait]
pub trait MetadataReader: Send + Sync {
    /// Returns the name of this reader implementation.
    fn name(&self) -> &str;

    /// Reads the requested fields from the item at `path`.
    ///
    /// Requested fields missing from the item are simply absent from the
    /// record; only an unreadable item is an error.
    async fn read(
        &self,
        path: &Path,
        fields: &[String],
    ) -> Result<MetadataRecord, ExtractionFailure>;
}
