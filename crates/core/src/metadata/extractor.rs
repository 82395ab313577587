//! Field-presence policy and failure accounting around a [`MetadataReader`].

use std::path::Path;

use super::error::ExtractionFailure;
use super::traits::MetadataReader;
use super::types::MetadataRecord;
use crate::metrics;

/// Reads only the fields the active mode needs from each item.
pub struct MetadataExtractor<R: MetadataReader> {
    reader: R,
    fields: Vec<String>,
}

impl<R: MetadataReader> MetadataExtractor<R> {
    /// Creates an extractor that requests `fields` from every item.
    pub fn new(reader: R, fields: Vec<String>) -> Self {
        Self { reader, fields }
    }

    /// Extracts the configured fields from one item.
    ///
    /// Never panics past this boundary: every reader error is returned as an
    /// [`ExtractionFailure`] and counted. Fields the reader returned but were
    /// not requested are dropped so records stay comparable across readers.
    pub async fn extract(&self, path: &Path) -> Result<MetadataRecord, ExtractionFailure> {
        match self.reader.read(path, &self.fields).await {
            Ok(record) => Ok(record
                .iter()
                .filter(|(name, _)| self.fields.iter().any(|f| f.as_str() == *name))
                .collect()),
            Err(e) => {
                metrics::EXTRACTION_FAILURES
                    .with_label_values(&[e.kind()])
                    .inc();
                tracing::debug!("Extraction failed via {}: {}", self.reader.name(), e);
                Err(e)
            }
        }
    }
}
