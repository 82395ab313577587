//! DICOM header reader backed by `dicom-object`.

use async_trait::async_trait;
use dicom_dictionary_std::tags;
use dicom_object::OpenFileOptions;
use std::path::{Path, PathBuf};

use super::error::ExtractionFailure;
use super::traits::MetadataReader;
use super::types::MetadataRecord;

/// Reads DICOM Part 10 files, stopping before the pixel data.
#[derive(Debug, Clone, Default)]
pub struct DicomMetadataReader;

impl DicomMetadataReader {
    pub fn new() -> Self {
        Self
    }

    fn read_blocking(path: PathBuf, fields: Vec<String>) -> Result<MetadataRecord, ExtractionFailure> {
        // Permission and missing-file errors keep their I/O kind.
        if let Err(e) = std::fs::File::open(&path) {
            return Err(ExtractionFailure::from_io(path, e));
        }

        let object = OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(&path)
            .map_err(|e| ExtractionFailure::not_recognized(path.clone(), e.to_string()))?;

        let mut record = MetadataRecord::empty();
        for name in &fields {
            let Ok(element) = object.element_by_name(name) else {
                continue;
            };
            match element.to_str() {
                Ok(value) => record.insert(name.clone(), value),
                Err(e) => {
                    tracing::debug!(
                        "Field {} of {} is not textual: {}",
                        name,
                        path.display(),
                        e
                    );
                }
            }
        }
        Ok(record)
    }
}

#[async_trait]
impl MetadataReader for DicomMetadataReader {
    fn name(&self) -> &str {
        "dicom"
    }

    async fn read(
        &self,
        path: &Path,
        fields: &[String],
    ) -> Result<MetadataRecord, ExtractionFailure> {
        let owned_path = path.to_path_buf();
        let fields = fields.to_vec();
        tokio::task::spawn_blocking(move || Self::read_blocking(owned_path, fields))
            .await
            .map_err(|e| ExtractionFailure::Aborted {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
    }
}
