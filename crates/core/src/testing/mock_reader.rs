//! Mock metadata reader for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::metadata::{ExtractionFailure, MetadataReader, MetadataRecord};

/// First line of every mock item.
pub const MOCK_MAGIC: &str = "MOCKDCM";

/// Failure injected for a given file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    PermissionDenied,
    NotRecognized,
    Panic,
}

/// Mock implementation of the [`MetadataReader`] trait.
///
/// Items are small text files: a `MOCKDCM` line followed by `Key=Value`
/// lines. Anything else is reported as not recognized, which lets tests
/// build trees of "records" and "junk" without real DICOM files.
///
/// Clones share their recorded reads and injected failures.
///
/// # Example
///
/// ```rust,ignore
/// use dicomsort_core::testing::{fixtures, MockMetadataReader};
///
/// fixtures::write_item(&path, &[("AccessionNumber", "123")]).await;
/// let reader = MockMetadataReader::new();
/// let record = reader.read(&path, &["AccessionNumber".into()]).await?;
/// assert_eq!(reader.read_count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockMetadataReader {
    reads: Arc<RwLock<Vec<PathBuf>>>,
    read_count: Arc<AtomicUsize>,
    failures: Arc<RwLock<HashMap<String, InjectedFailure>>>,
    delay: Option<Duration>,
}

impl MockMetadataReader {
    /// Create a new mock reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` before every read.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every read of a file named `file_name`.
    pub async fn fail_on(&self, file_name: &str, failure: InjectedFailure) {
        self.failures
            .write()
            .await
            .insert(file_name.to_string(), failure);
    }

    /// Number of reads performed so far.
    pub fn read_count(&self) -> usize {
        self.read_count.load(Ordering::SeqCst)
    }

    /// Paths read so far, in call order.
    pub async fn recorded_reads(&self) -> Vec<PathBuf> {
        self.reads.read().await.clone()
    }

    /// Parses a mock item body.
    pub fn parse(path: &Path, body: &str) -> Result<MetadataRecord, ExtractionFailure> {
        let mut lines = body.lines();
        if lines.next().map(str::trim) != Some(MOCK_MAGIC) {
            return Err(ExtractionFailure::not_recognized(
                path.to_path_buf(),
                "missing MOCKDCM preamble",
            ));
        }
        Ok(lines
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim(), v))
            .collect())
    }
}

#[async_trait]
impl MetadataReader for MockMetadataReader {
    fn name(&self) -> &str {
        "mock"
    }

    async fn read(
        &self,
        path: &Path,
        fields: &[String],
    ) -> Result<MetadataRecord, ExtractionFailure> {
        self.read_count.fetch_add(1, Ordering::SeqCst);
        self.reads.write().await.push(path.to_path_buf());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let injected = self.failures.read().await.get(&file_name).copied();
        match injected {
            Some(InjectedFailure::PermissionDenied) => {
                return Err(ExtractionFailure::PermissionDenied {
                    path: path.to_path_buf(),
                })
            }
            Some(InjectedFailure::NotRecognized) => {
                return Err(ExtractionFailure::not_recognized(
                    path.to_path_buf(),
                    "injected failure",
                ))
            }
            Some(InjectedFailure::Panic) => panic!("injected panic reading {}", path.display()),
            None => {}
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ExtractionFailure::from_io(path.to_path_buf(), e))?;
        let body = String::from_utf8_lossy(&bytes);
        let record = Self::parse(path, &body)?;

        Ok(record
            .iter()
            .filter(|(name, _)| fields.iter().any(|f| f.as_str() == *name))
            .collect())
    }
}
