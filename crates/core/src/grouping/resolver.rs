//! Folder key resolution for grouping mode.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use super::error::ResolveError;
use crate::classifier::{Classification, PathClassifier, PlacementKey};
use crate::metadata::{MetadataExtractor, MetadataReader};
use crate::naming::{is_partial_file, NameNormalizer};

/// Outcome of scanning one folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Key of the folder, if any item yielded one.
    pub key: Option<PlacementKey>,
    /// Item that decided the key.
    pub decided_by: Option<PathBuf>,
    /// Distinct keys other than `key` seen while auditing.
    pub conflicting: Vec<PlacementKey>,
    /// Items handed to the extractor.
    pub items_read: usize,
}

impl Resolution {
    /// Whether items of the folder disagree on the key. Only meaningful when
    /// the resolver audits.
    pub fn is_heterogeneous(&self) -> bool {
        !self.conflicting.is_empty()
    }
}

/// Finds the grouping key of a folder from its immediate items.
pub struct GroupKeyResolver<R: MetadataReader> {
    extractor: Arc<MetadataExtractor<R>>,
    classifier: PathClassifier,
    normalizer: NameNormalizer,
    audit: bool,
}

impl<R: MetadataReader> GroupKeyResolver<R> {
    pub fn new(
        extractor: Arc<MetadataExtractor<R>>,
        classifier: PathClassifier,
        normalizer: NameNormalizer,
    ) -> Self {
        Self {
            extractor,
            classifier,
            normalizer,
            audit: false,
        }
    }

    /// Keep reading after the deciding item to detect disagreement.
    pub fn with_audit(mut self, audit: bool) -> Self {
        self.audit = audit;
        self
    }

    /// Scans the immediate canonically named files of `folder` in
    /// enumeration order.
    ///
    /// The first item whose grouping field is usable decides the key and,
    /// unless auditing, ends the scan. Unreadable items and items without
    /// the field are passed over.
    pub async fn resolve(&self, folder: &Path) -> Result<Resolution, ResolveError> {
        let read_dir_failed = |e| ResolveError::ReadDirFailed {
            path: folder.to_path_buf(),
            source: e,
        };

        let mut entries = fs::read_dir(folder).await.map_err(read_dir_failed)?;
        let mut resolution = Resolution::default();

        while let Some(entry) = entries.next_entry().await.map_err(read_dir_failed)? {
            let path = entry.path();
            if !self.normalizer.has_canonical_extension(&path) || is_partial_file(&path) {
                continue;
            }
            match entry.file_type().await {
                Ok(ft) if ft.is_file() => {}
                _ => continue,
            }

            resolution.items_read += 1;
            let record = match self.extractor.extract(&path).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::debug!("Passing over {}: {}", path.display(), e);
                    continue;
                }
            };

            let key = match self.classifier.grouping_key(&record) {
                Classification::Place(key) => key,
                Classification::Skip { field } => {
                    tracing::debug!("{} has no usable {}", path.display(), field);
                    continue;
                }
            };

            match &resolution.key {
                None => {
                    tracing::debug!("{} decided by {} as {}", folder.display(), path.display(), key);
                    resolution.key = Some(key);
                    resolution.decided_by = Some(path);
                    if !self.audit {
                        break;
                    }
                }
                Some(decided) => {
                    if *decided != key && !resolution.conflicting.contains(&key) {
                        resolution.conflicting.push(key);
                    }
                }
            }
        }

        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SortMode};
    use crate::testing::{fixtures, MockMetadataReader};
    use tempfile::TempDir;

    fn resolver(reader: MockMetadataReader, audit: bool) -> GroupKeyResolver<MockMetadataReader> {
        let config = Config::new("/in", "/out").with_mode(SortMode::Grouping);
        let extractor = Arc::new(MetadataExtractor::new(reader, config.requested_fields()));
        GroupKeyResolver::new(
            extractor,
            PathClassifier::from_config(&config),
            NameNormalizer::from_config(&config.naming),
        )
        .with_audit(audit)
    }

    fn key(value: &str) -> PlacementKey {
        PlacementKey::new(vec![value.to_string()]).unwrap()
    }

    #[tokio::test]
    async fn test_first_usable_item_decides() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("A");
        fixtures::write_raw(&folder.join("junk.dcm"), b"not a record").await;
        fixtures::write_item(&folder.join("nokey.dcm"), &[("PatientID", "P1")]).await;
        fixtures::write_item(&folder.join("good.dcm"), &[("AccessionNumber", "123")]).await;

        let resolution = resolver(MockMetadataReader::new(), false)
            .resolve(&folder)
            .await
            .unwrap();

        assert_eq!(resolution.key, Some(key("123")));
        assert_eq!(resolution.decided_by, Some(folder.join("good.dcm")));
        assert!(!resolution.is_heterogeneous());
    }

    #[tokio::test]
    async fn test_scan_stops_at_first_success() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("A");
        for name in ["a.dcm", "b.dcm", "c.dcm"] {
            fixtures::write_item(&folder.join(name), &[("AccessionNumber", "123")]).await;
        }

        let reader = MockMetadataReader::new();
        let resolution = resolver(reader.clone(), false)
            .resolve(&folder)
            .await
            .unwrap();

        assert_eq!(resolution.key, Some(key("123")));
        assert_eq!(resolution.items_read, 1);
        assert_eq!(reader.read_count(), 1);
    }

    #[tokio::test]
    async fn test_only_canonical_immediate_items_are_read() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("A");
        fixtures::write_item(&folder.join("x"), &[("AccessionNumber", "1")]).await;
        fixtures::write_item(&folder.join("sub/y.dcm"), &[("AccessionNumber", "2")]).await;

        let reader = MockMetadataReader::new();
        let resolution = resolver(reader.clone(), false)
            .resolve(&folder)
            .await
            .unwrap();

        assert_eq!(resolution.key, None);
        assert_eq!(reader.read_count(), 0);
    }

    #[tokio::test]
    async fn test_audit_records_conflicts_without_changing_decision() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("A");
        fixtures::write_item(&folder.join("a.dcm"), &[("AccessionNumber", "123")]).await;
        fixtures::write_item(&folder.join("b.dcm"), &[("AccessionNumber", "456")]).await;
        fixtures::write_item(&folder.join("c.dcm"), &[("AccessionNumber", "456")]).await;

        let reader = MockMetadataReader::new();
        let resolution = resolver(reader.clone(), true)
            .resolve(&folder)
            .await
            .unwrap();

        assert_eq!(reader.read_count(), 3);
        assert!(resolution.is_heterogeneous());
        assert_eq!(resolution.conflicting.len(), 1);

        let decided = resolution.key.clone().unwrap();
        let decider = resolution.decided_by.clone().unwrap();
        let expected = if decider.ends_with("a.dcm") { "123" } else { "456" };
        assert_eq!(decided, key(expected));
        assert_ne!(resolution.conflicting[0], decided);
    }

    #[tokio::test]
    async fn test_missing_folder() {
        let temp = TempDir::new().unwrap();
        let result = resolver(MockMetadataReader::new(), false)
            .resolve(&temp.path().join("gone"))
            .await;
        assert!(matches!(result, Err(ResolveError::ReadDirFailed { .. })));
    }
}
