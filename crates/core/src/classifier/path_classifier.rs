//! Maps metadata records onto placement keys.

use super::sanitize::sanitize_segment;
use super::types::{Classification, PlacementKey};
use crate::config::{Config, SortMode};
use crate::metadata::MetadataRecord;

/// A hierarchy level with its sanitized sentinel.
#[derive(Debug, Clone)]
struct Level {
    field: String,
    fallback: String,
}

/// Derives placement keys for both operating modes.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    levels: Vec<Level>,
    grouping_field: String,
    max_segment_bytes: usize,
}

impl PathClassifier {
    /// Builds a classifier from the hierarchy, grouping and naming sections.
    pub fn from_config(config: &Config) -> Self {
        let max_segment_bytes = config.naming.max_segment_bytes;
        let levels = config
            .hierarchical
            .fields
            .iter()
            .map(|f| {
                let raw = f
                    .fallback
                    .as_deref()
                    .unwrap_or(&config.hierarchical.fallback_segment);
                Level {
                    field: f.name.clone(),
                    fallback: sanitize_segment(raw, max_segment_bytes)
                        .unwrap_or_else(|| "Unknown".to_string()),
                }
            })
            .collect();

        Self {
            levels,
            grouping_field: config.grouping.field.clone(),
            max_segment_bytes,
        }
    }

    /// Classifies a record under `mode`.
    pub fn classify(&self, record: &MetadataRecord, mode: SortMode) -> Classification {
        match mode {
            SortMode::Hierarchical => Classification::Place(self.hierarchical_key(record)),
            SortMode::Grouping => self.grouping_key(record),
        }
    }

    /// Best-effort placement: absent fields take their sentinel, so every
    /// record yields a key.
    pub fn hierarchical_key(&self, record: &MetadataRecord) -> PlacementKey {
        let segments = self
            .levels
            .iter()
            .map(|level| {
                record
                    .get(&level.field)
                    .and_then(|v| sanitize_segment(v, self.max_segment_bytes))
                    .unwrap_or_else(|| level.fallback.clone())
            })
            .collect();
        // Levels are non-empty after validation and fallbacks are never blank.
        PlacementKey::new(segments).unwrap_or_else(|| self.fallback_key())
    }

    /// Key used for items whose header could not be decoded at all.
    pub fn fallback_key(&self) -> PlacementKey {
        let segments: Vec<String> = self.levels.iter().map(|l| l.fallback.clone()).collect();
        PlacementKey::new(segments).unwrap_or_else(PlacementKey::unknown)
    }

    /// Single mandatory field; absence means the unit is left alone.
    pub fn grouping_key(&self, record: &MetadataRecord) -> Classification {
        record
            .get(&self.grouping_field)
            .and_then(|v| sanitize_segment(v, self.max_segment_bytes))
            .and_then(|segment| PlacementKey::new(vec![segment]))
            .map(Classification::Place)
            .unwrap_or_else(|| Classification::Skip {
                field: self.grouping_field.clone(),
            })
    }

    /// Sanitizes a literal path component (used for layout prefixes).
    pub fn sanitize(&self, raw: &str) -> Option<String> {
        sanitize_segment(raw, self.max_segment_bytes)
    }
}
