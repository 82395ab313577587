//! Types for the classifier module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Ordered, filesystem-safe path segments locating a unit in the
/// destination tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlacementKey(Vec<String>);

impl PlacementKey {
    /// Builds a key from already sanitized segments. Returns `None` for an
    /// empty sequence.
    pub fn new(segments: Vec<String>) -> Option<Self> {
        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            None
        } else {
            Some(Self(segments))
        }
    }

    /// Last-resort key for a classifier without any hierarchy levels.
    pub(crate) fn unknown() -> Self {
        Self(vec!["Unknown".to_string()])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns a key with `prefix` segments in front of this one.
    pub fn prefixed(&self, prefix: &[String]) -> Self {
        let mut segments = prefix.to_vec();
        segments.extend(self.0.iter().cloned());
        Self(segments)
    }

    /// Joins the key under `root`.
    pub fn under(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in &self.0 {
            path.push(segment);
        }
        path
    }
}

impl fmt::Display for PlacementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Result of classifying one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The unit belongs at this key.
    Place(PlacementKey),
    /// A mandatory field was absent (or sanitized to nothing).
    Skip {
        /// The missing field.
        field: String,
    },
}

impl Classification {
    pub fn key(&self) -> Option<&PlacementKey> {
        match self {
            Classification::Place(key) => Some(key),
            Classification::Skip { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_rejects_empty_segments() {
        assert!(PlacementKey::new(vec![]).is_none());
        assert!(PlacementKey::new(vec!["a".into(), String::new()]).is_none());
    }

    #[test]
    fn test_key_under_root() {
        let key = PlacementKey::new(vec!["P1".into(), "S1".into()]).unwrap();
        assert_eq!(key.under(Path::new("/out")), PathBuf::from("/out/P1/S1"));
        assert_eq!(key.to_string(), "P1/S1");
    }

    #[test]
    fn test_key_prefixed() {
        let key = PlacementKey::new(vec!["Series".into()]).unwrap();
        let prefixed = key.prefixed(&["site".into(), "day1".into()]);
        assert_eq!(prefixed.segments(), &["site", "day1", "Series"]);
    }
}
