//! Types for the metadata module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header-level fields read from one item.
///
/// Only present, non-blank values are stored; any other field name reads as
/// absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    fields: BTreeMap<String, String>,
}

impl MetadataRecord {
    /// Creates a record with no fields.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Stores a field. Blank values (whitespace or NUL padding only) are
    /// treated as absent and dropped.
    pub fn insert(&mut self, name: impl Into<String>, value: impl AsRef<str>) {
        let name = name.into();
        match clean_value(value.as_ref()) {
            Some(v) => {
                self.fields.insert(name, v);
            }
            None => {
                self.fields.remove(&name);
            }
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl AsRef<str>) -> Self {
        self.insert(name, value);
        self
    }

    /// Value of a field, or `None` when absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: AsRef<str>> FromIterator<(K, V)> for MetadataRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::empty();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// DICOM string values are space or NUL padded to even length.
fn clean_value(raw: &str) -> Option<String> {
    let trimmed = raw.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
