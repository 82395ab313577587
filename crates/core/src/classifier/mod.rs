//! Classifier module: metadata record to placement key.
//!
//! Hierarchical mode never drops an item: absent fields become sentinel
//! segments. Grouping mode has one mandatory field and skips the unit when
//! it is missing.

mod path_classifier;
mod sanitize;
mod types;

pub use path_classifier::PathClassifier;
pub use sanitize::sanitize_segment;
pub use types::{Classification, PlacementKey};
