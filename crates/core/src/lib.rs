pub mod classifier;
pub mod config;
pub mod grouping;
pub mod merger;
pub mod metadata;
pub mod metrics;
pub mod naming;
pub mod scheduler;
pub mod testing;

pub use classifier::{Classification, PathClassifier, PlacementKey};
pub use config::{
    config_figment, load_config, load_config_from_str, validate_config, Config, ConfigError,
    SortMode,
};
pub use grouping::{GroupKeyResolver, Resolution};
pub use merger::{DirectoryMerger, MergeError, MergeStats};
pub use metadata::{
    DicomMetadataReader, ExtractionFailure, MetadataExtractor, MetadataReader, MetadataRecord,
};
pub use naming::{NameNormalizer, NormalizeError};
pub use scheduler::{
    RunSummary, SchedulerError, TraversalScheduler, UnitOutcome, UnitReport,
};
