use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Tree to read items (hierarchical) or study folders (grouping) from.
    pub source_root: PathBuf,
    /// Output root. In grouping mode this may equal `source_root`.
    pub destination_root: PathBuf,
    #[serde(default)]
    pub mode: SortMode,
    #[serde(default)]
    pub naming: NamingConfig,
    #[serde(default)]
    pub hierarchical: HierarchicalConfig,
    #[serde(default)]
    pub grouping: GroupingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub copy: CopyConfig,
}

impl Config {
    /// Creates a config with defaults for everything but the two roots.
    pub fn new(source_root: impl Into<PathBuf>, destination_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            destination_root: destination_root.into(),
            mode: SortMode::default(),
            naming: NamingConfig::default(),
            hierarchical: HierarchicalConfig::default(),
            grouping: GroupingConfig::default(),
            scheduler: SchedulerConfig::default(),
            copy: CopyConfig::default(),
        }
    }

    /// Sets the operating mode.
    pub fn with_mode(mut self, mode: SortMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the worker pool size.
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.scheduler.max_workers = max;
        self
    }

    /// Field names requested from the reader for the active mode.
    pub fn requested_fields(&self) -> Vec<String> {
        match self.mode {
            SortMode::Hierarchical => self
                .hierarchical
                .fields
                .iter()
                .map(|f| f.name.clone())
                .collect(),
            SortMode::Grouping => vec![self.grouping.field.clone()],
        }
    }
}

/// Engine operating mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Per item: copy each item under `<field1>/<field2>/.../<item>`.
    #[default]
    Hierarchical,
    /// Per folder: merge each folder into `<accession>/`.
    Grouping,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Hierarchical => "hierarchical",
            SortMode::Grouping => "grouping",
        }
    }
}

impl std::fmt::Display for SortMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hierarchical" => Ok(SortMode::Hierarchical),
            "grouping" => Ok(SortMode::Grouping),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// File naming and probing rules
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NamingConfig {
    /// Extension every item should carry, without the leading dot.
    #[serde(default = "default_canonical_extension")]
    pub canonical_extension: String,
    /// Extensions that mark a file as a probable record.
    #[serde(default = "default_probe_extensions")]
    pub probe_extensions: Vec<String>,
    /// Name fragments that mark a file as a probable record.
    #[serde(default = "default_probe_name_markers")]
    pub probe_name_markers: Vec<String>,
    /// Upper bound for a single path segment, in bytes.
    #[serde(default = "default_max_segment_bytes")]
    pub max_segment_bytes: usize,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            canonical_extension: default_canonical_extension(),
            probe_extensions: default_probe_extensions(),
            probe_name_markers: default_probe_name_markers(),
            max_segment_bytes: default_max_segment_bytes(),
        }
    }
}

fn default_canonical_extension() -> String {
    "dcm".to_string()
}

fn default_probe_extensions() -> Vec<String> {
    vec!["dcm".to_string(), "ima".to_string()]
}

fn default_probe_name_markers() -> Vec<String> {
    vec!["DICOMDIR".to_string()]
}

fn default_max_segment_bytes() -> usize {
    255
}

/// One level of the hierarchical placement key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HierarchyField {
    /// DICOM keyword, e.g. `PatientID`.
    pub name: String,
    /// Segment used when the field is absent. Falls back to
    /// `hierarchical.fallback_segment` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

impl HierarchyField {
    pub fn new(name: &str, fallback: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            fallback: fallback.map(str::to_string),
        }
    }
}

/// Hierarchical mode configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HierarchicalConfig {
    /// Ordered fields forming the placement key.
    #[serde(default = "default_hierarchy_fields")]
    pub fields: Vec<HierarchyField>,
    /// Sentinel for fields without their own fallback.
    #[serde(default = "default_fallback_segment")]
    pub fallback_segment: String,
    /// Rename sources to the canonical extension in place before copying.
    #[serde(default)]
    pub rename_sources: bool,
    /// Prefix keys with the item's parent directory relative to the source root.
    #[serde(default)]
    pub preserve_source_layout: bool,
}

impl Default for HierarchicalConfig {
    fn default() -> Self {
        Self {
            fields: default_hierarchy_fields(),
            fallback_segment: default_fallback_segment(),
            rename_sources: false,
            preserve_source_layout: false,
        }
    }
}

impl HierarchicalConfig {
    /// Replaces the ordered field list.
    pub fn with_fields(mut self, fields: Vec<HierarchyField>) -> Self {
        self.fields = fields;
        self
    }

    /// Enables the in-place rename step.
    pub fn with_rename_sources(mut self, enabled: bool) -> Self {
        self.rename_sources = enabled;
        self
    }

    /// Enables source layout preservation.
    pub fn with_preserve_source_layout(mut self, enabled: bool) -> Self {
        self.preserve_source_layout = enabled;
        self
    }
}

fn default_hierarchy_fields() -> Vec<HierarchyField> {
    vec![
        HierarchyField::new("PatientID", Some("UnknownPatient")),
        HierarchyField::new("StudyInstanceUID", Some("UnknownStudy")),
        HierarchyField::new("SeriesDescription", None),
    ]
}

fn default_fallback_segment() -> String {
    "UnknownSeries".to_string()
}

/// Grouping mode configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupingConfig {
    /// Field whose value names the destination folder.
    #[serde(default = "default_grouping_field")]
    pub field: String,
    /// Keep reading after the deciding item to flag heterogeneous folders.
    #[serde(default)]
    pub audit_homogeneity: bool,
    /// Skip heterogeneous folders instead of merging them. Implies the audit.
    #[serde(default)]
    pub strict: bool,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            field: default_grouping_field(),
            audit_homogeneity: false,
            strict: false,
        }
    }
}

impl GroupingConfig {
    /// Whether folders are scanned past the deciding item.
    pub fn audits(&self) -> bool {
        self.audit_homogeneity || self.strict
    }
}

fn default_grouping_field() -> String {
    "AccessionNumber".to_string()
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Maximum units processed concurrently.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}

fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// File copy configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CopyConfig {
    /// Buffer size for file copies in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Compare SHA-256 of source and copy before publishing the copy.
    #[serde(default)]
    pub verify_checksums: bool,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            verify_checksums: false,
        }
    }
}

impl CopyConfig {
    /// Enables checksum verification.
    pub fn with_checksum_verification(mut self, enabled: bool) -> Self {
        self.verify_checksums = enabled;
        self
    }

    /// Sets the buffer size for copies.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }
}

fn default_buffer_size() -> usize {
    1024 * 1024 // 1 MB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_config() {
        let toml = r#"
source_root = "/in"
destination_root = "/out"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.source_root, PathBuf::from("/in"));
        assert_eq!(config.mode, SortMode::Hierarchical);
        assert_eq!(config.naming.canonical_extension, "dcm");
        assert_eq!(config.naming.probe_extensions, vec!["dcm", "ima"]);
        assert_eq!(config.hierarchical.fields.len(), 3);
        assert_eq!(config.hierarchical.fallback_segment, "UnknownSeries");
        assert_eq!(config.grouping.field, "AccessionNumber");
        assert!(config.scheduler.max_workers >= 1);
        assert!(!config.copy.verify_checksums);
    }

    #[test]
    fn test_deserialize_missing_roots_fails() {
        let toml = r#"
mode = "grouping"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_custom_hierarchy() {
        let toml = r#"
source_root = "/in"
destination_root = "/out"
mode = "hierarchical"

[hierarchical]
fallback_segment = "Unsorted"
preserve_source_layout = true

[[hierarchical.fields]]
name = "PatientID"

[[hierarchical.fields]]
name = "SeriesDescription"
fallback = "NoSeries"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.hierarchical.fields,
            vec![
                HierarchyField::new("PatientID", None),
                HierarchyField::new("SeriesDescription", Some("NoSeries")),
            ]
        );
        assert_eq!(config.hierarchical.fallback_segment, "Unsorted");
        assert!(config.hierarchical.preserve_source_layout);
        assert!(!config.hierarchical.rename_sources);
    }

    #[test]
    fn test_requested_fields_follow_mode() {
        let config = Config::new("/in", "/out");
        assert_eq!(
            config.requested_fields(),
            vec!["PatientID", "StudyInstanceUID", "SeriesDescription"]
        );

        let config = config.with_mode(SortMode::Grouping);
        assert_eq!(config.requested_fields(), vec!["AccessionNumber"]);
    }

    #[test]
    fn test_strict_grouping_implies_audit() {
        let grouping = GroupingConfig {
            strict: true,
            ..Default::default()
        };
        assert!(grouping.audits());
        assert!(!GroupingConfig::default().audits());
    }

    #[test]
    fn test_sort_mode_from_str() {
        assert_eq!("Grouping".parse::<SortMode>().unwrap(), SortMode::Grouping);
        assert_eq!(
            "hierarchical".parse::<SortMode>().unwrap(),
            SortMode::Hierarchical
        );
        assert!("flat".parse::<SortMode>().is_err());
    }
}
