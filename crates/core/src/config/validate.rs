use std::path::{Component, Path};

use super::{
    types::{Config, SortMode},
    ConfigError,
};

/// Smallest segment budget that still leaves room for a readable name.
const MIN_SEGMENT_BYTES: usize = 16;

/// Validate configuration
/// Currently validates:
/// - Both roots are set, and differ in hierarchical mode
/// - Worker pool is not empty
/// - Field names, fallbacks and the canonical extension are usable
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.source_root.as_os_str().is_empty() {
        return Err(invalid("source_root cannot be empty"));
    }
    if config.destination_root.as_os_str().is_empty() {
        return Err(invalid("destination_root cannot be empty"));
    }
    if config.mode == SortMode::Hierarchical
        && normalized(&config.source_root) == normalized(&config.destination_root)
    {
        return Err(invalid(
            "destination_root must differ from source_root in hierarchical mode",
        ));
    }

    if config.scheduler.max_workers == 0 {
        return Err(invalid("scheduler.max_workers cannot be 0"));
    }

    let ext = &config.naming.canonical_extension;
    if ext.is_empty() || ext.contains(['.', '/', '\\']) {
        return Err(invalid(
            "naming.canonical_extension must be a bare extension such as \"dcm\"",
        ));
    }
    if config.naming.max_segment_bytes < MIN_SEGMENT_BYTES {
        return Err(ConfigError::ValidationError(format!(
            "naming.max_segment_bytes must be at least {}",
            MIN_SEGMENT_BYTES
        )));
    }

    if config.hierarchical.fields.is_empty() {
        return Err(invalid("hierarchical.fields cannot be empty"));
    }
    for field in &config.hierarchical.fields {
        if field.name.trim().is_empty() {
            return Err(invalid("hierarchical.fields entries need a name"));
        }
        if field.fallback.as_deref().is_some_and(|f| f.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "fallback for field {} cannot be blank",
                field.name
            )));
        }
    }
    if config.hierarchical.fallback_segment.trim().is_empty() {
        return Err(invalid("hierarchical.fallback_segment cannot be blank"));
    }

    if config.grouping.field.trim().is_empty() {
        return Err(invalid("grouping.field cannot be empty"));
    }

    if config.copy.buffer_size == 0 {
        return Err(invalid("copy.buffer_size cannot be 0"));
    }

    Ok(())
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::ValidationError(msg.to_string())
}

/// Lexical normalization, enough to catch `a/b` vs `a/b/` vs `a/./b`.
fn normalized(path: &Path) -> Vec<Component<'_>> {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HierarchyField;

    fn valid() -> Config {
        Config::new("/in", "/out").with_max_workers(4)
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_validate_zero_workers_fails() {
        let config = valid().with_max_workers(0);
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_same_roots_only_allowed_for_grouping() {
        let config = Config::new("/studies", "/studies/").with_max_workers(1);
        assert!(validate_config(&config).is_err());

        let config = config.with_mode(SortMode::Grouping);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_dotted_extension_fails() {
        let mut config = valid();
        config.naming.canonical_extension = ".dcm".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_hierarchy_fails() {
        let mut config = valid();
        config.hierarchical.fields.clear();
        assert!(validate_config(&config).is_err());

        config.hierarchical.fields = vec![HierarchyField::new("PatientID", Some("  "))];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_tiny_segment_budget_fails() {
        let mut config = valid();
        config.naming.max_segment_bytes = 4;
        assert!(validate_config(&config).is_err());
    }
}
