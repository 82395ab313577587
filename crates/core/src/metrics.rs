//! Prometheus metrics for the sorting engine.
//!
//! This module provides metrics for:
//! - Units processed per mode and result
//! - Copy volume (files, bytes)
//! - Metadata extraction failures
//! - Grouping homogeneity audit

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Registry holding every engine metric.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for metric in all_metrics() {
        if let Err(e) = registry.register(metric) {
            tracing::warn!("Failed to register metric: {}", e);
        }
    }
    registry
});

// =============================================================================
// Scheduler Metrics
// =============================================================================

/// Units finished, by mode and result.
pub static UNITS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dicomsort_units_total", "Total units processed"),
        &["mode", "result"], // result: "placed", "merged", "skipped", "failed"
    )
    .unwrap()
});

/// Per-unit processing time in seconds.
pub static UNIT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "dicomsort_unit_duration_seconds",
            "Duration of processing a single unit",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        &["mode"],
    )
    .unwrap()
});

// =============================================================================
// Merger Metrics
// =============================================================================

/// Files copied into the destination tree.
pub static FILES_COPIED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("dicomsort_files_copied_total", "Total files copied").unwrap()
});

/// Bytes copied into the destination tree.
pub static BYTES_COPIED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("dicomsort_bytes_copied_total", "Total bytes copied").unwrap()
});

// =============================================================================
// Metadata Metrics
// =============================================================================

/// Extraction failures by kind.
pub static EXTRACTION_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dicomsort_extraction_failures_total",
            "Total metadata extraction failures",
        ),
        &["kind"], // "not_recognized", "permission_denied", "not_found", "io", "aborted"
    )
    .unwrap()
});

/// Folders whose items disagree on the grouping key.
pub static HETEROGENEOUS_FOLDERS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dicomsort_heterogeneous_folders_total",
        "Total folders found with more than one grouping key",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all engine metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(UNITS_TOTAL.clone()),
        Box::new(UNIT_DURATION.clone()),
        Box::new(FILES_COPIED.clone()),
        Box::new(BYTES_COPIED.clone()),
        Box::new(EXTRACTION_FAILURES.clone()),
        Box::new(HETEROGENEOUS_FOLDERS.clone()),
    ]
}

/// Encode all metrics as Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
