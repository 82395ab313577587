//! Hierarchical mode integration tests.
//!
//! These tests run the traversal scheduler end to end with the mock reader:
//! - Placement under `<patient>/<study>/<series>/<item>`
//! - Sentinel segments and the fallback bucket
//! - Idempotence across runs and fresh destinations
//! - Destination nested inside the source
//! - Optional in-place renaming and source layout preservation

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use dicomsort_core::{
    config::{Config, SortMode},
    scheduler::{RunSummary, TraversalScheduler, UnitOutcome},
    testing::{fixtures, MockMetadataReader},
};

/// Test helper owning a source tree and a destination root.
struct TestHarness {
    temp_dir: TempDir,
    reader: MockMetadataReader,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
            reader: MockMetadataReader::new(),
        }
    }

    fn source(&self) -> PathBuf {
        self.temp_dir.path().join("in")
    }

    fn output(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    fn config(&self, destination: &Path) -> Config {
        Config::new(self.source(), destination)
            .with_mode(SortMode::Hierarchical)
            .with_max_workers(4)
    }

    async fn item(&self, relative: &str, fields: &[(&str, &str)]) -> PathBuf {
        let path = self.source().join(relative);
        fixtures::write_item(&path, fields).await;
        path
    }

    async fn junk(&self, relative: &str) -> PathBuf {
        let path = self.source().join(relative);
        fixtures::write_raw(&path, b"\x00\x01not a record").await;
        path
    }

    async fn run(&self, config: Config) -> RunSummary {
        TraversalScheduler::new(config, self.reader.clone())
            .run()
            .await
            .expect("run failed")
    }
}

/// Fields for a fully keyed item.
fn full<'a>(patient: &'a str, study: &'a str, series: &'a str) -> Vec<(&'a str, &'a str)> {
    vec![
        ("PatientID", patient),
        ("StudyInstanceUID", study),
        ("SeriesDescription", series),
    ]
}

#[tokio::test]
async fn test_missing_series_uses_sentinel() {
    let h = TestHarness::new();
    h.item("img1.dcm", &[("PatientID", "P1"), ("StudyInstanceUID", "S1")])
        .await;

    let out = h.output("OUT");
    let summary = h.run(h.config(&out)).await;

    assert_eq!(summary.placed, 1);
    assert!(out.join("P1/S1/UnknownSeries/img1.dcm").is_file());
}

#[tokio::test]
async fn test_every_keyed_item_copied_exactly_once() {
    let h = TestHarness::new();
    for i in 0..12 {
        let series = if i % 2 == 0 { "AX T1" } else { "COR T2" };
        h.item(&format!("batch{}/im{:02}.dcm", i % 3, i), &full("P1", "S1", series))
            .await;
    }

    let out = h.output("OUT");
    let summary = h.run(h.config(&out)).await;

    assert_eq!(summary.discovered, 12);
    assert_eq!(summary.placed, 12);
    assert_eq!(summary.files_copied, 12);
    let files = fixtures::list_files(&out);
    assert_eq!(files.len(), 12);
    assert!(files.contains(&PathBuf::from("P1/S1/AX T1/im00.dcm")));
    assert!(files.contains(&PathBuf::from("P1/S1/COR T2/im11.dcm")));
    assert_eq!(h.reader.read_count(), 12);
}

#[tokio::test]
async fn test_fallback_bucket_and_non_matching_items() {
    let h = TestHarness::new();
    h.junk("broken.dcm").await;
    h.junk("scan.IMA").await;
    h.junk("notes.txt").await;
    h.item("IM0001", &full("P2", "S9", "Scout")).await;

    let out = h.output("OUT");
    let summary = h.run(h.config(&out)).await;

    assert_eq!(summary.placed, 3);
    assert_eq!(summary.skipped, 1);
    assert_eq!(
        fixtures::list_files(&out),
        vec![
            PathBuf::from("P2/S9/Scout/IM0001.dcm"),
            PathBuf::from("UnknownPatient/UnknownStudy/UnknownSeries/broken.dcm"),
            PathBuf::from("UnknownPatient/UnknownStudy/UnknownSeries/scan.IMA.dcm"),
        ]
    );

    let skipped = summary.report_for(&h.source().join("notes.txt")).unwrap();
    assert!(matches!(skipped.outcome, UnitOutcome::Skipped { .. }));
}

#[tokio::test]
async fn test_unsafe_values_are_sanitized() {
    let h = TestHarness::new();
    h.item("a.dcm", &full("../../etc", "1.2.3", "T1/T2: post*")).await;

    let out = h.output("OUT");
    h.run(h.config(&out)).await;

    assert_eq!(
        fixtures::list_files(&out),
        vec![PathBuf::from(".._.._etc/1.2.3/T1_T2_ post_/a.dcm")]
    );
}

#[tokio::test]
async fn test_idempotent_across_fresh_destinations() {
    let h = TestHarness::new();
    h.item("a/1.dcm", &full("P1", "S1", "T1")).await;
    h.item("a/2.dcm", &[("PatientID", "P1")]).await;
    h.junk("b/3.dcm").await;

    let first = h.output("OUT1");
    let second = h.output("OUT2");
    h.run(h.config(&first)).await;
    h.run(h.config(&second)).await;

    let files = fixtures::list_files(&first);
    assert_eq!(files, fixtures::list_files(&second));
    for file in files {
        assert_eq!(
            std::fs::read(first.join(&file)).unwrap(),
            std::fs::read(second.join(&file)).unwrap()
        );
    }
}

#[tokio::test]
async fn test_rerun_into_same_destination_converges() {
    let h = TestHarness::new();
    h.item("1.dcm", &full("P1", "S1", "T1")).await;
    h.item("2.dcm", &full("P1", "S1", "T2")).await;

    let out = h.output("OUT");
    h.run(h.config(&out)).await;
    let after_first = fixtures::list_files(&out);
    let summary = h.run(h.config(&out)).await;

    assert_eq!(summary.placed, 2);
    assert_eq!(fixtures::list_files(&out), after_first);
}

#[tokio::test]
async fn test_destination_inside_source_is_not_reprocessed() {
    let h = TestHarness::new();
    h.item("1.dcm", &full("P1", "S1", "T1")).await;

    let out = h.source().join("sorted");
    let first = h.run(h.config(&out)).await;
    let second = h.run(h.config(&out)).await;

    assert_eq!(first.discovered, 1);
    assert_eq!(second.discovered, 1);
    assert_eq!(
        fixtures::list_files(&out),
        vec![PathBuf::from("P1/S1/T1/1.dcm")]
    );
}

#[tokio::test]
async fn test_preserve_source_layout_prefixes_keys() {
    let h = TestHarness::new();
    h.item("site1/day2/x.dcm", &full("P1", "S1", "T1")).await;
    h.item("y.dcm", &full("P1", "S1", "T1")).await;

    let out = h.output("OUT");
    let mut config = h.config(&out);
    config.hierarchical = config.hierarchical.with_preserve_source_layout(true);
    h.run(config).await;

    assert_eq!(
        fixtures::list_files(&out),
        vec![
            PathBuf::from("P1/S1/T1/y.dcm"),
            PathBuf::from("site1/day2/P1/S1/T1/x.dcm"),
        ]
    );
}

#[tokio::test]
async fn test_rename_sources_in_place() {
    let h = TestHarness::new();
    h.item("x", &full("P1", "S1", "T1")).await;
    h.item("y", &full("P1", "S1", "T1")).await;
    h.item("y.dcm", &full("P1", "S1", "T1")).await;

    let out = h.output("OUT");
    let mut config = h.config(&out);
    config.hierarchical = config.hierarchical.with_rename_sources(true);
    let summary = h.run(config).await;

    assert_eq!(summary.renamed, 1);
    assert_eq!(summary.rename_refusals, 1);
    assert!(h.source().join("x.dcm").is_file());
    assert!(!h.source().join("x").exists());
    // The refused item keeps its name in the source tree.
    assert!(h.source().join("y").is_file());
    assert!(out.join("P1/S1/T1/x.dcm").is_file());
    assert!(out.join("P1/S1/T1/y.dcm").is_file());
    assert!(out.join("P1/S1/T1/y").is_file());
}

#[tokio::test]
async fn test_canonical_name_taken_by_sibling_keeps_both_items() {
    let h = TestHarness::new();
    h.item("x", &full("P1", "S1", "T1")).await;
    h.item("x.dcm", &full("P1", "S1", "T1")).await;
    h.item("z", &full("P1", "S1", "T1")).await;

    let out = h.output("OUT");
    let summary = h.run(h.config(&out)).await;

    assert_eq!(summary.placed, 3);
    assert_eq!(
        fixtures::list_files(&out),
        vec![
            PathBuf::from("P1/S1/T1/x"),
            PathBuf::from("P1/S1/T1/x.dcm"),
            PathBuf::from("P1/S1/T1/z.dcm"),
        ]
    );

    let report = summary.report_for(&h.source().join("x")).unwrap();
    assert!(matches!(
        &report.outcome,
        UnitOutcome::Placed { destination, .. } if destination == &out.join("P1/S1/T1/x")
    ));
}

#[tokio::test]
async fn test_sources_untouched_without_rename() {
    let h = TestHarness::new();
    h.item("x", &full("P1", "S1", "T1")).await;

    let out = h.output("OUT");
    h.run(h.config(&out)).await;

    assert!(h.source().join("x").is_file());
    assert!(!h.source().join("x.dcm").exists());
    assert!(out.join("P1/S1/T1/x.dcm").is_file());
}

#[tokio::test]
async fn test_results_do_not_depend_on_pool_size() {
    let h = TestHarness::new();
    for i in 0..20 {
        h.item(&format!("{}.dcm", i), &full("P1", ["S1", "S2"][i % 2], "T1"))
            .await;
    }

    let narrow = h.output("OUT1");
    let wide = h.output("OUT2");
    h.run(h.config(&narrow).with_max_workers(1)).await;
    let mut config = h.config(&wide).with_max_workers(16);
    config.copy = config.copy.with_checksum_verification(true);
    h.run(config).await;

    assert_eq!(fixtures::list_files(&narrow), fixtures::list_files(&wide));
    assert_eq!(fixtures::list_files(&wide).len(), 20);
}
