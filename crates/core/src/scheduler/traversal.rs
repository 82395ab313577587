//! Traversal scheduler implementation.

use chrono::Utc;
use std::ffi::OsString;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use super::error::SchedulerError;
use super::snapshot::{canonical_or_lexical, snapshot_folders, snapshot_items};
use super::types::{
    FolderState, Phase, PoolStatus, RunSummary, SourceUnit, UnitOutcome, UnitReport,
};
use crate::classifier::{PathClassifier, PlacementKey};
use crate::config::{Config, SortMode};
use crate::grouping::GroupKeyResolver;
use crate::merger::DirectoryMerger;
use crate::metadata::{MetadataExtractor, MetadataReader};
use crate::metrics;
use crate::naming::{NameNormalizer, NormalizeError, NormalizeReport};

/// Tracks statistics for the worker pool.
#[derive(Default)]
struct PoolStats {
    active: AtomicU64,
    queued: AtomicU64,
    total_processed: AtomicU64,
    total_failed: AtomicU64,
}

impl PoolStats {
    fn to_status(&self, name: &str, max_concurrent: usize) -> PoolStatus {
        PoolStatus {
            name: name.to_string(),
            active_jobs: self.active.load(Ordering::Relaxed) as usize,
            max_concurrent,
            queued_jobs: self.queued.load(Ordering::Relaxed) as usize,
            total_processed: self.total_processed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &UnitOutcome) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        if outcome.is_failure() {
            self.total_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Components shared by every unit of a run.
struct Engine<R: MetadataReader> {
    config: Config,
    extractor: Arc<MetadataExtractor<R>>,
    classifier: PathClassifier,
    normalizer: NameNormalizer,
    resolver: GroupKeyResolver<R>,
    merger: DirectoryMerger,
}

/// Walks the source tree and processes every unit on a bounded pool.
///
/// Units are snapshotted before any work starts. A failing or panicking
/// unit is reported in its own [`UnitReport`] and never affects the others;
/// `run` returns once every unit has finished.
pub struct TraversalScheduler<R: MetadataReader> {
    engine: Arc<Engine<R>>,
    semaphore: Arc<Semaphore>,
    stats: Arc<PoolStats>,
}

impl<R: MetadataReader + 'static> TraversalScheduler<R> {
    /// Creates a scheduler for `config`, reading headers with `reader`.
    pub fn new(config: Config, reader: R) -> Self {
        let extractor = Arc::new(MetadataExtractor::new(reader, config.requested_fields()));
        let classifier = PathClassifier::from_config(&config);
        let normalizer = NameNormalizer::from_config(&config.naming);
        let resolver =
            GroupKeyResolver::new(Arc::clone(&extractor), classifier.clone(), normalizer.clone())
                .with_audit(config.grouping.audits());
        let merger = DirectoryMerger::new(config.copy.clone());
        let semaphore = Arc::new(Semaphore::new(config.scheduler.max_workers.max(1)));

        Self {
            engine: Arc::new(Engine {
                config,
                extractor,
                classifier,
                normalizer,
                resolver,
                merger,
            }),
            semaphore,
            stats: Arc::new(PoolStats::default()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.engine.config
    }

    /// Live counters of the worker pool.
    pub fn status(&self) -> PoolStatus {
        let name = match self.engine.config.mode {
            SortMode::Hierarchical => "items",
            SortMode::Grouping => "folders",
        };
        self.stats
            .to_status(name, self.engine.config.scheduler.max_workers.max(1))
    }

    /// Processes the whole source tree.
    pub async fn run(&self) -> Result<RunSummary, SchedulerError> {
        self.run_inner(None).await
    }

    /// Like [`run`](Self::run), streaming each unit's report as it finishes.
    ///
    /// The receiver must be drained while the run is in progress. A closed
    /// receiver does not stop the run.
    pub async fn run_with_progress(
        &self,
        progress_tx: mpsc::Sender<UnitReport>,
    ) -> Result<RunSummary, SchedulerError> {
        self.run_inner(Some(progress_tx)).await
    }

    async fn run_inner(
        &self,
        progress_tx: Option<mpsc::Sender<UnitReport>>,
    ) -> Result<RunSummary, SchedulerError> {
        let config = &self.engine.config;
        let source_root = config.source_root.clone();
        let is_dir = tokio::fs::metadata(&source_root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(SchedulerError::SourceRootMissing { path: source_root });
        }

        let started_at = Utc::now();
        tracing::info!(
            "Starting {} run: {} -> {}",
            config.mode,
            source_root.display(),
            config.destination_root.display()
        );

        let summary = match config.mode {
            SortMode::Hierarchical => {
                let units = self.snapshot(snapshot_items).await?;
                tracing::info!("Snapshot holds {} items", units.len());
                let (reports, renamed, refused) = self.run_hierarchical(units, progress_tx).await;
                RunSummary::from_reports(config.mode, started_at, reports, renamed, refused)
            }
            SortMode::Grouping => {
                let units = self.snapshot(snapshot_folders).await?;
                tracing::info!("Snapshot holds {} folders", units.len());
                let (reports, renamed, refused) = self.run_grouping(units, progress_tx).await;
                RunSummary::from_reports(config.mode, started_at, reports, renamed, refused)
            }
        };

        tracing::info!(
            "Finished processing: {} units, {} placed, {} merged, {} skipped, {} failed, {} files ({} bytes) copied",
            summary.discovered,
            summary.placed,
            summary.merged,
            summary.skipped,
            summary.failed,
            summary.files_copied,
            summary.bytes_copied
        );
        Ok(summary)
    }

    async fn snapshot(
        &self,
        walk: fn(&Path, &Path) -> Vec<SourceUnit>,
    ) -> Result<Vec<SourceUnit>, SchedulerError> {
        let source = self.engine.config.source_root.clone();
        let destination = self.engine.config.destination_root.clone();
        tokio::task::spawn_blocking(move || walk(&source, &destination))
            .await
            .map_err(|e| SchedulerError::SnapshotAborted {
                path: self.engine.config.source_root.clone(),
                reason: e.to_string(),
            })
    }

    /// Runs `work` for every unit on the bounded pool and hands each result
    /// to `on_done` as it completes. Reports returned by `on_done` are sent
    /// on `progress_tx`.
    ///
    /// Each unit runs in its own task so a panic is turned into a result by
    /// `on_panic` with the unit still known.
    async fn dispatch<T, W, Fut, P>(
        &self,
        units: Vec<SourceUnit>,
        work: W,
        on_panic: P,
        mut on_done: impl FnMut(&T) -> Option<UnitReport>,
        progress_tx: &Option<mpsc::Sender<UnitReport>>,
    ) -> Vec<T>
    where
        T: Send + 'static,
        W: Fn(SourceUnit) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        P: Fn(SourceUnit, String) -> T + Clone + Send + 'static,
    {
        let mut set = JoinSet::new();

        for unit in units {
            self.stats.queued.fetch_add(1, Ordering::Relaxed);
            let semaphore = Arc::clone(&self.semaphore);
            let stats = Arc::clone(&self.stats);
            let on_panic = on_panic.clone();
            let task = work(unit.clone());

            set.spawn(async move {
                let permit = semaphore.acquire_owned().await;
                stats.queued.fetch_sub(1, Ordering::Relaxed);
                let Ok(_permit) = permit else {
                    return on_panic(unit, "worker pool closed".to_string());
                };

                stats.active.fetch_add(1, Ordering::Relaxed);
                let result = match tokio::spawn(task).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!("Worker for {} died: {}", unit.path.display(), e);
                        on_panic(unit, e.to_string())
                    }
                };
                stats.active.fetch_sub(1, Ordering::Relaxed);
                result
            });
        }

        let mut results = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => {
                    if let Some(report) = on_done(&result) {
                        send_progress(progress_tx, report).await;
                    }
                    results.push(result);
                }
                Err(e) => tracing::error!("Worker task aborted: {}", e),
            }
        }
        results
    }

    /// Records a finished unit in metrics and pool counters. Returns a copy
    /// of the report when `streaming`.
    fn finish_report(&self, report: &UnitReport, streaming: bool) -> Option<UnitReport> {
        let mode = self.engine.config.mode.as_str();
        metrics::UNITS_TOTAL
            .with_label_values(&[mode, report.outcome.label()])
            .inc();
        metrics::UNIT_DURATION
            .with_label_values(&[mode])
            .observe(report.duration_ms as f64 / 1000.0);
        let (files, bytes) = report.outcome.copied();
        metrics::FILES_COPIED.inc_by(files as u64);
        metrics::BYTES_COPIED.inc_by(bytes);
        if report.heterogeneous {
            metrics::HETEROGENEOUS_FOLDERS.inc();
        }
        self.stats.record(&report.outcome);
        streaming.then(|| report.clone())
    }

    fn worker_died(unit: SourceUnit, error: String) -> UnitReport {
        UnitReport::new(
            unit,
            UnitOutcome::Failed {
                phase: Phase::Worker,
                error,
            },
        )
    }

    // =========================================================================
    // Hierarchical mode
    // =========================================================================

    async fn run_hierarchical(
        &self,
        units: Vec<SourceUnit>,
        progress_tx: Option<mpsc::Sender<UnitReport>>,
    ) -> (Vec<UnitReport>, usize, usize) {
        let streaming = progress_tx.is_some();
        let results = self
            .dispatch(
                units,
                |unit| {
                    let engine = Arc::clone(&self.engine);
                    async move { engine.place_item(unit).await }
                },
                |unit, error| (Self::worker_died(unit, error), RenameResult::Unchanged),
                |(report, _): &(UnitReport, RenameResult)| self.finish_report(report, streaming),
                &progress_tx,
            )
            .await;

        let renamed = results
            .iter()
            .filter(|(_, r)| *r == RenameResult::Renamed)
            .count();
        let refused = results
            .iter()
            .filter(|(_, r)| *r == RenameResult::Refused)
            .count();
        (results.into_iter().map(|(report, _)| report).collect(), renamed, refused)
    }

    // =========================================================================
    // Grouping mode
    // =========================================================================

    async fn run_grouping(
        &self,
        units: Vec<SourceUnit>,
        progress_tx: Option<mpsc::Sender<UnitReport>>,
    ) -> (Vec<UnitReport>, usize, usize) {
        let streaming = progress_tx.is_some();

        // Phase 1: every folder is normalized before any folder is merged.
        let normalized = self
            .dispatch(
                units,
                |unit| {
                    let engine = Arc::clone(&self.engine);
                    async move {
                        let result = engine.normalizer.normalize_dir(&unit.path).await;
                        (unit, result.map_err(|e| e.to_string()))
                    }
                },
                |unit, error| (unit, Err(error)),
                |_| None,
                &None,
            )
            .await;

        let mut renamed = 0;
        let mut refused = 0;
        let mut ready = Vec::new();
        let mut reports = Vec::new();
        for (unit, result) in normalized {
            match result {
                Ok(NormalizeReport {
                    renamed: r,
                    refused: f,
                    ..
                }) => {
                    renamed += r.len();
                    refused += f
                        .iter()
                        .filter(|e| matches!(e, NormalizeError::TargetExists { .. }))
                        .count();
                    tracing::debug!(
                        "{}: {:?} -> {:?}",
                        unit.path.display(),
                        FolderState::Discovered,
                        FolderState::Normalized
                    );
                    ready.push(unit);
                }
                Err(error) => {
                    tracing::warn!("Failed to normalize {}: {}", unit.path.display(), error);
                    let report = UnitReport::new(
                        unit,
                        UnitOutcome::Failed {
                            phase: Phase::Normalize,
                            error,
                        },
                    );
                    if let Some(update) = self.finish_report(&report, streaming) {
                        send_progress(&progress_tx, update).await;
                    }
                    reports.push(report);
                }
            }
        }
        ready.sort_by_key(|u| u.index);

        // Phase 2: resolve keys and merge.
        let merged = self
            .dispatch(
                ready,
                |unit| {
                    let engine = Arc::clone(&self.engine);
                    async move { engine.merge_folder(unit).await }
                },
                Self::worker_died,
                |report: &UnitReport| self.finish_report(report, streaming),
                &progress_tx,
            )
            .await;
        reports.extend(merged);

        (reports, renamed, refused)
    }
}

async fn send_progress(progress_tx: &Option<mpsc::Sender<UnitReport>>, report: UnitReport) {
    if let Some(tx) = progress_tx {
        if tx.send(report).await.is_err() {
            tracing::debug!("Progress receiver closed");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenameResult {
    Unchanged,
    Renamed,
    Refused,
}

impl<R: MetadataReader> Engine<R> {
    /// Extracts, classifies and copies one item.
    async fn place_item(&self, unit: SourceUnit) -> (UnitReport, RenameResult) {
        let start = Instant::now();
        let original = unit.path.clone();

        let (path, rename) = if self.config.hierarchical.rename_sources {
            match self.normalizer.normalize(&original).await {
                Ok(n) if n.renamed => (n.path, RenameResult::Renamed),
                Ok(n) => (n.path, RenameResult::Unchanged),
                Err(e @ NormalizeError::TargetExists { .. }) => {
                    tracing::warn!("{}", e);
                    (original.clone(), RenameResult::Refused)
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    (original.clone(), RenameResult::Unchanged)
                }
            }
        } else {
            (original.clone(), RenameResult::Unchanged)
        };

        let key = match self.extractor.extract(&path).await {
            Ok(record) => self.classifier.hierarchical_key(&record),
            Err(e) if self.normalizer.is_probe_candidate(&original) => {
                tracing::warn!(
                    "Placing {} in the fallback bucket: {}",
                    original.display(),
                    e
                );
                self.classifier.fallback_key()
            }
            Err(e) => {
                tracing::debug!("Skipping {}: {}", original.display(), e);
                let mut report = UnitReport::new(
                    unit,
                    UnitOutcome::Skipped {
                        reason: format!("not a recognizable record: {}", e.kind()),
                    },
                );
                report.duration_ms = start.elapsed().as_millis() as u64;
                return (report, rename);
            }
        };

        let key = if self.config.hierarchical.preserve_source_layout {
            key.prefixed(&self.layout_prefix(&original))
        } else {
            key
        };

        let file_name = self.destination_name(&path).await;
        let destination = key.under(&self.config.destination_root).join(file_name);

        let outcome = match self.merger.copy_file(&path, &destination).await {
            Ok(copied) => {
                tracing::debug!("Placed {} at {}", path.display(), destination.display());
                UnitOutcome::Placed {
                    destination,
                    bytes: copied.size_bytes,
                }
            }
            Err(e) => {
                tracing::warn!("Failed to place {}: {}", path.display(), e);
                UnitOutcome::Failed {
                    phase: Phase::Copy,
                    error: e.to_string(),
                }
            }
        };

        let mut report = UnitReport::new(unit, outcome);
        report.key = Some(key);
        report.duration_ms = start.elapsed().as_millis() as u64;
        (report, rename)
    }

    /// Name `item` is placed under: its canonical name, unless a sibling in
    /// the source folder already holds that name.
    async fn destination_name(&self, item: &Path) -> OsString {
        let original = item.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        let canonical = self.normalizer.canonical_path(item);
        if canonical == item {
            return original;
        }
        if tokio::fs::try_exists(&canonical).await.unwrap_or(false) {
            tracing::warn!(
                "Keeping the name of {}: {} already exists",
                item.display(),
                canonical.display()
            );
            return original;
        }
        canonical
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or(original)
    }

    /// Sanitized parent directories of `item` relative to the source root.
    fn layout_prefix(&self, item: &Path) -> Vec<String> {
        item.parent()
            .and_then(|parent| parent.strip_prefix(&self.config.source_root).ok())
            .map(|relative| {
                relative
                    .components()
                    .filter_map(|c| self.classifier.sanitize(&c.as_os_str().to_string_lossy()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolves a normalized folder's key and merges it into its target.
    async fn merge_folder(&self, unit: SourceUnit) -> UnitReport {
        let start = Instant::now();
        let folder = unit.path.clone();
        let mut state = FolderState::Normalized;

        let resolution = match self.resolver.resolve(&folder).await {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::warn!("{}", e);
                return self.folder_report(
                    unit,
                    &mut state,
                    None,
                    false,
                    UnitOutcome::Failed {
                        phase: Phase::Resolve,
                        error: e.to_string(),
                    },
                    start,
                );
            }
        };

        let heterogeneous = resolution.is_heterogeneous();
        let Some(key) = resolution.key.clone() else {
            tracing::warn!(
                "No item in {} yields {}; leaving it in place",
                folder.display(),
                self.config.grouping.field
            );
            return self.folder_report(
                unit,
                &mut state,
                None,
                false,
                UnitOutcome::Skipped {
                    reason: format!("no item yields {}", self.config.grouping.field),
                },
                start,
            );
        };
        self.transition(&folder, &mut state, FolderState::KeyResolved);

        if heterogeneous {
            let others: Vec<String> = resolution.conflicting.iter().map(|k| k.to_string()).collect();
            tracing::warn!(
                "{} is heterogeneous: decided {} but also holds {}",
                folder.display(),
                key,
                others.join(", ")
            );
            if self.config.grouping.strict {
                return self.folder_report(
                    unit,
                    &mut state,
                    Some(key),
                    true,
                    UnitOutcome::Skipped {
                        reason: format!("heterogeneous folder (also {})", others.join(", ")),
                    },
                    start,
                );
            }
        }

        let target = key.under(&self.config.destination_root);
        if canonical_or_lexical(&folder) == canonical_or_lexical(&target) {
            tracing::debug!("{} already is its destination", folder.display());
            return self.folder_report(
                unit,
                &mut state,
                Some(key),
                heterogeneous,
                UnitOutcome::Merged {
                    destination: target,
                    files: 0,
                    bytes: 0,
                },
                start,
            );
        }

        let outcome = match self.merger.merge(&folder, &target).await {
            Ok(stats) => {
                tracing::info!(
                    "Merged folder {} into {} ({} files)",
                    folder.display(),
                    target.display(),
                    stats.files_copied
                );
                UnitOutcome::Merged {
                    destination: target,
                    files: stats.files_copied,
                    bytes: stats.bytes_copied,
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to merge {} into {}: {}",
                    folder.display(),
                    target.display(),
                    e
                );
                UnitOutcome::Failed {
                    phase: Phase::Merge,
                    error: e.to_string(),
                }
            }
        };

        self.folder_report(unit, &mut state, Some(key), heterogeneous, outcome, start)
    }

    fn transition(&self, folder: &Path, state: &mut FolderState, next: FolderState) {
        debug_assert!(state.can_transition_to(next), "{:?} -> {:?}", state, next);
        tracing::debug!("{}: {:?} -> {:?}", folder.display(), state, next);
        *state = next;
    }

    fn folder_report(
        &self,
        unit: SourceUnit,
        state: &mut FolderState,
        key: Option<PlacementKey>,
        heterogeneous: bool,
        outcome: UnitOutcome,
        start: Instant,
    ) -> UnitReport {
        self.transition(&unit.path, state, outcome.folder_state());
        let mut report = UnitReport::new(unit, outcome);
        report.key = key;
        report.heterogeneous = heterogeneous;
        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }
}
