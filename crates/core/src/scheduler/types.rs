//! Types for the scheduler module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::classifier::PlacementKey;
use crate::config::SortMode;

/// A snapshotted item (hierarchical) or folder (grouping).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    pub path: PathBuf,
    /// Position in the snapshot.
    pub index: usize,
}

/// Lifecycle of a folder in grouping mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderState {
    Discovered,
    Normalized,
    KeyResolved,
    Skipped,
    Merged,
    Failed,
}

impl FolderState {
    /// Whether no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FolderState::Skipped | FolderState::Merged | FolderState::Failed
        )
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: FolderState) -> bool {
        use FolderState::*;
        matches!(
            (self, next),
            (Discovered, Normalized)
                | (Discovered, Failed)
                | (Normalized, KeyResolved)
                | (Normalized, Skipped)
                | (Normalized, Failed)
                | (KeyResolved, Merged)
                | (KeyResolved, Skipped)
                | (KeyResolved, Failed)
        )
    }
}

/// Step a unit was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Normalize,
    Resolve,
    Copy,
    Merge,
    /// The worker task itself died.
    Worker,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Normalize => "normalize",
            Phase::Resolve => "resolve",
            Phase::Copy => "copy",
            Phase::Merge => "merge",
            Phase::Worker => "worker",
        };
        f.write_str(s)
    }
}

/// How a unit ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum UnitOutcome {
    /// Hierarchical item copied.
    Placed { destination: PathBuf, bytes: u64 },
    /// Grouping folder merged. Zero files when the folder already is its
    /// own destination.
    Merged {
        destination: PathBuf,
        files: usize,
        bytes: u64,
    },
    /// Left untouched.
    Skipped { reason: String },
    Failed { phase: Phase, error: String },
}

impl UnitOutcome {
    /// Label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            UnitOutcome::Placed { .. } => "placed",
            UnitOutcome::Merged { .. } => "merged",
            UnitOutcome::Skipped { .. } => "skipped",
            UnitOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, UnitOutcome::Failed { .. })
    }

    /// Files and bytes written by this unit.
    pub fn copied(&self) -> (usize, u64) {
        match self {
            UnitOutcome::Placed { bytes, .. } => (1, *bytes),
            UnitOutcome::Merged { files, bytes, .. } => (*files, *bytes),
            _ => (0, 0),
        }
    }

    /// Terminal folder state matching this outcome.
    pub fn folder_state(&self) -> FolderState {
        match self {
            UnitOutcome::Placed { .. } | UnitOutcome::Merged { .. } => FolderState::Merged,
            UnitOutcome::Skipped { .. } => FolderState::Skipped,
            UnitOutcome::Failed { .. } => FolderState::Failed,
        }
    }
}

/// Report for one finished unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    pub unit: SourceUnit,
    /// Placement key, when one was derived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<PlacementKey>,
    pub outcome: UnitOutcome,
    /// Items disagreed on the grouping key (audited runs only).
    #[serde(default)]
    pub heterogeneous: bool,
    pub duration_ms: u64,
}

impl UnitReport {
    pub(crate) fn new(unit: SourceUnit, outcome: UnitOutcome) -> Self {
        Self {
            unit,
            key: None,
            outcome,
            heterogeneous: false,
            duration_ms: 0,
        }
    }
}

/// Status of the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Pool name ("items", "normalize", "folders").
    pub name: String,
    /// Units currently being processed.
    pub active_jobs: usize,
    /// Maximum concurrent units.
    pub max_concurrent: usize,
    /// Units waiting for a worker.
    pub queued_jobs: usize,
    /// Total units finished since the scheduler was created.
    pub total_processed: u64,
    /// Total units failed since the scheduler was created.
    pub total_failed: u64,
}

/// Aggregated result of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: SortMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Units in the snapshot.
    pub discovered: usize,
    pub placed: usize,
    pub merged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub heterogeneous_folders: usize,
    /// Items renamed in place to the canonical extension.
    pub renamed: usize,
    /// Renames refused because the canonical name was taken.
    pub rename_refusals: usize,
    pub files_copied: usize,
    pub bytes_copied: u64,
    /// Per-unit reports in snapshot order.
    pub reports: Vec<UnitReport>,
}

impl RunSummary {
    pub(crate) fn from_reports(
        mode: SortMode,
        started_at: DateTime<Utc>,
        mut reports: Vec<UnitReport>,
        renamed: usize,
        rename_refusals: usize,
    ) -> Self {
        reports.sort_by_key(|r| r.unit.index);
        let finished_at = Utc::now();

        let mut summary = Self {
            mode,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
            discovered: reports.len(),
            placed: 0,
            merged: 0,
            skipped: 0,
            failed: 0,
            heterogeneous_folders: 0,
            renamed,
            rename_refusals,
            files_copied: 0,
            bytes_copied: 0,
            reports: Vec::new(),
        };

        for report in &reports {
            match report.outcome {
                UnitOutcome::Placed { .. } => summary.placed += 1,
                UnitOutcome::Merged { .. } => summary.merged += 1,
                UnitOutcome::Skipped { .. } => summary.skipped += 1,
                UnitOutcome::Failed { .. } => summary.failed += 1,
            }
            if report.heterogeneous {
                summary.heterogeneous_folders += 1;
            }
            let (files, bytes) = report.outcome.copied();
            summary.files_copied += files;
            summary.bytes_copied += bytes;
        }

        summary.reports = reports;
        summary
    }

    /// Units that were placed or merged.
    pub fn succeeded(&self) -> usize {
        self.placed + self.merged
    }

    /// Report for the unit at `path`, if it was in the snapshot.
    pub fn report_for(&self, path: &std::path::Path) -> Option<&UnitReport> {
        self.reports.iter().find(|r| r.unit.path == path)
    }
}
