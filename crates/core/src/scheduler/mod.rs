//! Scheduler module for walking the source tree and dispatching units.
//!
//! This module provides the `TraversalScheduler` which coordinates:
//! - Snapshot: enumerating every unit before any is processed
//! - Hierarchical mode: extract, classify and copy each item
//! - Grouping mode: normalize every folder, then resolve and merge each one
//!
//! Units run on a bounded pool (a semaphore over a `JoinSet`). Outcomes are
//! aggregated into a [`RunSummary`] and can be streamed over a channel.
//!
//! # Example
//!
//! ```ignore
//! use dicomsort_core::config::Config;
//! use dicomsort_core::metadata::DicomMetadataReader;
//! use dicomsort_core::scheduler::TraversalScheduler;
//!
//! let scheduler = TraversalScheduler::new(config, DicomMetadataReader::new());
//!
//! let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel(100);
//! tokio::spawn(async move {
//!     while let Some(report) = progress_rx.recv().await {
//!         println!("{}: {:?}", report.unit.path.display(), report.outcome);
//!     }
//! });
//!
//! let summary = scheduler.run_with_progress(progress_tx).await?;
//! println!("Finished processing: {} merged", summary.merged);
//! ```

mod error;
mod snapshot;
mod traversal;
mod types;

pub use error::SchedulerError;
pub use snapshot::{excluded_subtree, snapshot_folders, snapshot_items};
pub use traversal::TraversalScheduler;
pub use types::{
    FolderState, Phase, PoolStatus, RunSummary, SourceUnit, UnitOutcome, UnitReport,
};
