//! Point-in-time capture of traced allocations.
//!
//! A [`Snapshot`] is plain data: resolved traces plus the traceback limit in
//! force when it was taken. It can be grouped into statistics, diffed
//! against another snapshot, filtered, and persisted as JSON.

pub mod filter;
pub mod resolver;

pub use filter::{fnmatch, Filter};
pub use resolver::FrameResolver;

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use crate::analysis::{compare_statistics, group_statistics, Statistic, StatisticDiff};
use crate::domain::{KeyType, SnapshotError, Traceback};
use crate::export::{dump_snapshot, load_snapshot};

/// One traced block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    pub size: usize,
    pub traceback: Arc<Traceback>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    traces: Vec<Trace>,
    traceback_limit: usize,
}

impl Snapshot {
    #[must_use]
    pub fn new(traces: Vec<Trace>, traceback_limit: usize) -> Self {
        Self { traces, traceback_limit }
    }

    #[must_use]
    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    /// Frame limit the tracer used when this snapshot was taken.
    #[must_use]
    pub fn traceback_limit(&self) -> usize {
        self.traceback_limit
    }

    /// Total bytes across all traces.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.traces.iter().map(|t| t.size).sum()
    }

    /// Group traces by `key_type`, biggest first.
    ///
    /// # Errors
    /// Returns [`SnapshotError::CumulativeTraceback`] for traceback keys in
    /// cumulative mode.
    pub fn statistics(
        &self,
        key_type: KeyType,
        cumulative: bool,
    ) -> Result<Vec<Statistic>, SnapshotError> {
        group_statistics(&self.traces, key_type, cumulative)
    }

    /// Differences from `old` to `self`, biggest change first.
    ///
    /// # Errors
    /// Returns [`SnapshotError::CumulativeTraceback`] for traceback keys in
    /// cumulative mode.
    pub fn compare_to(
        &self,
        old: &Snapshot,
        key_type: KeyType,
        cumulative: bool,
    ) -> Result<Vec<StatisticDiff>, SnapshotError> {
        compare_statistics(&self.traces, &old.traces, key_type, cumulative)
    }

    /// New snapshot holding only the traces that pass `filters`.
    ///
    /// An empty filter list keeps everything.
    #[must_use]
    pub fn filter_traces(&self, filters: &[Filter]) -> Snapshot {
        let traces = self
            .traces
            .iter()
            .filter(|trace| filter::keep_traceback(filters, &trace.traceback))
            .cloned()
            .collect();
        Snapshot { traces, traceback_limit: self.traceback_limit }
    }

    /// Write the snapshot to `path` as JSON.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let file = File::create(path)?;
        dump_snapshot(BufWriter::new(file), self)
    }

    /// Read a snapshot previously written by [`Snapshot::dump`].
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or has
    /// an unsupported format version.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let file = File::open(path)?;
        load_snapshot(BufReader::new(file))
    }
}
