//! Per-location statistics over snapshot traces.
//!
//! Traces are grouped by a key derived from their traceback:
//!
//! ```text
//! KeyType::Lineno     → most recent frame         src/sample.rs:14
//! KeyType::Filename   → most recent file, line 0  src/sample.rs:0
//! KeyType::Traceback  → the whole traceback
//! ```
//!
//! In cumulative mode every frame of a trace contributes once, so a caller
//! line accumulates everything allocated beneath it.
//!
//! # Performance
//!
//! - `group_statistics()`: O(traces × frames) for grouping, then
//!   O(k log k) sorting where k = distinct keys

// Sizes are reported as signed diffs; snapshots never approach i64::MAX bytes
#![allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::domain::{Frame, KeyType, SnapshotError, Traceback};
use crate::report::format_size;
use crate::snapshot::Trace;

// =============================================================================
// OUTPUT TYPES
// =============================================================================

/// Aggregated size and block count for one key.
///
/// # Display
///
/// ```text
/// /work/memtop/src/sample.rs:14: size=781 KiB, count=100, average=8000 B
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistic {
    pub traceback: Arc<Traceback>,
    /// Total bytes of the traced blocks
    pub size: usize,
    /// Number of traced blocks
    pub count: usize,
}

impl Statistic {
    /// Mean block size, `None` for an empty group.
    #[must_use]
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.size as f64 / self.count as f64)
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: size={}, count={}",
            self.traceback,
            format_size(self.size as f64, false),
            self.count
        )?;
        if let Some(average) = self.average() {
            write!(f, ", average={}", format_size(average, false))?;
        }
        Ok(())
    }
}

/// Difference of one key between an old and a new snapshot.
///
/// # Display
///
/// ```text
/// src/sample.rs:14: size=781 KiB (+781 KiB), count=100 (+100), average=8000 B
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticDiff {
    pub traceback: Arc<Traceback>,
    /// Size in the new snapshot
    pub size: usize,
    pub size_diff: i64,
    /// Count in the new snapshot
    pub count: usize,
    pub count_diff: i64,
}

impl fmt::Display for StatisticDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: size={} ({}), count={} ({:+})",
            self.traceback,
            format_size(self.size as f64, false),
            format_size(self.size_diff as f64, true),
            self.count,
            self.count_diff
        )?;
        if self.count > 0 {
            write!(f, ", average={}", format_size(self.size as f64 / self.count as f64, false))?;
        }
        Ok(())
    }
}

// =============================================================================
// GROUPING
// =============================================================================

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    size: usize,
    count: usize,
}

impl Totals {
    fn add(&mut self, size: usize) {
        self.size += size;
        self.count += 1;
    }
}

/// Key → totals. Frame keys avoid allocating a traceback per trace.
enum Groups {
    Frames(HashMap<Frame, Totals>),
    Tracebacks(HashMap<Arc<Traceback>, Totals>),
}

impl Groups {
    fn into_totals(self) -> HashMap<Arc<Traceback>, Totals> {
        match self {
            Groups::Frames(frames) => frames
                .into_iter()
                .map(|(frame, totals)| (Arc::new(Traceback::single(frame)), totals))
                .collect(),
            Groups::Tracebacks(tracebacks) => tracebacks,
        }
    }
}

fn frame_key(key_type: KeyType, frame: &Frame) -> Frame {
    match key_type {
        KeyType::Filename => Frame::new(frame.filename.clone(), 0),
        KeyType::Lineno | KeyType::Traceback => frame.clone(),
    }
}

fn group_by(
    traces: &[Trace],
    key_type: KeyType,
    cumulative: bool,
) -> Result<HashMap<Arc<Traceback>, Totals>, SnapshotError> {
    let groups = match (key_type, cumulative) {
        (KeyType::Traceback, true) => return Err(SnapshotError::CumulativeTraceback),
        (KeyType::Traceback, false) => {
            let mut groups: HashMap<Arc<Traceback>, Totals> = HashMap::new();
            for trace in traces {
                groups.entry(Arc::clone(&trace.traceback)).or_default().add(trace.size);
            }
            Groups::Tracebacks(groups)
        }
        (_, false) => {
            let mut groups: HashMap<Frame, Totals> = HashMap::new();
            for trace in traces {
                let key = frame_key(key_type, trace.traceback.most_recent());
                groups.entry(key).or_default().add(trace.size);
            }
            Groups::Frames(groups)
        }
        (_, true) => {
            let mut groups: HashMap<Frame, Totals> = HashMap::new();
            let mut seen: HashSet<Frame> = HashSet::new();
            for trace in traces {
                // Recursion must not count the same key twice for one trace
                seen.clear();
                for frame in trace.traceback.frames() {
                    let key = frame_key(key_type, frame);
                    if seen.insert(key.clone()) {
                        groups.entry(key).or_default().add(trace.size);
                    }
                }
            }
            Groups::Frames(groups)
        }
    };
    Ok(groups.into_totals())
}

/// Group traces by `key_type` and sort by size, count, then key, biggest first.
///
/// # Errors
/// Returns [`SnapshotError::CumulativeTraceback`] for traceback keys in
/// cumulative mode.
pub fn group_statistics(
    traces: &[Trace],
    key_type: KeyType,
    cumulative: bool,
) -> Result<Vec<Statistic>, SnapshotError> {
    let mut stats: Vec<Statistic> = group_by(traces, key_type, cumulative)?
        .into_iter()
        .map(|(traceback, totals)| Statistic { traceback, size: totals.size, count: totals.count })
        .collect();

    stats.sort_unstable_by(|a, b| {
        (b.size, b.count, &b.traceback).cmp(&(a.size, a.count, &a.traceback))
    });
    Ok(stats)
}

/// Diff two trace sets key by key, biggest absolute change first.
///
/// Keys only present in `old` appear with size and count zero.
///
/// # Errors
/// Returns [`SnapshotError::CumulativeTraceback`] for traceback keys in
/// cumulative mode.
pub fn compare_statistics(
    new: &[Trace],
    old: &[Trace],
    key_type: KeyType,
    cumulative: bool,
) -> Result<Vec<StatisticDiff>, SnapshotError> {
    let new_groups = group_by(new, key_type, cumulative)?;
    let mut old_groups = group_by(old, key_type, cumulative)?;

    let mut diffs: Vec<StatisticDiff> = Vec::with_capacity(new_groups.len() + old_groups.len());
    for (traceback, totals) in new_groups {
        let previous = old_groups.remove(&traceback).unwrap_or_default();
        diffs.push(StatisticDiff {
            traceback,
            size: totals.size,
            size_diff: totals.size as i64 - previous.size as i64,
            count: totals.count,
            count_diff: totals.count as i64 - previous.count as i64,
        });
    }
    for (traceback, totals) in old_groups {
        diffs.push(StatisticDiff {
            traceback,
            size: 0,
            size_diff: -(totals.size as i64),
            count: 0,
            count_diff: -(totals.count as i64),
        });
    }

    diffs.sort_unstable_by(|a, b| {
        (b.size_diff.abs(), b.size, b.count_diff.abs(), b.count, &b.traceback).cmp(&(
            a.size_diff.abs(),
            a.size,
            a.count_diff.abs(),
            a.count,
            &a.traceback,
        ))
    });
    Ok(diffs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(size: usize, frames: &[(&str, u32)]) -> Trace {
        let frames = frames.iter().map(|(f, l)| Frame::new(*f, *l)).collect();
        Trace { size, traceback: Arc::new(Traceback::new(frames, None)) }
    }

    fn create_test_traces() -> Vec<Trace> {
        vec![
            trace(8000, &[("src/a.rs", 10), ("src/main.rs", 5)]),
            trace(8000, &[("src/a.rs", 10), ("src/main.rs", 5)]),
            trace(100, &[("src/a.rs", 20), ("src/main.rs", 6)]),
            trace(4000, &[("src/b.rs", 7), ("src/main.rs", 6)]),
        ]
    }

    #[test]
    fn test_lineno_groups_by_most_recent_frame() {
        let stats = group_statistics(&create_test_traces(), KeyType::Lineno, false).unwrap();

        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].traceback.to_string(), "src/a.rs:10");
        assert_eq!((stats[0].size, stats[0].count), (16000, 2));
        assert_eq!(stats[1].traceback.to_string(), "src/b.rs:7");
        assert_eq!(stats[2].traceback.to_string(), "src/a.rs:20");
    }

    #[test]
    fn test_filename_groups_lines_together() {
        let stats = group_statistics(&create_test_traces(), KeyType::Filename, false).unwrap();

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].traceback.to_string(), "src/a.rs:0");
        assert_eq!((stats[0].size, stats[0].count), (16100, 3));
    }

    #[test]
    fn test_traceback_key_keeps_full_stack() {
        let stats = group_statistics(&create_test_traces(), KeyType::Traceback, false).unwrap();

        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].traceback.len(), 2);
        assert_eq!(stats[0].count, 2);
    }

    #[test]
    fn test_cumulative_counts_callers() {
        let stats = group_statistics(&create_test_traces(), KeyType::Lineno, true).unwrap();

        let main5 = stats.iter().find(|s| s.traceback.to_string() == "src/main.rs:5").unwrap();
        assert_eq!((main5.size, main5.count), (16000, 2));
        let main6 = stats.iter().find(|s| s.traceback.to_string() == "src/main.rs:6").unwrap();
        assert_eq!((main6.size, main6.count), (4100, 2));
    }

    #[test]
    fn test_cumulative_counts_recursive_frame_once() {
        let traces = vec![trace(64, &[("src/r.rs", 3), ("src/r.rs", 3), ("src/r.rs", 3)])];
        let stats = group_statistics(&traces, KeyType::Filename, true).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!((stats[0].size, stats[0].count), (64, 1));
    }

    #[test]
    fn test_cumulative_traceback_is_rejected() {
        let result = group_statistics(&create_test_traces(), KeyType::Traceback, true);
        assert!(matches!(result, Err(SnapshotError::CumulativeTraceback)));
    }

    #[test]
    fn test_ties_break_on_count_then_key() {
        let traces = vec![
            trace(100, &[("src/b.rs", 1)]),
            trace(100, &[("src/a.rs", 1)]),
            trace(50, &[("src/c.rs", 1)]),
            trace(50, &[("src/c.rs", 1)]),
        ];
        let stats = group_statistics(&traces, KeyType::Lineno, false).unwrap();
        // Same size 100: c has count 2
        assert_eq!(stats[0].traceback.to_string(), "src/c.rs:1");
        // Same size and count: descending key order
        assert_eq!(stats[1].traceback.to_string(), "src/b.rs:1");
        assert_eq!(stats[2].traceback.to_string(), "src/a.rs:1");
    }

    #[test]
    fn test_statistic_display() {
        let stat = Statistic {
            traceback: Arc::new(Traceback::single(Frame::new("src/sample.rs", 14))),
            size: 800_000,
            count: 100,
        };
        assert_eq!(stat.to_string(), "src/sample.rs:14: size=781 KiB, count=100, average=8000 B");
    }

    #[test]
    fn test_compare_against_empty_equals_statistics() {
        let diffs = compare_statistics(&create_test_traces(), &[], KeyType::Lineno, false).unwrap();
        assert_eq!(diffs.len(), 3);
        for diff in &diffs {
            assert_eq!(diff.size_diff, diff.size as i64);
            assert_eq!(diff.count_diff, diff.count as i64);
        }
    }

    #[test]
    fn test_compare_reports_growth_and_removal() {
        let old = vec![trace(100, &[("src/a.rs", 1)]), trace(500, &[("src/gone.rs", 2)])];
        let new = vec![trace(100, &[("src/a.rs", 1)]), trace(100, &[("src/a.rs", 1)])];

        let diffs = compare_statistics(&new, &old, KeyType::Lineno, false).unwrap();
        assert_eq!(diffs.len(), 2);

        assert_eq!(diffs[0].traceback.to_string(), "src/gone.rs:2");
        assert_eq!((diffs[0].size, diffs[0].size_diff, diffs[0].count_diff), (0, -500, -1));

        assert_eq!(diffs[1].size_diff, 100);
        assert_eq!(diffs[1].count_diff, 1);
        assert_eq!(
            diffs[1].to_string(),
            "src/a.rs:1: size=200 B (+100 B), count=2 (+1), average=100 B"
        );
    }

    #[test]
    fn test_removed_entry_display_has_no_average() {
        let diff = StatisticDiff {
            traceback: Arc::new(Traceback::single(Frame::new("src/gone.rs", 2))),
            size: 0,
            size_diff: -500,
            count: 0,
            count_diff: -1,
        };
        assert_eq!(diff.to_string(), "src/gone.rs:2: size=0 B (-500 B), count=0 (-1)");
    }
}
