//! Analysis logic for snapshots
//!
//! Pure aggregation over resolved traces, separated from the tracer and
//! the report layer.

pub mod statistics;

pub use statistics::{compare_statistics, group_statistics, Statistic, StatisticDiff};
