//! Console output for snapshots and comparisons.
//!
//! The report is a header line followed by at most `limit` statistics, one
//! per line. Traceback grouping appends each statistic's frames below it.

use std::io::{self, Write};

use crate::analysis::{Statistic, StatisticDiff};
use crate::domain::KeyType;

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Human-readable byte size with three or four significant digits.
///
/// ```text
/// 512        → "512 B"
/// 800_000    → "781 KiB"
/// 52_428_800 → "50.0 MiB"
/// ```
///
/// With `sign` the number always carries `+` or `-`.
#[must_use]
pub fn format_size(size: f64, sign: bool) -> String {
    let mut size = size;
    for (idx, unit) in UNITS.iter().enumerate() {
        let last = idx == UNITS.len() - 1;
        if size.abs() < 100.0 && idx > 0 {
            return if sign { format!("{size:+.1} {unit}") } else { format!("{size:.1} {unit}") };
        }
        if size.abs() < 10.0 * 1024.0 || last {
            return if sign { format!("{size:+.0} {unit}") } else { format!("{size:.0} {unit}") };
        }
        size /= 1024.0;
    }
    unreachable!("the last unit always returns")
}

/// Header line for a top-N report.
#[must_use]
pub fn top_header(limit: usize) -> String {
    format!("Top {limit} memory consumers:")
}

/// Header line for a top-N comparison.
#[must_use]
pub fn diff_header(limit: usize) -> String {
    format!("Top {limit} differences:")
}

/// Write the header and the first `limit` statistics.
///
/// Returns the number of statistics written.
///
/// # Errors
/// Returns an error if writing to `out` fails.
pub fn print_top<W: Write>(
    out: &mut W,
    stats: &[Statistic],
    limit: usize,
    key_type: KeyType,
) -> io::Result<usize> {
    writeln!(out, "{}", top_header(limit))?;
    let shown = &stats[..limit.min(stats.len())];
    for stat in shown {
        writeln!(out, "{stat}")?;
        if key_type == KeyType::Traceback {
            for line in stat.traceback.format(None, false) {
                writeln!(out, "{line}")?;
            }
        }
    }
    Ok(shown.len())
}

/// Write the header and the first `limit` differences.
///
/// # Errors
/// Returns an error if writing to `out` fails.
pub fn print_diff<W: Write>(
    out: &mut W,
    diffs: &[StatisticDiff],
    limit: usize,
    key_type: KeyType,
) -> io::Result<usize> {
    writeln!(out, "{}", diff_header(limit))?;
    let shown = &diffs[..limit.min(diffs.len())];
    for diff in shown {
        writeln!(out, "{diff}")?;
        if key_type == KeyType::Traceback {
            for line in diff.traceback.format(None, false) {
                writeln!(out, "{line}")?;
            }
        }
    }
    Ok(shown.len())
}

/// Totals for everything not shown in the top list.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_remaining(stats: &[Statistic], limit: usize) -> Option<String> {
    let rest = stats.get(limit..).filter(|rest| !rest.is_empty())?;
    let size: usize = rest.iter().map(|s| s.size).sum();
    Some(format!("{} other: {}", rest.len(), format_size(size as f64, false)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Frame, Traceback};
    use std::sync::Arc;

    fn stat(file: &str, line: u32, size: usize, count: usize) -> Statistic {
        Statistic { traceback: Arc::new(Traceback::single(Frame::new(file, line))), size, count }
    }

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(0.0, false), "0 B");
        assert_eq!(format_size(512.0, false), "512 B");
        assert_eq!(format_size(10_239.0, false), "10239 B");
        assert_eq!(format_size(10_240.0, false), "10.0 KiB");
        assert_eq!(format_size(800_000.0, false), "781 KiB");
        assert_eq!(format_size(52_428_800.0, false), "50.0 MiB");
    }

    #[test]
    fn test_format_size_sign() {
        assert_eq!(format_size(100.0, true), "+100 B");
        assert_eq!(format_size(-500.0, true), "-500 B");
        assert_eq!(format_size(0.0, true), "+0 B");
        assert_eq!(format_size(-20_480.0, true), "-20.0 KiB");
    }

    #[test]
    fn test_format_size_caps_at_tib() {
        let size = 2048.0 * 1024f64.powi(4);
        assert_eq!(format_size(size, false), "2048 TiB");
    }

    #[test]
    fn test_print_top_limits_entries() {
        let stats: Vec<Statistic> =
            (0..8).map(|i| stat("src/a.rs", i, 1000 - i as usize, 1)).collect();
        let mut out = Vec::new();
        let shown = print_top(&mut out, &stats, 5, KeyType::Lineno).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(shown, 5);
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "Top 5 memory consumers:");
        assert!(lines[1].starts_with("src/a.rs:0: size=1000 B"));
    }

    #[test]
    fn test_print_top_with_fewer_entries() {
        let stats = vec![stat("src/a.rs", 1, 10, 1)];
        let mut out = Vec::new();
        assert_eq!(print_top(&mut out, &stats, 5, KeyType::Lineno).unwrap(), 1);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_print_top_traceback_appends_frames() {
        let stats = vec![stat("/nonexistent/a.rs", 1, 10, 1)];
        let mut out = Vec::new();
        print_top(&mut out, &stats, 5, KeyType::Traceback).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("  File \"/nonexistent/a.rs\", line 1"));
    }

    #[test]
    fn test_format_remaining() {
        let stats = vec![stat("a.rs", 1, 10, 1), stat("b.rs", 1, 20, 1), stat("c.rs", 1, 30, 1)];
        assert_eq!(format_remaining(&stats, 1).as_deref(), Some("2 other: 50 B"));
        assert_eq!(format_remaining(&stats, 3), None);
        assert_eq!(format_remaining(&stats, 10), None);
    }
}
