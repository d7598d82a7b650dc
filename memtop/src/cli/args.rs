//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::domain::KeyType;

#[derive(Parser, Debug)]
#[command(
    name = "memtop",
    version,
    about = "Trace heap allocations and print the top memory-consuming source lines",
    after_help = "\
EXAMPLES:
    memtop                                   Allocate 100 lists of 1000 integers, show top 5 lines
    memtop --frames 4 --key-type traceback   Group by call path, 4 frames deep
    memtop --dump base.json                  Save the snapshot for later comparison
    memtop --rows 500 --compare base.json    Show what changed against a saved snapshot
    memtop --load base.json --top 10         Report on a saved snapshot without tracing"
)]
pub struct Args {
    /// Number of statistics to print
    #[arg(long, default_value_t = 5)]
    pub top: usize,

    /// Number of lists to allocate
    #[arg(long, default_value_t = 100)]
    pub rows: usize,

    /// Number of integers per list
    #[arg(long, default_value_t = 1000)]
    pub cols: usize,

    /// How to group allocations
    #[arg(long, value_enum, default_value_t = KeyType::Lineno)]
    pub key_type: KeyType,

    /// Attribute each allocation to every frame of its traceback
    #[arg(long)]
    pub cumulative: bool,

    /// Frames kept per traceback (1-64)
    #[arg(long, default_value_t = 1)]
    pub frames: usize,

    /// Keep only traces whose file matches PATTERN (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub include: Vec<String>,

    /// Drop traces whose file matches PATTERN (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Drop allocations with no resolvable user frame
    #[arg(long)]
    pub hide_unknown: bool,

    /// Save the snapshot as JSON
    #[arg(long, value_name = "FILE")]
    pub dump: Option<PathBuf>,

    /// Compare against a snapshot saved with --dump
    #[arg(long, value_name = "FILE")]
    pub compare: Option<PathBuf>,

    /// Report on a saved snapshot instead of tracing (replay mode)
    #[arg(long, value_name = "FILE", conflicts_with_all = ["dump", "rows", "cols", "frames"])]
    pub load: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["memtop"]).unwrap();
        assert_eq!(args.top, 5);
        assert_eq!(args.rows, 100);
        assert_eq!(args.cols, 1000);
        assert_eq!(args.frames, 1);
        assert_eq!(args.key_type, KeyType::Lineno);
        assert!(!args.cumulative);
        assert!(args.load.is_none());
    }

    #[test]
    fn test_repeatable_patterns_and_key_type() {
        let args = Args::try_parse_from([
            "memtop",
            "--include",
            "*/src/*",
            "--include",
            "<unknown>",
            "--exclude",
            "*/noisy.rs",
            "--key-type",
            "traceback",
        ])
        .unwrap();
        assert_eq!(args.include, vec!["*/src/*", "<unknown>"]);
        assert_eq!(args.exclude, vec!["*/noisy.rs"]);
        assert_eq!(args.key_type, KeyType::Traceback);
    }

    #[test]
    fn test_load_conflicts_with_dump() {
        let result = Args::try_parse_from(["memtop", "--load", "a.json", "--dump", "b.json"]);
        assert!(result.is_err());
    }
}
