//! # memtop - Main Entry Point
//!
//! Supports two operational modes:
//! - **Trace** (default): start tracing, allocate the sample lists, snapshot,
//!   print the top lines
//! - **Replay** (`--load snapshot.json`): report on a saved snapshot

// Byte counts converted to f64 for display only
#![allow(clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::alloc::System;
use std::io::{self, Write};

use memtop::cli::Args;
use memtop::domain::{SnapshotError, TracerError};
use memtop::report::{self, format_size};
use memtop::sample::allocate_lists;
use memtop::snapshot::{Filter, FrameResolver, Snapshot};
use memtop::tracer::{self, TracingAllocator};

#[global_allocator]
static GLOBAL: TracingAllocator<System> = TracingAllocator::new(System);

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let usage = err.chain().any(|cause| {
        matches!(cause.downcast_ref::<TracerError>(), Some(TracerError::InvalidFrameLimit { .. }))
            || matches!(
                cause.downcast_ref::<SnapshotError>(),
                Some(SnapshotError::CumulativeTraceback)
            )
    });
    if usage {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn build_filters(args: &Args) -> Vec<Filter> {
    let mut filters: Vec<Filter> = args.include.iter().map(Filter::include).collect();
    filters.extend(args.exclude.iter().map(Filter::exclude));
    if args.hide_unknown {
        filters.push(Filter::exclude(memtop::domain::UNKNOWN_FILENAME));
    }
    filters
}

/// Start tracing, allocate the sample data and snapshot it.
fn trace_sample(args: &Args) -> Result<Snapshot> {
    // Built before tracing starts so the symbolizer's own memory is not traced
    let resolver =
        FrameResolver::for_current_exe().context("Failed to load debug info for line attribution")?;

    tracer::start(args.frames)?;

    let data = allocate_lists(args.rows, args.cols);

    let snapshot = tracer::take_snapshot_with(&resolver);
    let (current, peak) = tracer::traced_memory();
    let overhead = tracer::tracer_memory();
    let blocks = tracer::traced_blocks();
    tracer::stop();
    let snapshot = snapshot?;

    info!("Allocated {} lists of {} integers", data.len(), args.cols);
    if !args.quiet {
        eprintln!(
            "traced: current={}, peak={}, blocks={blocks}, tracer overhead={}",
            format_size(current as f64, false),
            format_size(peak as f64, false),
            format_size(overhead as f64, false),
        );
    }
    drop(data);

    Ok(snapshot)
}

fn run() -> Result<()> {
    let args = Args::parse();

    let baseline = args
        .compare
        .as_ref()
        .map(|path| {
            Snapshot::load(path).with_context(|| format!("Failed to load {}", path.display()))
        })
        .transpose()?;

    let snapshot = match args.load {
        Some(ref path) => {
            Snapshot::load(path).with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => trace_sample(&args)?,
    };

    if let Some(ref path) = args.dump {
        snapshot.dump(path).with_context(|| format!("Failed to write {}", path.display()))?;
        if !args.quiet {
            eprintln!("saved: {}", path.display());
        }
    }

    let filters = build_filters(&args);
    let snapshot = snapshot.filter_traces(&filters);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match baseline {
        Some(baseline) => {
            let baseline = baseline.filter_traces(&filters);
            let diffs = snapshot.compare_to(&baseline, args.key_type, args.cumulative)?;
            report::print_diff(&mut out, &diffs, args.top, args.key_type)?;
        }
        None => {
            let stats = snapshot.statistics(args.key_type, args.cumulative)?;
            report::print_top(&mut out, &stats, args.top, args.key_type)?;
            if !args.quiet {
                if let Some(remaining) = report::format_remaining(&stats, args.top) {
                    eprintln!("{remaining}");
                }
                eprintln!(
                    "total traced size: {}",
                    format_size(snapshot.total_size() as f64, false)
                );
            }
        }
    }

    out.flush()?;
    Ok(())
}
