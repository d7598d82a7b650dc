//! # memtop - Allocation tracing with per-line statistics
//!
//! memtop records every heap allocation made through its global allocator
//! wrapper, attributes each block to the source line that requested it, and
//! reports the lines holding the most memory.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       User Program                              │
//! │        #[global_allocator] TracingAllocator<System>             │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ alloc / realloc / dealloc
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  tracer: raw stack capture + trace table (addr → size, stack)   │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ take_snapshot()
//!                         ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Symbolizer   │──▶│  Snapshot    │──▶│   Analysis   │──▶ report
//! │ (DWARF)      │   │ (resolved)   │   │ (statistics) │
//! └──────────────┘   └──────┬───────┘   └──────────────┘
//!                           │
//!                           ▼
//!                    ┌──────────────┐
//!                    │    Export    │
//!                    │ (JSON dump)  │
//!                    └──────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`tracer`]: the `GlobalAlloc` wrapper, tracing state and snapshot entry points
//! - [`symbolization`]: address → function/file/line via `addr2line`
//! - [`classification`]: user code vs std/allocator/third-party frames
//! - [`snapshot`]: resolved traces, filters, statistics and comparison
//! - [`analysis`]: grouping by line, file or traceback
//! - [`export`]: JSON persistence of snapshots
//! - [`report`]: console formatting
//! - [`sample`]: the demo workload
//! - [`cli`]: command-line arguments
//! - [`domain`]: shared types and errors
//!
//! ## Typical Usage
//!
//! ```rust,ignore
//! use memtop::domain::KeyType;
//! use memtop::tracer::{self, TracingAllocator};
//! use std::alloc::System;
//!
//! #[global_allocator]
//! static GLOBAL: TracingAllocator<System> = TracingAllocator::new(System);
//!
//! tracer::start(1)?;
//! let data: Vec<Vec<u64>> = (0..100).map(|_| (0..1000).collect()).collect();
//! let snapshot = tracer::take_snapshot()?;
//! for stat in snapshot.statistics(KeyType::Lineno, false)?.iter().take(5) {
//!     println!("{stat}");
//! }
//! ```

pub mod analysis;
pub mod classification;
pub mod cli;
pub mod domain;
pub mod export;
pub mod report;
pub mod sample;
pub mod snapshot;
pub mod symbolization;
pub mod tracer;
