//! # In-process allocation tracing
//!
//! The tracer records every heap block allocated through
//! [`TracingAllocator`] while tracing is on, together with the raw call
//! stack that requested it. Snapshots copy that table and resolve the raw
//! stacks to source lines (see [`crate::snapshot`]).
//!
//! ## Data Flow
//!
//! ```text
//! alloc / realloc / dealloc
//!     │
//!     ├──► capture_stack()        ← raw IPs into a fixed buffer, no heap
//!     │
//!     └──► TraceTable             ← addr → (size, StackId), stacks interned
//!              │
//!              ▼ take_snapshot()
//!         RawSnapshot ──► FrameResolver ──► Snapshot
//! ```
//!
//! ## Reentrancy
//!
//! The hooks run inside the global allocator, so anything they allocate
//! comes straight back into them. Two thread-local flags keep that safe:
//! recording is suppressed while a hook is already recording, and the table
//! is never touched while this thread holds its lock. The hooks never log
//! and never panic.

pub mod allocator;
pub(crate) mod capture;
pub(crate) mod table;

pub use allocator::TracingAllocator;

use log::{debug, info};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::domain::TracerError;
use crate::snapshot::{FrameResolver, Snapshot};
use capture::{capture_stack, table_held, FlagGuard};
use table::{RawSnapshot, TraceTable};

/// Largest accepted traceback limit.
pub const MAX_NFRAME: usize = 64;

/// Extra raw frames captured above the traceback limit.
///
/// The innermost frames of every stack belong to the tracer, the allocator
/// shims and the collection internals; they are skipped during resolution.
pub const ALLOCATOR_FRAME_ALLOWANCE: usize = 48;

static TRACING: AtomicBool = AtomicBool::new(false);
static TRACEBACK_LIMIT: AtomicUsize = AtomicUsize::new(1);
static TABLE: Mutex<Option<TraceTable>> = Mutex::new(None);

/// Run `f` against the table with the lock held.
///
/// Returns `None` if this thread already holds the lock.
fn with_table<R>(f: impl FnOnce(&mut TraceTable) -> R) -> Option<R> {
    let _held = FlagGuard::hold_table()?;
    let mut guard = TABLE.lock().unwrap_or_else(PoisonError::into_inner);
    Some(f(guard.get_or_insert_with(TraceTable::new)))
}

pub(crate) fn on_alloc(addr: usize, size: usize) {
    if !TRACING.load(Ordering::Relaxed) || table_held() {
        return;
    }
    let Some(_suppressed) = FlagGuard::suppress() else {
        return;
    };
    let depth = TRACEBACK_LIMIT.load(Ordering::Relaxed) + ALLOCATOR_FRAME_ALLOWANCE;
    let stack = capture_stack(depth);
    with_table(|table| table.record_alloc(addr, size, stack.as_slice()));
}

pub(crate) fn on_free(addr: usize) {
    if !TRACING.load(Ordering::Relaxed) || table_held() {
        return;
    }
    with_table(|table| table.record_free(addr));
}

/// Start tracing allocations, keeping at most `nframe` frames per traceback.
///
/// Calling this while tracing is already on only changes the limit. A new
/// session starts from an empty table.
///
/// # Errors
/// Returns [`TracerError::InvalidFrameLimit`] unless `1 <= nframe <= MAX_NFRAME`.
pub fn start(nframe: usize) -> Result<(), TracerError> {
    if !(1..=MAX_NFRAME).contains(&nframe) {
        return Err(TracerError::InvalidFrameLimit { got: nframe, max: MAX_NFRAME });
    }
    debug!("Starting allocation tracing (traceback limit {nframe})");
    TRACEBACK_LIMIT.store(nframe, Ordering::Relaxed);
    if !is_tracing() {
        // A hook racing the previous stop() may have recorded after its clear
        with_table(TraceTable::clear);
    }
    TRACING.store(true, Ordering::SeqCst);
    Ok(())
}

/// Stop tracing and forget every recorded trace.
pub fn stop() {
    TRACING.store(false, Ordering::SeqCst);
    with_table(TraceTable::clear);
    debug!("Allocation tracing stopped");
}

#[must_use]
pub fn is_tracing() -> bool {
    TRACING.load(Ordering::SeqCst)
}

/// Maximum number of frames stored per traceback.
#[must_use]
pub fn traceback_limit() -> usize {
    TRACEBACK_LIMIT.load(Ordering::Relaxed)
}

/// Bytes held by traced blocks: `(current, peak)`.
///
/// Both are zero when tracing is off.
#[must_use]
pub fn traced_memory() -> (usize, usize) {
    if !is_tracing() {
        return (0, 0);
    }
    with_table(|table| table.traced_memory()).unwrap_or((0, 0))
}

/// Set the peak to the current traced size.
pub fn reset_peak() {
    if is_tracing() {
        with_table(TraceTable::reset_peak);
    }
}

/// Forget all traces. Tracing stays on.
pub fn clear_traces() {
    with_table(TraceTable::clear);
}

/// Approximate bytes used by the tracer's own tables.
#[must_use]
pub fn tracer_memory() -> usize {
    with_table(|table| table.memory_usage()).unwrap_or(0)
}

/// Number of blocks currently traced.
#[must_use]
pub fn traced_blocks() -> usize {
    with_table(|table| table.len()).unwrap_or(0)
}

/// Run `f` with allocation recording suppressed on this thread.
///
/// Frees of traced blocks inside `f` are still observed.
pub fn untraced<R>(f: impl FnOnce() -> R) -> R {
    let _suppressed = FlagGuard::suppress();
    f()
}

/// Take a snapshot, resolving frames against the current executable.
///
/// # Errors
/// Returns [`TracerError::NotTracing`] when tracing is off, or a
/// symbolization error if the executable's debug info cannot be loaded.
pub fn take_snapshot() -> Result<Snapshot, TracerError> {
    if !is_tracing() {
        return Err(TracerError::NotTracing);
    }
    untraced(|| {
        let resolver = FrameResolver::for_current_exe()?;
        take_snapshot_with(&resolver)
    })
}

/// Take a snapshot using an existing resolver.
///
/// Reusing one resolver across snapshots keeps its symbol cache warm. Build
/// it before [`start`] or inside [`untraced`] so its own memory is not traced.
///
/// # Errors
/// Returns [`TracerError::NotTracing`] when tracing is off.
pub fn take_snapshot_with(resolver: &FrameResolver) -> Result<Snapshot, TracerError> {
    if !is_tracing() {
        return Err(TracerError::NotTracing);
    }
    untraced(|| {
        let raw: RawSnapshot = with_table(|table| table.raw_snapshot()).unwrap_or_default();
        let limit = traceback_limit();
        info!(
            "Snapshot: {} traces over {} distinct stacks (limit {limit})",
            raw.traces.len(),
            raw.stacks.len()
        );
        Ok(resolver.resolve(&raw, limit))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_rejects_out_of_range_limits() {
        assert!(matches!(start(0), Err(TracerError::InvalidFrameLimit { got: 0, .. })));
        assert!(matches!(
            start(MAX_NFRAME + 1),
            Err(TracerError::InvalidFrameLimit { max: MAX_NFRAME, .. })
        ));
    }

    #[test]
    fn test_start_discards_traces_left_after_stop() {
        stop();
        with_table(|table| table.record_alloc(0x1000, 256, &[0x10, 0x20]));

        start(1).unwrap();
        assert_eq!(traced_blocks(), 0);
        assert_eq!(traced_memory(), (0, 0));

        // Restarting while on keeps the session's traces
        with_table(|table| table.record_alloc(0x2000, 64, &[0x10]));
        start(2).unwrap();
        assert_eq!(traced_blocks(), 1);
        assert_eq!(traceback_limit(), 2);
        stop();
    }

    #[test]
    fn test_untraced_returns_closure_value() {
        assert_eq!(untraced(|| 41 + 1), 42);
    }
}
