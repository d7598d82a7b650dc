//! Thread-local reentrancy flags and allocation-free stack capture.
//!
//! Two flags guard the allocator hooks:
//! - `SUPPRESSED`: allocations on this thread are not recorded. Set while a
//!   hook is already recording, and by [`super::untraced`].
//! - `TABLE_HELD`: this thread holds the trace table lock. Hooks must not
//!   touch the table at all, or they would deadlock on the lock.
//!
//! Both use `const` thread-local initializers so reading them never allocates.

use std::cell::Cell;
use std::thread::LocalKey;

/// Upper bound on raw frames captured per allocation.
pub(crate) const MAX_CAPTURE_DEPTH: usize = 128;

thread_local! {
    static SUPPRESSED: Cell<bool> = const { Cell::new(false) };
    static TABLE_HELD: Cell<bool> = const { Cell::new(false) };
}

/// RAII guard for one of the thread-local flags.
///
/// Only the guard that actually flipped the flag resets it on drop, so
/// nested acquisitions are harmless.
pub(crate) struct FlagGuard {
    flag: &'static LocalKey<Cell<bool>>,
}

impl FlagGuard {
    /// Set `flag` on this thread. Returns `None` if it was already set or the
    /// thread-local is gone (thread teardown).
    fn acquire(flag: &'static LocalKey<Cell<bool>>) -> Option<Self> {
        match flag.try_with(|cell| cell.replace(true)) {
            Ok(false) => Some(Self { flag }),
            _ => None,
        }
    }

    pub(crate) fn suppress() -> Option<Self> {
        Self::acquire(&SUPPRESSED)
    }

    pub(crate) fn hold_table() -> Option<Self> {
        Self::acquire(&TABLE_HELD)
    }
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        let _ = self.flag.try_with(|cell| cell.set(false));
    }
}

/// True when this thread must not touch the trace table.
///
/// Thread teardown counts as held.
pub(crate) fn table_held() -> bool {
    TABLE_HELD.try_with(Cell::get).unwrap_or(true)
}

/// Fixed-size buffer of instruction pointers, innermost call first.
pub(crate) struct RawStack {
    ips: [usize; MAX_CAPTURE_DEPTH],
    len: usize,
}

impl RawStack {
    pub(crate) fn as_slice(&self) -> &[usize] {
        &self.ips[..self.len]
    }
}

/// Walk the current call stack into a fixed buffer, at most `depth` frames.
///
/// The walk itself may allocate inside the platform unwinder; callers hold a
/// suppression guard so those allocations pass through unrecorded.
#[inline(never)]
pub(crate) fn capture_stack(depth: usize) -> RawStack {
    let depth = depth.min(MAX_CAPTURE_DEPTH);
    let mut stack = RawStack { ips: [0; MAX_CAPTURE_DEPTH], len: 0 };

    // SAFETY: on the supported Linux targets the unwinder is libgcc's
    // `_Unwind_Backtrace`, which is thread-safe. The closure only writes into
    // a stack-local buffer.
    #[allow(unsafe_code)]
    unsafe {
        backtrace::trace_unsynchronized(|frame| {
            if stack.len >= depth {
                return false;
            }
            let ip = frame.ip() as usize;
            if ip == 0 {
                return false;
            }
            stack.ips[stack.len] = ip;
            stack.len += 1;
            true
        });
    }

    stack
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_guard_is_not_reentrant() {
        let outer = FlagGuard::suppress();
        assert!(outer.is_some());
        assert!(FlagGuard::suppress().is_none());
        drop(outer);
        assert!(FlagGuard::suppress().is_some());
    }

    #[test]
    fn test_nested_guard_does_not_reset_flag() {
        let outer = FlagGuard::hold_table().expect("flag should be free");
        {
            let inner = FlagGuard::hold_table();
            assert!(inner.is_none());
        }
        assert!(table_held());
        drop(outer);
        assert!(!table_held());
    }

    #[test]
    fn test_capture_respects_depth() {
        let stack = capture_stack(3);
        assert!(!stack.as_slice().is_empty());
        assert!(stack.as_slice().len() <= 3);
        assert!(stack.as_slice().iter().all(|&ip| ip != 0));
    }

    #[test]
    fn test_capture_is_capped() {
        let stack = capture_stack(usize::MAX);
        assert!(stack.as_slice().len() <= MAX_CAPTURE_DEPTH);
    }
}
