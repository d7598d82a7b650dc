//! Trace table: live block addresses mapped to size and interned raw stack.
//!
//! All methods run with the table lock held and the `TABLE_HELD` flag set,
//! so any allocation they make bypasses the tracer.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::mem::size_of;

use crate::domain::StackId;

/// SipHash with fixed keys; building it never touches thread-locals.
type FixedState = BuildHasherDefault<DefaultHasher>;

/// One traced block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawTrace {
    pub size: usize,
    pub stack: StackId,
}

/// Unresolved copy of the table, taken for a snapshot.
#[derive(Debug, Default)]
pub(crate) struct RawSnapshot {
    pub traces: Vec<RawTrace>,
    pub stacks: Vec<Box<[usize]>>,
}

#[derive(Debug, Default)]
pub(crate) struct TraceTable {
    traces: HashMap<usize, RawTrace, FixedState>,
    stack_ids: HashMap<Box<[usize]>, StackId, FixedState>,
    stacks: Vec<Box<[usize]>>,
    current: usize,
    peak: usize,
}

impl TraceTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, ips: &[usize]) -> StackId {
        if let Some(&id) = self.stack_ids.get(ips) {
            return id;
        }
        // u32 space is far beyond any realistic number of distinct stacks
        let id = StackId(u32::try_from(self.stacks.len()).unwrap_or(u32::MAX));
        let owned: Box<[usize]> = ips.into();
        self.stack_ids.insert(owned.clone(), id);
        self.stacks.push(owned);
        id
    }

    pub(crate) fn record_alloc(&mut self, addr: usize, size: usize, ips: &[usize]) {
        let stack = self.intern(ips);
        if let Some(previous) = self.traces.insert(addr, RawTrace { size, stack }) {
            // Address reused without a matching free (freed while untracked)
            self.current = self.current.saturating_sub(previous.size);
        }
        self.current += size;
        self.peak = self.peak.max(self.current);
    }

    pub(crate) fn record_free(&mut self, addr: usize) {
        if let Some(trace) = self.traces.remove(&addr) {
            self.current = self.current.saturating_sub(trace.size);
        }
    }

    /// Forget every trace and stack, and reset the counters.
    pub(crate) fn clear(&mut self) {
        self.traces = HashMap::default();
        self.stack_ids = HashMap::default();
        self.stacks = Vec::new();
        self.current = 0;
        self.peak = 0;
    }

    pub(crate) fn reset_peak(&mut self) {
        self.peak = self.current;
    }

    pub(crate) fn traced_memory(&self) -> (usize, usize) {
        (self.current, self.peak)
    }

    pub(crate) fn len(&self) -> usize {
        self.traces.len()
    }

    /// Approximate heap bytes held by the table itself.
    pub(crate) fn memory_usage(&self) -> usize {
        let traces = self.traces.capacity() * (size_of::<usize>() + size_of::<RawTrace>());
        let ids = self.stack_ids.capacity() * (size_of::<Box<[usize]>>() + size_of::<StackId>());
        let stacks = self.stacks.capacity() * size_of::<Box<[usize]>>();
        // Each stack's frames are stored twice (map key and stack list)
        let frames: usize = self.stacks.iter().map(|s| 2 * s.len() * size_of::<usize>()).sum();
        traces + ids + stacks + frames
    }

    pub(crate) fn raw_snapshot(&self) -> RawSnapshot {
        RawSnapshot {
            traces: self.traces.values().copied().collect(),
            stacks: self.stacks.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_free_update_counters() {
        let mut table = TraceTable::new();
        table.record_alloc(0x1000, 128, &[1, 2, 3]);
        table.record_alloc(0x2000, 64, &[1, 2, 3]);
        assert_eq!(table.traced_memory(), (192, 192));

        table.record_free(0x2000);
        assert_eq!(table.traced_memory(), (128, 192));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_untracked_free_is_ignored() {
        let mut table = TraceTable::new();
        table.record_alloc(0x1000, 32, &[7]);
        table.record_free(0xdead);
        assert_eq!(table.traced_memory(), (32, 32));
    }

    #[test]
    fn test_identical_stacks_are_interned_once() {
        let mut table = TraceTable::new();
        table.record_alloc(0x1000, 8, &[1, 2]);
        table.record_alloc(0x2000, 8, &[1, 2]);
        table.record_alloc(0x3000, 8, &[1, 3]);

        let raw = table.raw_snapshot();
        assert_eq!(raw.stacks.len(), 2);
        assert_eq!(raw.traces.len(), 3);
    }

    #[test]
    fn test_reused_address_replaces_trace() {
        let mut table = TraceTable::new();
        table.record_alloc(0x1000, 100, &[1]);
        table.record_alloc(0x1000, 40, &[2]);
        assert_eq!(table.traced_memory().0, 40);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_reset_peak_and_clear() {
        let mut table = TraceTable::new();
        table.record_alloc(0x1000, 500, &[1]);
        table.record_free(0x1000);
        table.record_alloc(0x2000, 10, &[1]);
        assert_eq!(table.traced_memory(), (10, 500));

        table.reset_peak();
        assert_eq!(table.traced_memory(), (10, 10));

        table.clear();
        assert_eq!(table.traced_memory(), (0, 0));
        assert_eq!(table.len(), 0);
        assert_eq!(table.raw_snapshot().stacks.len(), 0);
    }

    #[test]
    fn test_memory_usage_grows_with_traces() {
        let mut table = TraceTable::new();
        let empty = table.memory_usage();
        for addr in 0..64 {
            table.record_alloc(addr * 16, 16, &[addr, addr + 1]);
        }
        assert!(table.memory_usage() > empty);
    }
}
