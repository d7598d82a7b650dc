//! `GlobalAlloc` wrapper that feeds the trace table.

use std::alloc::{GlobalAlloc, Layout, System};

use super::{on_alloc, on_free};

/// Allocator wrapper that records every block while tracing is on.
///
/// Install it once per binary:
///
/// ```rust,ignore
/// use memtop::tracer::TracingAllocator;
/// use std::alloc::System;
///
/// #[global_allocator]
/// static GLOBAL: TracingAllocator<System> = TracingAllocator::new(System);
/// ```
///
/// While tracing is off each hook costs one relaxed atomic load.
pub struct TracingAllocator<A = System> {
    inner: A,
}

impl<A> TracingAllocator<A> {
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }
}

// SAFETY: every call is forwarded to `inner` with the caller's arguments
// unchanged. The hooks only observe the resulting pointers.
#[allow(unsafe_code)]
unsafe impl<A: GlobalAlloc> GlobalAlloc for TracingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            on_alloc(ptr as usize, layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            on_alloc(ptr as usize, layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        on_free(ptr as usize);
        self.inner.dealloc(ptr, layout);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            on_free(ptr as usize);
            on_alloc(new_ptr as usize, new_size);
        }
        new_ptr
    }
}
