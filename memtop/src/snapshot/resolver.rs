//! Raw stack resolution
//!
//! Turns the tracer's raw return addresses into [`Traceback`]s:
//! adjust each address, symbolize it, skip the allocator frames, then keep
//! the first `limit` frames starting at the first user frame.

use log::{debug, warn};
use std::sync::Arc;

use super::{Snapshot, Trace};
use crate::classification::{classify_frame, coverage};
use crate::domain::{Frame, TracerError, Traceback, UNKNOWN_FILENAME};
use crate::symbolization::{self_memory_range, MemoryRange, Symbolizer};
use crate::tracer::table::RawSnapshot;

/// Resolves raw call stacks captured by the tracer into tracebacks.
///
/// Holds the symbolizer (and its cache) for the current executable.
pub struct FrameResolver {
    symbolizer: Option<Symbolizer>,
    memory_range: Option<MemoryRange>,
}

impl FrameResolver {
    pub fn new(symbolizer: Symbolizer, memory_range: Option<MemoryRange>) -> Self {
        Self { symbolizer: Some(symbolizer), memory_range }
    }

    /// Resolver without debug info; every stack resolves to `<unknown>:0`.
    #[must_use]
    pub fn unsymbolized() -> Self {
        Self { symbolizer: None, memory_range: None }
    }

    /// Load DWARF for the running executable and find its load range.
    ///
    /// # Errors
    /// Returns an error if the executable path is unavailable or its debug
    /// info cannot be parsed.
    pub fn for_current_exe() -> Result<Self, TracerError> {
        let exe = std::env::current_exe()?;
        let symbolizer = Symbolizer::new(&exe)
            .map_err(|e| TracerError::SymbolizationFailed(format!("{}: {e:#}", exe.display())))?;

        let memory_range = match self_memory_range(&exe) {
            Ok(range) => Some(range),
            Err(e) => {
                warn!("Failed to get memory range: {e}. Symbol resolution may not work.");
                None
            }
        };

        Ok(Self::new(symbolizer, memory_range))
    }

    /// Adjust an address for PIE executables
    ///
    /// Returns (`adjusted_address`, `is_in_executable`)
    fn adjust_address(&self, addr: u64) -> (u64, bool) {
        let pie = self.symbolizer.as_ref().is_some_and(Symbolizer::is_position_independent);
        match self.memory_range {
            Some(range) if range.contains(addr) => {
                let adjusted = if pie { addr - range.start } else { addr };
                (adjusted, true)
            }
            Some(_) => (addr, false),
            None => (addr, true),
        }
    }

    /// Resolve one raw stack (innermost return address first).
    #[must_use]
    pub fn resolve_stack(&self, ips: &[usize], limit: usize) -> Traceback {
        let mut frames = Vec::new();
        let mut in_user_code = false;

        for &ip in ips {
            // Return address points past the call; step back into it
            let (addr, in_executable) = self.adjust_address((ip as u64).saturating_sub(1));

            let Some(symbolizer) = self.symbolizer.as_ref().filter(|_| in_executable) else {
                // Shared library or no debug info: never user code
                if in_user_code {
                    frames.push(Frame::unknown());
                }
                continue;
            };

            for inlined in symbolizer.resolve(addr).frames {
                let file = inlined.location.as_ref().and_then(|loc| loc.file.as_deref());
                if !in_user_code {
                    let origin = classify_frame(&inlined.function, file, in_executable);
                    if !origin.is_user_code() {
                        continue;
                    }
                    in_user_code = true;
                }
                let lineno = inlined.location.as_ref().and_then(|loc| loc.line).unwrap_or(0);
                frames.push(Frame::new(file.unwrap_or(UNKNOWN_FILENAME), lineno));
            }
        }

        let total = frames.len();
        frames.truncate(limit);
        Traceback::new(frames, Some(total))
    }

    /// Resolve a raw table copy into a snapshot.
    pub(crate) fn resolve(&self, raw: &RawSnapshot, limit: usize) -> Snapshot {
        let tracebacks: Vec<Arc<Traceback>> =
            raw.stacks.iter().map(|ips| Arc::new(self.resolve_stack(ips, limit))).collect();

        let traces = raw
            .traces
            .iter()
            .map(|trace| Trace {
                size: trace.size,
                traceback: Arc::clone(&tracebacks[trace.stack.0 as usize]),
            })
            .collect();

        let unknown = tracebacks.iter().filter(|tb| tb.most_recent().is_unknown()).count();
        debug!("Resolved {} stacks, {unknown} without user frames", tracebacks.len());
        if coverage().is_low() {
            warn!("Less than half of the frames had debug info; build with debug = true");
        }

        Snapshot::new(traces, limit)
    }
}
