//! # Symbol Resolution and Address Translation
//!
//! Converts raw return addresses captured by the tracer into function names,
//! file paths and line numbers using the DWARF debug information of the
//! running executable.
//!
//! ## Address Translation Flow
//!
//! ```text
//! 1. Tracer captures raw return addresses
//!    [0x55f3a2b4c780, 0x55f3a2b4d120, ...]
//!
//! 2. Step back into the call instruction
//!    0x55f3a2b4c780 - 1
//!
//! 3. Read /proc/self/maps to find the executable's load range
//!    0x55f3a2b4c000 - 0x55f3a2b5f000
//!
//! 4. Rebase for PIE executables
//!    0x55f3a2b4c77f - 0x55f3a2b4c000 = 0x77f
//!
//! 5. Look up the DWARF line table (inlined frames innermost first)
//!    0x77f → memtop::sample::allocate_lists at src/sample.rs:14
//! ```
//!
//! Addresses outside the executable (libc, the dynamic loader) are not
//! symbolized.
//!
//! **Libraries used**:
//! - `gimli`: Low-level DWARF parser
//! - `addr2line`: High-level symbolization library built on gimli
//! - `object`: ELF binary parser (also provides the symbol-table fallback)
//! - `rustc-demangle`: Rust symbol demangling
//!
//! ## Limitations
//!
//! - Line attribution requires `debug = true` (on by default in dev builds)
//! - Without DWARF only function names from the symbol table are available,
//!   and every frame reports `<unknown>:0`

pub mod memory_maps;
pub mod symbolizer;

pub use memory_maps::{parse_memory_maps, self_memory_range, MemoryRange};
pub use symbolizer::Symbolizer;
