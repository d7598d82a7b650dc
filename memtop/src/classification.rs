//! Which frames of an allocation stack belong to the program.
//!
//! A captured stack starts inside the allocator: the tracer hooks, the
//! `__rust_alloc` shims, then `alloc::raw_vec` and friends. Allocations are
//! attributed to the first frame written by the user. Std and every
//! dependency are linked into the same executable, so the load range alone
//! cannot separate them.
//!
//! Decision order:
//!
//! 1. Tracer functions and allocator shims, by name
//! 2. Unresolved frames (`<unknown>`, raw addresses)
//! 3. The DWARF source path when there is one:
//!    - `~/.cargo/registry`, `~/.cargo/git` → dependency
//!    - `~/.rustup/toolchains`, `/rustc/<hash>` → standard library
//!    - anything else → user code
//! 4. Otherwise the demangled path prefix (`std::`, `serde::`, ...)
//! 5. Otherwise whether the address lies in the executable

use log::warn;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

/// Where a frame's code comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameOrigin {
    /// memtop's own allocation hooks
    Tracer,
    UserCode,
    /// std, core, alloc and the compiler's allocator shims
    StdLib,
    /// Crates pulled from a registry or git, and system libraries
    ThirdParty,
    #[default]
    Unknown,
}

impl FrameOrigin {
    #[must_use]
    pub fn is_user_code(&self) -> bool {
        *self == FrameOrigin::UserCode
    }
}

/// Demangled names containing one of these are the tracer itself.
///
/// Trait impls demangle as `<memtop::tracer::.. as ..>`, hence `contains`.
const TRACER_MARKERS: &[&str] = &["memtop::tracer::"];

/// Allocator entry points emitted by rustc (`__rust_alloc`, `__rdl_alloc`, ...)
const ALLOCATOR_SHIM_PREFIXES: &[&str] = &["__rust_", "__rdl_", "__rg_"];

/// Namespace newer compilers put the allocator shims in (`__rustc::__rust_alloc`)
const SHIM_NAMESPACE: &str = "__rustc::";

const STD_PATH_MARKERS: &[&str] =
    &[".rustup/toolchains/", ".rustup\\toolchains\\", "/rustc/", "\\rustc\\"];

const DEPENDENCY_PATH_MARKERS: &[&str] =
    &[".cargo/registry/", ".cargo\\registry\\", ".cargo/git/checkouts/"];

const SYSTEM_PATH_PREFIXES: &[&str] = &["/usr/", "/lib/"];

const STD_NAME_PREFIXES: &[&str] =
    &["std::", "core::", "alloc::", "<std::", "<core::", "<alloc::", "_Unwind_"];

const DEPENDENCY_NAME_PREFIXES: &[&str] = &[
    "backtrace::",
    "<backtrace::",
    "serde::",
    "serde_json::",
    "log::",
    "env_logger::",
    "clap::",
    "clap_builder::",
    "addr2line::",
    "gimli::",
    "object::",
    "hashbrown::",
    "<hashbrown::",
];

/// Classify one (possibly inlined) frame.
///
/// `file` is the DWARF source path, `in_executable` whether the address
/// falls inside the main executable's load range.
///
/// ```ignore
/// classify_frame("myapp::load", Some("src/load.rs"), true);       // UserCode
/// classify_frame("__rust_alloc", None, true);                     // StdLib
/// classify_frame("0x7f3c2a10", None, false);                      // Unknown
/// ```
#[must_use]
pub fn classify_frame(function: &str, file: Option<&str>, in_executable: bool) -> FrameOrigin {
    if TRACER_MARKERS.iter().any(|marker| function.contains(marker)) {
        return FrameOrigin::Tracer;
    }
    // Shims carry the `#[global_allocator]` static as their location
    if is_allocator_shim(function) {
        return FrameOrigin::StdLib;
    }
    if function == "<unknown>" || function.starts_with("0x") {
        return FrameOrigin::Unknown;
    }

    coverage().record(function, file.is_some());

    if let Some(path) = file {
        return origin_from_path(path);
    }
    if starts_with_any(function, STD_NAME_PREFIXES) {
        return FrameOrigin::StdLib;
    }
    if starts_with_any(function, DEPENDENCY_NAME_PREFIXES) {
        return FrameOrigin::ThirdParty;
    }
    if in_executable {
        FrameOrigin::UserCode
    } else {
        FrameOrigin::Unknown
    }
}

fn origin_from_path(path: &str) -> FrameOrigin {
    if DEPENDENCY_PATH_MARKERS.iter().any(|m| path.contains(m)) {
        FrameOrigin::ThirdParty
    } else if STD_PATH_MARKERS.iter().any(|m| path.contains(m)) {
        FrameOrigin::StdLib
    } else if starts_with_any(path, SYSTEM_PATH_PREFIXES) {
        FrameOrigin::ThirdParty
    } else {
        // src/main.rs, /home/user/app/src/main.rs, ...
        FrameOrigin::UserCode
    }
}

fn is_allocator_shim(function: &str) -> bool {
    let name = function.strip_prefix(SHIM_NAMESPACE).unwrap_or(function);
    starts_with_any(name, ALLOCATOR_SHIM_PREFIXES)
}

fn starts_with_any(s: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| s.starts_with(p))
}

/// How many classified frames carried a source path.
///
/// Without DWARF, classification falls back to name prefixes and line
/// attribution is lost; each such function is logged once.
#[derive(Default)]
pub struct DebugInfoCoverage {
    with_path: AtomicU64,
    without_path: AtomicU64,
    reported: Mutex<HashSet<String>>,
}

impl DebugInfoCoverage {
    pub fn record(&self, function: &str, has_path: bool) {
        if has_path {
            self.with_path.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.without_path.fetch_add(1, Ordering::Relaxed);

        let mut reported = self.reported.lock().unwrap_or_else(PoisonError::into_inner);
        if reported.insert(function.to_owned()) {
            warn!("No source location for '{function}', classifying by name");
        }
    }

    /// Percentage of frames with a source path; 100 before any frame is seen.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn percent(&self) -> f64 {
        let with = self.with_path.load(Ordering::Relaxed);
        let total = with + self.without_path.load(Ordering::Relaxed);
        if total == 0 {
            100.0
        } else {
            with as f64 * 100.0 / total as f64
        }
    }

    #[must_use]
    pub fn is_low(&self) -> bool {
        self.percent() < 50.0
    }
}

static COVERAGE: OnceLock<DebugInfoCoverage> = OnceLock::new();

/// Process-wide coverage counters fed by [`classify_frame`].
pub fn coverage() -> &'static DebugInfoCoverage {
    COVERAGE.get_or_init(DebugInfoCoverage::default)
}
