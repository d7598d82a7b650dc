//! Load ranges from `/proc/<pid>/maps`
//!
//! For a position-independent executable the lowest mapping is the load bias
//! that must be subtracted from runtime addresses before a DWARF lookup.

use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::Path;

/// Address range `[start, end)` a binary occupies in a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        (self.start..self.end).contains(&addr)
    }
}

/// Find the memory range of `binary_path` in the maps text of a process.
///
/// All mappings whose pathname equals `binary_path` are merged into one
/// range from the lowest start to the highest end.
///
/// # Errors
/// Returns an error if an address field is malformed or no mapping matches.
pub fn parse_maps_text(maps: &str, binary_path: &str) -> Result<MemoryRange> {
    let mut range: Option<MemoryRange> = None;

    // "start-end perms offset dev inode pathname"
    for line in maps.lines() {
        let mut fields = line.split_whitespace();
        let Some(addresses) = fields.next() else {
            continue;
        };
        let pathname: Vec<&str> = fields.skip(4).collect();
        if pathname.is_empty() || pathname.join(" ") != binary_path {
            continue;
        }
        let Some((start, end)) = addresses.split_once('-') else {
            continue;
        };
        let start = u64::from_str_radix(start, 16).context("Failed to parse range start")?;
        let end = u64::from_str_radix(end, 16).context("Failed to parse range end")?;

        range = Some(match range {
            Some(r) => MemoryRange { start: r.start.min(start), end: r.end.max(end) },
            None => MemoryRange { start, end },
        });
    }

    range.with_context(|| format!("Could not find memory range for {binary_path}"))
}

/// Load range of `binary_path` in process `pid`.
///
/// # Errors
/// Fails if the maps file is unreadable or has no mapping of the binary.
pub fn parse_memory_maps(pid: u32, binary_path: &str) -> Result<MemoryRange> {
    let maps_path = format!("/proc/{pid}/maps");
    let maps = fs::read_to_string(&maps_path).with_context(|| format!("Failed to read {maps_path}"))?;

    let range = parse_maps_text(&maps, binary_path)?;
    info!(
        "Executable memory range: 0x{:x} - 0x{:x} (size: {} KB)",
        range.start,
        range.end,
        (range.end - range.start) / 1024
    );
    Ok(range)
}

/// Memory range of `exe` inside the current process.
///
/// # Errors
/// Returns an error if the path is not UTF-8 or the maps lookup fails.
pub fn self_memory_range(exe: &Path) -> Result<MemoryRange> {
    let exe = exe.to_str().context("Executable path is not valid UTF-8")?;
    parse_memory_maps(std::process::id(), exe)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &str = "\
55d0c0a00000-55d0c0a4e000 r--p 00000000 103:02 1234 /usr/local/bin/memtop
55d0c0a4e000-55d0c0b9f000 r-xp 0004e000 103:02 1234 /usr/local/bin/memtop
55d0c0b9f000-55d0c0bf0000 r--p 0019f000 103:02 1234 /usr/local/bin/memtop
55d0c1d3e000-55d0c1d5f000 rw-p 00000000 00:00 0 [heap]
7f2a4c000000-7f2a4c021000 rw-p 00000000 00:00 0
7f2a4e600000-7f2a4e628000 r--p 00000000 103:02 5678 /usr/lib/x86_64-linux-gnu/libc.so.6
";

    #[test]
    fn test_memory_range_contains() {
        let range = MemoryRange { start: 0x1000, end: 0x2000 };

        assert!(range.contains(0x1000));
        assert!(range.contains(0x1500));
        assert!(range.contains(0x1FFF));
        assert!(!range.contains(0x0FFF));
        assert!(!range.contains(0x2000));
        assert!(!range.contains(0x2001));
    }

    #[test]
    fn test_parse_maps_text_merges_mappings() {
        let range = parse_maps_text(MAPS, "/usr/local/bin/memtop").unwrap();
        assert_eq!(range, MemoryRange { start: 0x55d0_c0a0_0000, end: 0x55d0_c0bf_0000 });
    }

    #[test]
    fn test_parse_maps_text_requires_exact_path() {
        assert!(parse_maps_text(MAPS, "/usr/local/bin/mem").is_err());
        assert!(parse_maps_text(MAPS, "[heap]").is_ok());
    }

    #[test]
    fn test_self_memory_range() {
        let exe = std::env::current_exe().expect("Failed to get current exe");
        let range = self_memory_range(&exe).expect("test binary should be mapped");
        let here = test_self_memory_range as usize as u64;
        assert!(range.contains(here));
    }
}
