//! DWARF-backed address lookup for a single executable.

use addr2line::Context;
use anyhow::{Context as _, Result};
use gimli::{EndianRcSlice, RunTimeEndian, SectionId};
use object::{Object, ObjectKind, ObjectSection, ObjectSymbol, SectionKind, SymbolKind};
use rustc_demangle::demangle;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

type Reader = EndianRcSlice<RunTimeEndian>;

const UNKNOWN_FUNCTION: &str = "<unknown>";

/// Entry of the ELF symbol table.
struct FunctionSymbol {
    start: u64,
    size: u64,
    name: String,
}

/// Maps file-relative addresses to functions and source lines.
///
/// Lookups are cached: the stacks in one snapshot share most of their
/// return addresses.
pub struct Symbolizer {
    dwarf: Context<Reader>,
    /// `[start, end)` of the executable sections
    code: Vec<(u64, u64)>,
    /// Sorted by start address; used when DWARF has no function name
    functions: Vec<FunctionSymbol>,
    pie: bool,
    resolved: RefCell<HashMap<u64, ResolvedFrame>>,
}

impl Symbolizer {
    /// Load the debug info and symbol table of `binary_path`.
    ///
    /// A binary without DWARF still loads; its lookups carry function names
    /// only.
    ///
    /// # Errors
    /// Fails if the file cannot be read, is not an object file, or has
    /// malformed DWARF.
    pub fn new<P: AsRef<Path>>(binary_path: P) -> Result<Self> {
        let path = binary_path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;
        let file = object::File::parse(&*bytes)
            .with_context(|| format!("{} is not an object file", path.display()))?;

        Ok(Self {
            dwarf: load_dwarf(&file)?,
            code: code_ranges(&file),
            functions: function_symbols(&file),
            pie: file.kind() == ObjectKind::Dynamic,
            resolved: RefCell::default(),
        })
    }

    /// True for PIE executables, whose runtime addresses must be rebased.
    #[must_use]
    pub fn is_position_independent(&self) -> bool {
        self.pie
    }

    /// Frames at `addr`, innermost inlined frame first.
    ///
    /// Never empty: an address with no debug info yields one frame with the
    /// symbol-table name (or `<unknown>`) and no location. Addresses outside
    /// the executable sections always resolve to `<unknown>`.
    pub fn resolve(&self, addr: u64) -> ResolvedFrame {
        if let Some(hit) = self.resolved.borrow().get(&addr) {
            return hit.clone();
        }

        // Discarded functions keep DWARF ranges rebased to 0; only real code is looked up
        let in_code = self.is_code(addr);
        let mut frames = if in_code { self.dwarf_frames(addr) } else { Vec::new() };
        if frames.is_empty() {
            let name = if in_code { self.symbol_name(addr) } else { None };
            let function = name.unwrap_or(UNKNOWN_FUNCTION).to_owned();
            frames.push(InlinedFrame { function, location: None });
        }

        let resolved = ResolvedFrame { addr, frames };
        self.resolved.borrow_mut().insert(addr, resolved.clone());
        resolved
    }

    fn dwarf_frames(&self, addr: u64) -> Vec<InlinedFrame> {
        let mut frames = Vec::new();
        let Ok(mut iter) = self.dwarf.find_frames(addr).skip_all_loads() else {
            return frames;
        };

        while let Ok(Some(frame)) = iter.next() {
            let function = frame
                .function
                .as_ref()
                .and_then(|name| name.demangle().ok())
                .map(|name| name.into_owned())
                .or_else(|| self.symbol_name(addr).map(str::to_owned))
                .unwrap_or_else(|| UNKNOWN_FUNCTION.to_owned());
            let location = frame.location.map(|loc| SourceLocation {
                file: loc.file.map(str::to_owned),
                line: loc.line,
                column: loc.column,
            });
            frames.push(InlinedFrame { function, location });
        }
        frames
    }

    fn is_code(&self, addr: u64) -> bool {
        self.code.iter().any(|&(start, end)| (start..end).contains(&addr))
    }

    fn symbol_name(&self, addr: u64) -> Option<&str> {
        let idx = self.functions.partition_point(|f| f.start <= addr).checked_sub(1)?;
        let symbol = &self.functions[idx];
        (symbol.size == 0 || addr - symbol.start < symbol.size).then_some(symbol.name.as_str())
    }

    /// Number of addresses resolved so far.
    #[must_use]
    pub fn cached_addresses(&self) -> usize {
        self.resolved.borrow().len()
    }

    /// Demangle a Rust symbol, dropping the trailing hash.
    #[must_use]
    pub fn demangle_symbol(symbol: &str) -> String {
        format!("{:#}", demangle(symbol))
    }
}

fn load_dwarf(file: &object::File<'_>) -> Result<Context<Reader>> {
    let endian = if file.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

    // Missing sections load as empty
    let section = |id: SectionId| -> Result<Reader, gimli::Error> {
        let data = file
            .section_by_name(id.name())
            .and_then(|section| section.uncompressed_data().ok())
            .unwrap_or_default();
        Ok(EndianRcSlice::new(Rc::from(&*data), endian))
    };

    let dwarf = gimli::Dwarf::load(section)?;
    Context::from_dwarf(dwarf).context("Malformed DWARF debug information")
}

fn code_ranges(file: &object::File<'_>) -> Vec<(u64, u64)> {
    file.sections()
        .filter(|section| section.kind() == SectionKind::Text && section.size() > 0)
        .map(|section| (section.address(), section.address() + section.size()))
        .collect()
}

fn function_symbols(file: &object::File<'_>) -> Vec<FunctionSymbol> {
    let mut functions: Vec<FunctionSymbol> = file
        .symbols()
        .filter(|sym| sym.kind() == SymbolKind::Text && sym.address() != 0)
        .filter_map(|sym| {
            Some(FunctionSymbol {
                start: sym.address(),
                size: sym.size(),
                name: Symbolizer::demangle_symbol(sym.name().ok()?),
            })
        })
        .collect();
    functions.sort_unstable_by_key(|f| f.start);
    functions
}

/// Everything known about one address.
#[derive(Debug, Clone)]
pub struct ResolvedFrame {
    pub addr: u64,
    /// Innermost inlined frame first
    pub frames: Vec<InlinedFrame>,
}

#[derive(Debug, Clone)]
pub struct InlinedFrame {
    pub function: String,
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}
