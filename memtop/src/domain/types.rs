//! Domain types providing compile-time safety and self-documentation
//!
//! These types are shared by the tracer (raw stacks), the snapshot
//! (resolved frames) and the report layer (display formats).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Filename used for frames that could not be resolved to a source location.
pub const UNKNOWN_FILENAME: &str = "<unknown>";

/// Interned raw call stack ID
///
/// Index into the tracer's stack table. Many traces share one stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackId(pub u32);

/// A single source location: file path and line number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Frame {
    pub filename: String,
    pub lineno: u32,
}

impl Frame {
    pub fn new(filename: impl Into<String>, lineno: u32) -> Self {
        Self { filename: filename.into(), lineno }
    }

    /// Frame used when no user code could be found on the stack.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_FILENAME, 0)
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.filename == UNKNOWN_FILENAME
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename, self.lineno)
    }
}

/// Sequence of frames, most recent call first.
///
/// Equality, hashing and ordering only look at the frames; `total_nframe`
/// is informational and records the depth before truncation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "TracebackRepr")]
pub struct Traceback {
    frames: Vec<Frame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total_nframe: Option<usize>,
}

/// Wire form; deserialization goes through [`Traceback::new`] so a stored
/// empty frame list still yields a traceback with one frame.
#[derive(Deserialize)]
struct TracebackRepr {
    frames: Vec<Frame>,
    #[serde(default)]
    total_nframe: Option<usize>,
}

impl From<TracebackRepr> for Traceback {
    fn from(repr: TracebackRepr) -> Self {
        Traceback::new(repr.frames, repr.total_nframe)
    }
}

impl Traceback {
    /// Build a traceback. An empty frame list becomes a single unknown frame.
    #[must_use]
    pub fn new(frames: Vec<Frame>, total_nframe: Option<usize>) -> Self {
        let frames = if frames.is_empty() { vec![Frame::unknown()] } else { frames };
        Self { frames, total_nframe }
    }

    /// Traceback holding exactly one frame.
    #[must_use]
    pub fn single(frame: Frame) -> Self {
        Self { frames: vec![frame], total_nframe: None }
    }

    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Most recent frame. A traceback always has at least one.
    #[must_use]
    pub fn most_recent(&self) -> &Frame {
        &self.frames[0]
    }

    #[must_use]
    pub fn total_nframe(&self) -> Option<usize> {
        self.total_nframe
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Render the traceback as `File "..", line N` lines.
    ///
    /// A negative `limit` keeps the oldest frames, a positive one the most
    /// recent. Source lines are appended when the file is readable.
    #[must_use]
    pub fn format(&self, limit: Option<isize>, most_recent_first: bool) -> Vec<String> {
        // Stored most-recent-first; default rendering is oldest-first.
        let mut frames: Vec<&Frame> = self.frames.iter().rev().collect();
        if let Some(limit) = limit {
            let limit_abs = limit.unsigned_abs().min(frames.len());
            if limit > 0 {
                frames = frames.split_off(frames.len() - limit_abs);
            } else {
                frames.truncate(limit_abs);
            }
        }
        if most_recent_first {
            frames.reverse();
        }

        let mut lines = Vec::with_capacity(frames.len() * 2);
        for frame in frames {
            lines.push(format!("  File \"{}\", line {}", frame.filename, frame.lineno));
            if let Some(source) = source_line(&frame.filename, frame.lineno) {
                lines.push(format!("    {source}"));
            }
        }
        lines
    }
}

fn source_line(filename: &str, lineno: u32) -> Option<String> {
    if lineno == 0 {
        return None;
    }
    let content = std::fs::read_to_string(filename).ok()?;
    let line = content.lines().nth(lineno as usize - 1)?.trim();
    (!line.is_empty()).then(|| line.to_string())
}

impl PartialEq for Traceback {
    fn eq(&self, other: &Self) -> bool {
        self.frames == other.frames
    }
}

impl Eq for Traceback {}

impl Hash for Traceback {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.frames.hash(state);
    }
}

impl PartialOrd for Traceback {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Traceback {
    fn cmp(&self, other: &Self) -> Ordering {
        self.frames.cmp(&other.frames)
    }
}

impl fmt::Display for Traceback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.most_recent())
    }
}

/// How traces are grouped into statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum KeyType {
    /// Group by file name
    Filename,
    /// Group by file name and line number
    #[default]
    Lineno,
    /// Group by the whole traceback
    Traceback,
}
