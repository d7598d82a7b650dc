//! Trace filters with shell-style filename patterns.

use crate::domain::{Frame, Traceback};

/// Include or exclude traces by filename pattern and optional line.
///
/// Patterns use `fnmatch` syntax: `*` matches any run of characters
/// (including `/`), `?` one character, `[seq]` / `[!seq]` a character set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub inclusive: bool,
    pub filename_pattern: String,
    pub lineno: Option<u32>,
    /// Match against every frame instead of only the most recent one
    pub all_frames: bool,
}

impl Filter {
    #[must_use]
    pub fn include(pattern: impl Into<String>) -> Self {
        Self { inclusive: true, filename_pattern: pattern.into(), lineno: None, all_frames: false }
    }

    #[must_use]
    pub fn exclude(pattern: impl Into<String>) -> Self {
        Self { inclusive: false, ..Self::include(pattern) }
    }

    #[must_use]
    pub fn with_lineno(mut self, lineno: u32) -> Self {
        self.lineno = Some(lineno);
        self
    }

    #[must_use]
    pub fn with_all_frames(mut self) -> Self {
        self.all_frames = true;
        self
    }

    fn frame_matches_pattern(&self, frame: &Frame) -> bool {
        fnmatch(&self.filename_pattern, &frame.filename)
            && self.lineno.is_none_or(|lineno| lineno == frame.lineno)
    }

    /// True when the trace passes this filter.
    ///
    /// An inclusive filter passes matching traces; an exclusive filter passes
    /// the rest.
    #[must_use]
    pub fn passes(&self, traceback: &Traceback) -> bool {
        let matched = if self.all_frames {
            traceback.frames().iter().any(|frame| self.frame_matches_pattern(frame))
        } else {
            self.frame_matches_pattern(traceback.most_recent())
        };
        matched == self.inclusive
    }
}

/// Apply a filter list to one traceback.
///
/// With inclusive filters present, at least one of them must pass. Every
/// exclusive filter must pass.
#[must_use]
pub fn keep_traceback(filters: &[Filter], traceback: &Traceback) -> bool {
    let mut has_include = false;
    let mut included = false;
    for filter in filters {
        if filter.inclusive {
            has_include = true;
            included |= filter.passes(traceback);
        } else if !filter.passes(traceback) {
            return false;
        }
    }
    !has_include || included
}

/// Shell-style wildcard match over the whole of `name`.
#[must_use]
pub fn fnmatch(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0, 0);
    // Last `*` seen and the name position it is currently absorbing up to
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    backtrack = Some((p, n));
                    p += 1;
                    continue;
                }
                '?' => {
                    p += 1;
                    n += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next)) = match_class(&pattern, p, name[n]) {
                        if matched {
                            p = next;
                            n += 1;
                            continue;
                        }
                    } else if name[n] == '[' {
                        // Unterminated class: literal '['
                        p += 1;
                        n += 1;
                        continue;
                    }
                }
                c if c == name[n] => {
                    p += 1;
                    n += 1;
                    continue;
                }
                _ => {}
            }
        }

        match backtrack {
            Some((star, absorbed)) => {
                p = star + 1;
                n = absorbed + 1;
                backtrack = Some((star, absorbed + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Match `c` against the class starting at `pattern[start] == '['`.
///
/// Returns `(matched, index after ']')`, or `None` if the class is unterminated.
fn match_class(pattern: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negated = matches!(pattern.get(i), Some('!'));
    if negated {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    loop {
        let &current = pattern.get(i)?;
        // A ']' right after the opening bracket is a literal member
        if current == ']' && !first {
            return Some((matched != negated, i + 1));
        }
        first = false;

        if pattern.get(i + 1) == Some(&'-') && pattern.get(i + 2).is_some_and(|&e| e != ']') {
            let end = pattern[i + 2];
            if current <= c && c <= end {
                matched = true;
            }
            i += 3;
        } else {
            if current == c {
                matched = true;
            }
            i += 1;
        }
    }
}
