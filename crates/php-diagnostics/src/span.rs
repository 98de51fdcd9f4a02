//! Locations that diagnostics point at.

use std::path::PathBuf;

/// Byte range of a script file. Line and column are worked out later by a
/// [`SourceCache`](crate::render::SourceCache), which holds the text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    pub file: PathBuf,
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub fn new(file: impl Into<PathBuf>, start: usize, end: usize) -> Self {
        Self {
            file: file.into(),
            start,
            end,
        }
    }

    /// Zero-width spans come from synthesized nodes; they still name a line.
    pub fn is_point(&self) -> bool {
        self.end <= self.start
    }
}

/// 1-based line, and column counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineColumn {
    pub line: usize,
    pub column: usize,
}

impl LineColumn {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A span resolved against its file's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSpan {
    pub span: SourceSpan,
    pub start: LineColumn,
    pub end: LineColumn,
    pub source_lines: Vec<String>,
}

impl ResolvedSpan {
    pub fn is_multiline(&self) -> bool {
        self.start.line != self.end.line
    }
}
