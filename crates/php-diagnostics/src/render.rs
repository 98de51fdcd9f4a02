//! Diagnostic rendering for terminals.
//!
//! `TerminalRenderer` writes a colored severity header, the location and the
//! offending source line with an underline. It is generic over
//! `termcolor::WriteColor` so tests can render into a `NoColor<Vec<u8>>`.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use unicode_width::UnicodeWidthStr;

use crate::span::{LineColumn, ResolvedSpan, SourceSpan};
use crate::{Diagnostic, DiagnosticError, DiagnosticResult, Severity};

/// Configuration for the diagnostic renderer.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Whether to use colors.
    pub use_color: bool,
    /// Whether to print the source line under the header.
    pub show_source: bool,
    /// Maximum line width for source excerpts.
    pub max_width: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            use_color: true,
            show_source: true,
            max_width: 100,
        }
    }
}

/// A cache for source file contents.
///
/// Renderers use it to turn byte spans into lines and columns.
#[derive(Debug, Default)]
pub struct SourceCache {
    files: HashMap<String, String>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source file to the cache.
    pub fn add_source(&mut self, path: impl Into<String>, source: impl Into<String>) {
        self.files.insert(path.into(), source.into());
    }

    /// Reads a file from disk into the cache.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> DiagnosticResult<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DiagnosticError::SourceNotFound(path.display().to_string()));
        }
        let source = std::fs::read_to_string(path)?;
        self.add_source(path.to_string_lossy(), source);
        Ok(())
    }

    /// Gets the source for a file, if available.
    pub fn get_source(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(|s| s.as_str())
    }

    /// Resolves a span to include line/column information and source text.
    pub fn resolve_span(&self, span: &SourceSpan) -> Option<ResolvedSpan> {
        let path = span.file.to_string_lossy();
        let source = self.get_source(&path)?;

        let (start_line, start_col) = offset_to_line_col(source, span.start);
        let (end_line, end_col) = offset_to_line_col(source, span.end);

        let source_lines: Vec<String> = source
            .lines()
            .skip(start_line.saturating_sub(1))
            .take(end_line - start_line + 1)
            .map(String::from)
            .collect();

        Some(ResolvedSpan {
            span: span.clone(),
            start: LineColumn::new(start_line, start_col),
            end: LineColumn::new(end_line, end_col),
            source_lines,
        })
    }
}

/// Converts a byte offset to a 1-indexed line and character column.
pub fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let mut line = 1;
    let mut col = 1;
    let mut current_offset = 0;

    for ch in source.chars() {
        if current_offset >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
        current_offset += ch.len_utf8();
    }

    (line, col)
}

/// Display width of the first `chars` characters of `line`.
fn display_width(line: &str, chars: usize) -> usize {
    let end = line
        .char_indices()
        .nth(chars)
        .map(|(idx, _)| idx)
        .unwrap_or(line.len());
    UnicodeWidthStr::width(&line[..end])
}

/// Terminal renderer for diagnostics.
pub struct TerminalRenderer<W> {
    config: RenderConfig,
    writer: W,
}

impl TerminalRenderer<StandardStream> {
    /// Creates a renderer that writes to stderr.
    pub fn stderr(config: RenderConfig) -> Self {
        let choice = Self::color_choice(&config);
        Self {
            config,
            writer: StandardStream::stderr(choice),
        }
    }

    /// Creates a renderer that writes to stdout.
    pub fn stdout(config: RenderConfig) -> Self {
        let choice = Self::color_choice(&config);
        Self {
            config,
            writer: StandardStream::stdout(choice),
        }
    }

    fn color_choice(config: &RenderConfig) -> ColorChoice {
        if config.use_color {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        }
    }
}

impl<W: WriteColor> TerminalRenderer<W> {
    pub fn with_writer(config: RenderConfig, writer: W) -> Self {
        Self { config, writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn severity_color(severity: Severity) -> Color {
        match severity {
            Severity::Notice => Color::Cyan,
            Severity::Warning => Color::Yellow,
            Severity::Fatal => Color::Red,
        }
    }

    /// Writes colored text.
    fn write_colored(&mut self, text: &str, color: Color, bold: bool) -> io::Result<()> {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(color)).set_bold(bold);
        self.writer.set_color(&spec)?;
        write!(self.writer, "{}", text)?;
        self.writer.reset()
    }

    /// Writes the header, e.g. `Warning[W1004]: Illegal offset type`.
    fn write_header(&mut self, diagnostic: &Diagnostic) -> io::Result<()> {
        let color = Self::severity_color(diagnostic.severity);
        self.write_colored(diagnostic.severity.prefix(), color, true)?;
        if let Some(code) = &diagnostic.code {
            self.write_colored(&format!("[{}]", code), color, true)?;
        }
        self.write_colored(": ", color, true)?;
        writeln!(self.writer, "{}", diagnostic.message)
    }

    fn write_excerpt(&mut self, resolved: &ResolvedSpan, severity: Severity) -> io::Result<()> {
        let gutter = resolved.start.line.to_string().len().max(2);
        writeln!(
            self.writer,
            "{:>width$}--> {}:{}:{}",
            "",
            resolved.span.file.display(),
            resolved.start.line,
            resolved.start.column,
            width = gutter - 1
        )?;

        let Some(line) = resolved.source_lines.first() else {
            return Ok(());
        };
        let limit = self.config.max_width.saturating_sub(gutter + 3);
        let shown: String = if line.chars().count() > limit {
            line.chars().take(limit.saturating_sub(3)).chain("...".chars()).collect()
        } else {
            line.clone()
        };

        writeln!(self.writer, "{:>width$} |", "", width = gutter)?;
        self.write_colored(&format!("{:>width$}", resolved.start.line, width = gutter), Color::Blue, false)?;
        writeln!(self.writer, " | {}", shown)?;

        let start_col = resolved.start.column.saturating_sub(1);
        let pad = display_width(line, start_col);
        let end_col = if resolved.is_multiline() {
            line.chars().count()
        } else {
            resolved.end.column.saturating_sub(1)
        };
        let len = if resolved.span.is_point() {
            1
        } else {
            display_width(line, end_col).saturating_sub(pad).max(1)
        };
        let underline: String = std::iter::repeat(severity.underline_char()).take(len).collect();

        write!(self.writer, "{:>width$} | {:pad$}", "", "", width = gutter, pad = pad)?;
        self.write_colored(&underline, Self::severity_color(severity), false)?;
        writeln!(self.writer)
    }

    /// Renders a single diagnostic.
    pub fn render(&mut self, diagnostic: &Diagnostic, sources: &SourceCache) -> io::Result<()> {
        self.write_header(diagnostic)?;
        if self.config.show_source {
            if let Some(resolved) = diagnostic.span.as_ref().and_then(|s| sources.resolve_span(s)) {
                self.write_excerpt(&resolved, diagnostic.severity)?;
            }
        }
        Ok(())
    }

    /// Renders several diagnostics followed by a summary line.
    pub fn render_all<'a>(
        &mut self,
        diagnostics: impl IntoIterator<Item = &'a Diagnostic>,
        sources: &SourceCache,
    ) -> io::Result<()> {
        let mut counts = [0usize; 3];
        for diagnostic in diagnostics {
            self.render(diagnostic, sources)?;
            counts[diagnostic.severity as usize] += 1;
        }
        self.render_summary(counts[0], counts[1], counts[2])
    }

    fn render_summary(&mut self, notices: usize, warnings: usize, fatals: usize) -> io::Result<()> {
        if notices + warnings + fatals == 0 {
            return Ok(());
        }
        let plural = |n: usize, word: &str| {
            if n == 1 {
                format!("1 {}", word)
            } else {
                format!("{} {}s", n, word)
            }
        };
        let mut parts = Vec::new();
        if fatals > 0 {
            parts.push(plural(fatals, "fatal error"));
        }
        if warnings > 0 {
            parts.push(plural(warnings, "warning"));
        }
        if notices > 0 {
            parts.push(plural(notices, "notice"));
        }
        let worst = if fatals > 0 {
            Severity::Fatal
        } else if warnings > 0 {
            Severity::Warning
        } else {
            Severity::Notice
        };
        self.write_colored("summary", Self::severity_color(worst), true)?;
        writeln!(self.writer, ": {}", parts.join(", "))
    }
}
