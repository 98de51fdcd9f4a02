//! PHP Diagnostics - the non-fatal message channel of the evaluator.
//!
//! This crate provides:
//!
//! - `Diagnostic` - a code, severity, message and optional source span
//! - `Severity` - Notice, Warning and Fatal levels, printed the way PHP prints them
//! - `DiagnosticLog` - the append-only log notices and warnings go to
//! - `codes` - registry of the codes the evaluator emits
//! - Terminal rendering with color support
//!
//! # Example
//!
//! ```rust
//! use php_diagnostics::{codes, Diagnostic, DiagnosticLog, Severity};
//! use php_diagnostics::render::SourceCache;
//! use php_diagnostics::span::SourceSpan;
//!
//! let mut sources = SourceCache::new();
//! sources.add_source("index.php", "<?php\necho $a;");
//!
//! let mut log = DiagnosticLog::new();
//! log.push(
//!     Diagnostic::notice(codes::UNDEFINED_VARIABLE, "Undefined variable: a")
//!         .with_span(SourceSpan::new("index.php", 11, 13)),
//! );
//!
//! assert_eq!(log.count(Severity::Notice), 1);
//! assert_eq!(
//!     log.render_plain(&sources),
//!     "Notice: Undefined variable: a in index.php on line 2"
//! );
//! ```

pub mod codes;
pub mod render;
pub mod span;

use render::SourceCache;
use span::SourceSpan;
use thiserror::Error;

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// Something that may be a mistake; evaluation continues.
    Notice,
    /// Something that is very likely a mistake; evaluation continues.
    Warning,
    /// The run was aborted.
    Fatal,
}

impl Severity {
    /// Returns the text prefix PHP uses for this severity level.
    pub fn prefix(&self) -> &'static str {
        match self {
            Severity::Notice => "Notice",
            Severity::Warning => "Warning",
            Severity::Fatal => "Fatal error",
        }
    }

    /// The leading letter of codes with this severity.
    pub fn letter(&self) -> char {
        match self {
            Severity::Notice => 'N',
            Severity::Warning => 'W',
            Severity::Fatal => 'F',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'N' => Some(Severity::Notice),
            'W' => Some(Severity::Warning),
            'F' => Some(Severity::Fatal),
            _ => None,
        }
    }

    /// Returns the underline character for this severity level.
    pub fn underline_char(&self) -> char {
        match self {
            Severity::Notice => '-',
            Severity::Warning => '~',
            Severity::Fatal => '^',
        }
    }
}

/// A single notice, warning or fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// The diagnostic code (e.g., "N0001").
    pub code: Option<String>,
    pub severity: Severity,
    /// The message, worded as PHP words it.
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        code: impl Into<Option<String>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            severity,
            message: message.into(),
            span: None,
        }
    }

    pub fn notice(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Notice, Some(code.into()), message)
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, Some(code.into()), message)
    }

    pub fn fatal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, Some(code.into()), message)
    }

    /// Creates a diagnostic whose severity is taken from its code's letter.
    pub fn from_code(code: &str, message: impl Into<String>) -> DiagnosticResult<Self> {
        let severity = code
            .chars()
            .next()
            .and_then(Severity::from_letter)
            .ok_or_else(|| DiagnosticError::InvalidCode(code.to_string()))?;
        Ok(Self::new(severity, Some(code.to_string()), message))
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn has_span(&self) -> bool {
        self.span.is_some()
    }

    /// Formats the diagnostic on one line, e.g.
    /// `Warning: Illegal offset type in index.php on line 3`.
    pub fn render_plain(&self, sources: &SourceCache) -> String {
        let location = self
            .span
            .as_ref()
            .and_then(|span| sources.resolve_span(span).map(|resolved| (span, resolved)));
        match location {
            Some((span, resolved)) => format!(
                "{}: {} in {} on line {}",
                self.severity.prefix(),
                self.message,
                span.file.display(),
                resolved.start.line
            ),
            None => format!("{}: {}", self.severity.prefix(), self.message),
        }
    }
}

/// Append-only log of diagnostics, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticLog {
    entries: Vec<Diagnostic>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Diagnostic> {
        self.entries.last()
    }

    /// Messages in emission order, without prefixes.
    pub fn messages(&self) -> Vec<&str> {
        self.entries.iter().map(|d| d.message.as_str()).collect()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|d| d.severity == severity).count()
    }

    pub fn contains_code(&self, code: &str) -> bool {
        self.entries.iter().any(|d| d.code.as_deref() == Some(code))
    }

    /// Renders every entry with [`Diagnostic::render_plain`], one per line.
    pub fn render_plain(&self, sources: &SourceCache) -> String {
        self.entries
            .iter()
            .map(|d| d.render_plain(sources))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<'a> IntoIterator for &'a DiagnosticLog {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Result type for diagnostic operations.
pub type DiagnosticResult<T> = Result<T, DiagnosticError>;

/// Errors that can occur during diagnostic operations.
#[derive(Debug, Error)]
pub enum DiagnosticError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source file not found: {0}")]
    SourceNotFound(String),

    #[error("invalid diagnostic code: {0}")]
    InvalidCode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_severity_prefix() {
        assert_eq!(Severity::Notice.prefix(), "Notice");
        assert_eq!(Severity::Warning.prefix(), "Warning");
        assert_eq!(Severity::Fatal.prefix(), "Fatal error");
        assert!(Severity::Notice < Severity::Fatal);
    }

    #[test]
    fn test_from_code_uses_letter() {
        let diag = Diagnostic::from_code("W1004", "Illegal offset type").unwrap();
        assert_eq!(diag.severity, Severity::Warning);
        assert!(Diagnostic::from_code("Q1004", "nope").is_err());
    }

    #[test]
    fn test_render_plain_without_source() {
        let diag = Diagnostic::notice(codes::ARRAY_TO_STRING, "Array to string conversion");
        assert_eq!(
            diag.render_plain(&SourceCache::new()),
            "Notice: Array to string conversion"
        );
    }

    #[test]
    fn test_render_plain_with_line() {
        let mut sources = SourceCache::new();
        sources.add_source("t.php", "<?php\n$a = 1;\n$b = $a[0];");
        let diag = Diagnostic::warning(codes::SCALAR_AS_ARRAY, "Cannot use a scalar value as an array")
            .with_span(SourceSpan::new("t.php", 20, 25));
        assert_eq!(
            diag.render_plain(&sources),
            "Warning: Cannot use a scalar value as an array in t.php on line 3"
        );
    }

    #[test]
    fn test_log_is_append_only_and_ordered() {
        let mut log = DiagnosticLog::new();
        log.push(Diagnostic::notice(codes::UNDEFINED_VARIABLE, "Undefined variable: a"));
        log.push(Diagnostic::warning(codes::ILLEGAL_OFFSET_TYPE, "Illegal offset type"));
        log.push(Diagnostic::notice(codes::UNDEFINED_OFFSET, "Undefined offset: 1"));

        assert_eq!(log.len(), 3);
        assert_eq!(
            log.messages(),
            vec!["Undefined variable: a", "Illegal offset type", "Undefined offset: 1"]
        );
        assert_eq!(log.count(Severity::Notice), 2);
        assert!(log.contains_code(codes::ILLEGAL_OFFSET_TYPE));
        assert_eq!(log.last().map(|d| d.message.as_str()), Some("Undefined offset: 1"));
    }
}
