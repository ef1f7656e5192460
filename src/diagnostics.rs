//! Diagnostics: source locations, severities, and the sink that accumulates them.
//!
//! The preprocessor and parser both recover from certain errors so that later
//! problems in the same file can still be reported. Anything
//! genuinely fatal (semantic errors, codegen errors, backend errors) is
//! still returned as a `Result` error up the call stack; this sink exists
//! only for the handful of cases that are recoverable within a single file.

use std::fmt;
use std::path::PathBuf;

/// A 1-indexed location in a source file, matching the `file:line:column`
/// format used by the error reporter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        SourceLocation {
            file: file.into(),
            line,
            column,
        }
    }

    /// A placeholder location for errors raised by code that only has a
    /// name to report (e.g. a type-table lookup), not a token position.
    pub fn unknown() -> Self {
        SourceLocation {
            file: PathBuf::from("<generated>"),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            location: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: {}: {}", loc, self.severity, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Accumulates diagnostics emitted while recovering from non-fatal errors.
///
/// Mirrors how the preprocessor keeps going after a malformed directive or a
/// missing include: the sink records the problem, and the
/// driver checks `has_errors()` at the next decision point to decide whether
/// to still treat the overall run as failed.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Error {
            tracing::warn!(message = %diagnostic, "recovered error");
        } else {
            tracing::debug!(message = %diagnostic, "diagnostic");
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Diagnostic::error(message));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(Diagnostic::warning(message));
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Formats a single diagnostic the way the (out-of-scope) pretty printer
/// would: the message line followed by the source line and a caret aligned
/// to the column, copying tabs verbatim so terminal tab stops still line up.
pub fn render_caret(location: &SourceLocation, source_line: &str) -> String {
    let mut indicator = String::new();
    for ch in source_line.chars().take(location.column.saturating_sub(1)) {
        indicator.push(if ch == '\t' { '\t' } else { ' ' });
    }
    indicator.push('^');
    format!("{}\n{}", source_line, indicator)
}
