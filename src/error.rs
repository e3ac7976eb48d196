//! Error types for sqltpl.

use std::fmt::Write;

use colored::Colorize;
use thiserror::Error;

use crate::ast::Span;
use crate::value::Scalar;

/// The lexer could not tokenize the template text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Lex error at line {line}: {reason}")]
pub struct LexError {
    pub line: u32,
    pub column: u32,
    pub reason: String,
}

impl LexError {
    pub fn new(span: Span, reason: impl Into<String>) -> Self {
        Self {
            line: span.line,
            column: span.column,
            reason: reason.into(),
        }
    }
}

/// The token stream does not form valid query definitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parse error at line {line}, column {column}: {description}")]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub description: String,
}

impl ParseError {
    pub fn new(span: Span, description: impl Into<String>) -> Self {
        Self {
            line: span.line,
            column: span.column,
            description: description.into(),
        }
    }
}

/// Failure to turn template text into compiled queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl CompileError {
    pub fn span(&self) -> Span {
        match self {
            CompileError::Lex(e) => Span::new(e.line, e.column),
            CompileError::Parse(e) => Span::new(e.line, e.column),
        }
    }

    /// Render the error with the offending source line and a caret under
    /// the reported column.
    ///
    /// ```text
    /// error: Parse error at line 2, column 1: empty query body
    ///  --> 2:1
    ///   |
    /// 2 | -- name: empty
    ///   | ^
    /// ```
    pub fn render(&self, source: &str, color: bool) -> String {
        render_snippet(&self.to_string(), source, self.span(), color)
    }
}

fn paint(text: &str, color: bool, style: fn(&str) -> colored::ColoredString) -> String {
    if color {
        style(text).to_string()
    } else {
        text.to_string()
    }
}

/// Format `message` followed by a source excerpt pointing at `span`.
pub fn render_snippet(message: &str, source: &str, span: Span, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}",
        paint("error:", color, |s| s.red().bold()),
        paint(message, color, |s| s.bold())
    );

    let line_no = span.line.max(1);
    let gutter = " ".repeat(line_no.to_string().len());
    let _ = writeln!(out, "{}{} {}", gutter, paint("-->", color, |s| s.blue()), span);

    let Some(text) = source.lines().nth(line_no as usize - 1) else {
        return out;
    };

    let bar = paint("|", color, |s| s.blue());
    let _ = writeln!(out, "{} {}", gutter, bar);
    let _ = writeln!(out, "{} {} {}", paint(&line_no.to_string(), color, |s| s.blue()), bar, text);

    // Keep tabs so the caret lines up under the same terminal column.
    let pad: String = text
        .chars()
        .take(span.column.saturating_sub(1) as usize)
        .map(|c| if c == '\t' { '\t' } else { ' ' })
        .collect();
    let _ = writeln!(out, "{} {} {}{}", gutter, bar, pad, paint("^", color, |s| s.red().bold()));
    out
}

/// Why a referenced identifier could not be expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamErrorKind {
    /// Mandatory parameter absent from the call (or unknown query name).
    NotFound,
    /// Composition nested deeper than `Options::max_depth`.
    RecursionLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamError {
    pub name: String,
    pub kind: ParamErrorKind,
}

impl ParamError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamErrorKind::NotFound,
        }
    }

    pub fn recursion_limit(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamErrorKind::RecursionLimit,
        }
    }
}

impl std::fmt::Display for ParamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ParamErrorKind::NotFound => write!(f, "{}: not found", self.name),
            ParamErrorKind::RecursionLimit => write!(f, "{}: recursion limit reached", self.name),
        }
    }
}

/// An expansion that could not bind every mandatory parameter.
///
/// Carries the partial statement (with `<missing name>` markers) and the
/// arguments bound so far, so callers can show exactly what went wrong.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Unbound query: {}", join_errors(.errors))]
pub struct Unbound {
    pub statement: String,
    pub arguments: Vec<Scalar>,
    pub errors: Vec<ParamError>,
}

fn join_errors(errors: &[ParamError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", ")
}

/// Failure while executing an expanded query.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Unbound(#[from] Unbound),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Execution error: {0}")]
    Execution(String),
}

/// Failure while loading `sqltpl.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Result type alias for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ParseError::new(Span::new(4, 2), "empty query body");
        assert_eq!(
            err.to_string(),
            "Parse error at line 4, column 2: empty query body"
        );
        let err = LexError::new(Span::new(7, 9), "unterminated string");
        assert_eq!(err.to_string(), "Lex error at line 7: unterminated string");
    }

    #[test]
    fn test_render_points_at_column() {
        let source = "-- name: a\nSELECT 'oops\n";
        let err: CompileError = LexError::new(Span::new(2, 8), "unterminated string").into();
        let rendered = err.render(source, false);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "error: Lex error at line 2: unterminated string");
        assert_eq!(lines[1], " --> 2:8");
        assert_eq!(lines[3], "2 | SELECT 'oops");
        assert_eq!(lines[4], "  |        ^");
    }

    #[test]
    fn test_render_line_out_of_range() {
        let err: CompileError = ParseError::new(Span::new(9, 1), "empty query body").into();
        let rendered = err.render("one line", false);
        assert_eq!(rendered.lines().count(), 2);
    }

    #[test]
    fn test_unbound_display_lists_every_error() {
        let err = Unbound {
            statement: "SELECT <missing a>, <missing b>".to_string(),
            arguments: vec![],
            errors: vec![ParamError::not_found("a"), ParamError::not_found("b")],
        };
        assert_eq!(err.to_string(), "Unbound query: a: not found, b: not found");
    }
}
