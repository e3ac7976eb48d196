//! Token and definition types shared by the lexer, parser and compiler.

use std::fmt;

/// A 1-based position in template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// What a token means to the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `-- name: <identifier>` directive.
    Name,
    /// `-- docs: <text>` directive.
    Docs,
    /// Literal SQL text, a quoted string, or a collapsed whitespace run.
    Fragment,
    /// `:identifier` parameter.
    NamedParam,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Name => write!(f, "name"),
            TokenKind::Docs => write!(f, "docs"),
            TokenKind::Fragment => write!(f, "fragment"),
            TokenKind::NamedParam => write!(f, "named parameter"),
        }
    }
}

/// A lexed token.
///
/// `value` is the semantic payload (the identifier for `Name`/`NamedParam`,
/// trimmed text for `Docs`, `" "` for whitespace runs); `raw` is the source
/// text the token was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub raw: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, raw: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            value: value.into(),
            raw: raw.into(),
            span,
        }
    }

    /// True for fragments made only of whitespace.
    pub fn is_blank(&self) -> bool {
        self.kind == TokenKind::Fragment && self.value.trim().is_empty()
    }
}

/// One element of a query body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyItem {
    Literal(String),
    Param(String),
}

impl BodyItem {
    pub fn literal(text: impl Into<String>) -> Self {
        BodyItem::Literal(text.into())
    }

    pub fn param(name: impl Into<String>) -> Self {
        BodyItem::Param(name.into())
    }
}

/// A parsed query: optional name and docs, and a non-empty body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDefinition {
    pub name: Option<String>,
    pub docs: Option<String>,
    pub body: Vec<BodyItem>,
    pub span: Span,
}

impl QueryDefinition {
    /// Identifiers referenced by the body, in order of appearance.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.body.iter().filter_map(|item| match item {
            BodyItem::Param(name) => Some(name.as_str()),
            BodyItem::Literal(_) => None,
        })
    }
}

/// Parser output: either a file of named queries or one ad-hoc template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Named(Vec<QueryDefinition>),
    Anonymous(QueryDefinition),
}

/// True when `name` is an optional parameter (`_` prefix).
pub fn is_optional(name: &str) -> bool {
    name.starts_with('_')
}

/// True when `text` matches `[a-z_][a-zA-Z0-9_]*`.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
