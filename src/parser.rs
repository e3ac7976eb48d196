//! Groups lexed tokens into query definitions.
//!
//! ```text
//! queries    := named_query+ | body_item+
//! named_query := Name Docs? body_item+
//! body_item  := Fragment | NamedParam
//! ```
//!
//! Whitespace fragments before the first `Name` and between a `Name` and
//! its `Docs` are layout and are skipped.

use std::collections::HashMap;
use std::iter::Peekable;
use std::vec::IntoIter;

use crate::ast::*;
use crate::error::ParseError;

/// Parse a token stream into named queries or a single anonymous template.
pub fn parse(tokens: Vec<Token>) -> Result<Parsed, ParseError> {
    let mut parser = Parser {
        tokens: tokens.into_iter().peekable(),
        last: Span::new(1, 1),
    };
    parser.skip_blank();

    match parser.peek_kind() {
        None => Err(ParseError::new(Span::new(1, 1), "empty query body")),
        Some(TokenKind::Name) => {
            let queries = parser.parse_named()?;
            check_duplicates(&queries)?;
            Ok(Parsed::Named(queries))
        }
        Some(_) => parser.parse_anonymous().map(Parsed::Anonymous),
    }
}

struct Parser {
    tokens: Peekable<IntoIter<Token>>,
    /// Location of the last consumed token, for end-of-input errors.
    last: Span,
}

impl Parser {
    fn peek_kind(&mut self) -> Option<TokenKind> {
        self.tokens.peek().map(|t| t.kind)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.next()?;
        self.last = token.span;
        Some(token)
    }

    fn skip_blank(&mut self) {
        while self.tokens.peek().is_some_and(Token::is_blank) {
            self.next();
        }
    }

    fn parse_named(&mut self) -> Result<Vec<QueryDefinition>, ParseError> {
        let mut queries = Vec::new();
        while let Some(token) = self.next() {
            match token.kind {
                TokenKind::Name => queries.push(self.parse_query(token)?),
                // Only reachable for the first token; later ones are
                // consumed by `parse_body`.
                _ => return Err(unexpected(&token)),
            }
        }
        Ok(queries)
    }

    fn parse_query(&mut self, name: Token) -> Result<QueryDefinition, ParseError> {
        self.skip_blank();
        let docs = match self.peek_kind() {
            Some(TokenKind::Docs) => self.next().map(|t| t.value),
            _ => None,
        };

        let body = self.parse_body()?;
        if body.iter().all(|item| matches!(item, BodyItem::Literal(s) if s.trim().is_empty())) {
            return Err(ParseError::new(
                name.span,
                format!("empty query body for '{}'", name.value),
            ));
        }

        Ok(QueryDefinition {
            name: Some(name.value),
            docs,
            body,
            span: name.span,
        })
    }

    /// Consume body items up to the next `Name` (or end of input).
    fn parse_body(&mut self) -> Result<Vec<BodyItem>, ParseError> {
        let mut body = Vec::new();
        while let Some(kind) = self.peek_kind() {
            match kind {
                TokenKind::Name => break,
                TokenKind::Docs => {
                    let token = self.next().map(|t| t.span).unwrap_or(self.last);
                    return Err(ParseError::new(
                        token,
                        "docs must directly follow a name directive",
                    ));
                }
                TokenKind::Fragment | TokenKind::NamedParam => {
                    if let Some(token) = self.next() {
                        body.push(body_item(token));
                    }
                }
            }
        }
        Ok(body)
    }

    fn parse_anonymous(&mut self) -> Result<QueryDefinition, ParseError> {
        let span = self.tokens.peek().map(|t| t.span).unwrap_or(self.last);
        let mut body = Vec::new();
        while let Some(token) = self.next() {
            match token.kind {
                TokenKind::Fragment | TokenKind::NamedParam => body.push(body_item(token)),
                TokenKind::Name => {
                    return Err(ParseError::new(
                        token.span,
                        format!("named query '{}' mixed with an unnamed query", token.value),
                    ));
                }
                TokenKind::Docs => {
                    return Err(ParseError::new(
                        token.span,
                        "docs must directly follow a name directive",
                    ));
                }
            }
        }
        Ok(QueryDefinition {
            name: None,
            docs: None,
            body,
            span,
        })
    }
}

fn body_item(token: Token) -> BodyItem {
    match token.kind {
        TokenKind::NamedParam => BodyItem::Param(token.value),
        _ => BodyItem::Literal(token.value),
    }
}

fn unexpected(token: &Token) -> ParseError {
    match token.kind {
        TokenKind::Docs => ParseError::new(token.span, "docs must directly follow a name directive"),
        kind => ParseError::new(token.span, format!("unexpected {} before first name directive", kind)),
    }
}

fn check_duplicates(queries: &[QueryDefinition]) -> Result<(), ParseError> {
    let mut seen: HashMap<&str, Span> = HashMap::new();
    for query in queries {
        let Some(name) = query.name.as_deref() else {
            continue;
        };
        if let Some(first) = seen.insert(name, query.span) {
            return Err(ParseError::new(
                query.span,
                format!("duplicate query name '{}' (first defined at {})", name, first),
            ));
        }
    }
    Ok(())
}
