//! Template lexer using nom.
//!
//! Splits template text into a flat token stream:
//!
//! ```text
//! -- name: get_server          Name("get_server")
//! -- docs: Fetch one server.   Docs("Fetch one server.")
//! SELECT * FROM server         Fragment("SELECT") Fragment(" ") ...
//! WHERE hostname = :hostname   ... Fragment("=") Fragment(" ") NamedParam("hostname")
//! ```
//!
//! Comments are dropped. Quoted strings are single fragments and never
//! scanned for parameters. `::` casts and `:=` stay literal.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_till, take_while, take_while1},
    character::complete::{char, satisfy, space0},
    combinator::{not, recognize},
    multi::{many0, many1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::ast::{is_identifier, Span, Token, TokenKind};
use crate::error::LexError;

/// Tokenize template text.
pub fn tokenize(text: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(text);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    tracing::trace!(count = tokens.len(), "tokenized template");
    Ok(tokens)
}

struct Lexer<'a> {
    rest: &'a str,
    line: u32,
    column: u32,
    /// Only whitespace seen since the last newline (or start of input).
    line_start: bool,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            rest: text,
            line: 1,
            column: 1,
            line_start: true,
        }
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }

    /// Move the cursor past `consumed`, which must be a prefix of `rest`.
    ///
    /// `\n`, `\r\n` and a lone `\r` each end a line.
    fn advance(&mut self, consumed: &str) {
        let after = &self.rest[consumed.len()..];
        let mut chars = consumed.chars().peekable();
        while let Some(c) = chars.next() {
            let next = chars.peek().copied().or_else(|| after.chars().next());
            if c == '\n' || (c == '\r' && next != Some('\n')) {
                self.line += 1;
                self.column = 1;
                self.line_start = true;
            } else {
                self.column += 1;
                if !c.is_whitespace() {
                    self.line_start = false;
                }
            }
        }
        self.rest = after;
    }

    fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        loop {
            if self.rest.is_empty() {
                return Ok(None);
            }
            let span = self.span();

            if let Ok((_, run)) = whitespace(self.rest) {
                self.advance(run);
                return Ok(Some(Token::new(TokenKind::Fragment, " ", run, span)));
            }

            if self.line_start {
                if let Ok((_, (raw, rest))) = directive("name:", self.rest) {
                    let name = rest.trim();
                    if !is_identifier(name) {
                        return Err(LexError::new(span, format!("invalid query name '{}'", name)));
                    }
                    self.advance(raw);
                    return Ok(Some(Token::new(TokenKind::Name, name, raw, span)));
                }
                if let Ok((_, (raw, rest))) = directive("docs:", self.rest) {
                    self.advance(raw);
                    return Ok(Some(Token::new(TokenKind::Docs, rest.trim(), raw, span)));
                }
            }

            if let Ok((_, raw)) = comment(self.rest) {
                self.advance(raw);
                continue;
            }

            if self.rest.starts_with('\'') {
                return match quoted(self.rest) {
                    Ok((_, raw)) => {
                        self.advance(raw);
                        Ok(Some(Token::new(TokenKind::Fragment, raw, raw, span)))
                    }
                    Err(_) => Err(LexError::new(span, "unterminated string")),
                };
            }

            if let Ok((_, (raw, name))) = named_param(self.rest) {
                self.advance(raw);
                return Ok(Some(Token::new(TokenKind::NamedParam, name, raw, span)));
            }

            if let Ok((_, raw)) = fragment(self.rest) {
                self.advance(raw);
                return Ok(Some(Token::new(TokenKind::Fragment, raw, raw, span)));
            }

            let unexpected = self.rest.chars().next().unwrap_or_default();
            return Err(LexError::new(span, format!("unexpected character '{}'", unexpected)));
        }
    }
}

fn whitespace(input: &str) -> IResult<&str, &str> {
    take_while1(char::is_whitespace)(input)
}

fn rest_of_line(input: &str) -> IResult<&str, &str> {
    take_till(|c: char| c == '\n' || c == '\r')(input)
}

/// `-- <keyword> <rest of line>`, returning the raw match and the rest.
fn directive<'a>(keyword: &str, input: &'a str) -> IResult<&'a str, (&'a str, &'a str)> {
    let (remaining, (_, _, _, rest)) =
        tuple((tag("--"), space0, tag(keyword), rest_of_line))(input)?;
    let raw = &input[..input.len() - remaining.len()];
    Ok((remaining, (raw, rest)))
}

fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("--"), rest_of_line))(input)
}

/// Single-quoted string with `''` and `\'` escapes.
fn quoted(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('\''),
        many0(alt((tag("''"), recognize(pair(char('\\'), satisfy(|_| true))), is_not("'\\")))),
        char('\''),
    ))(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_lowercase() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

fn named_param(input: &str) -> IResult<&str, (&str, &str)> {
    let (remaining, name) = preceded(char(':'), identifier)(input)?;
    let raw = &input[..input.len() - remaining.len()];
    Ok((remaining, (raw, name)))
}

fn fragment(input: &str) -> IResult<&str, &str> {
    recognize(many1(alt((
        take_while1(|c: char| !c.is_whitespace() && c != '\'' && c != ':' && c != '-'),
        tag("::"),
        // `:=`, `: `, trailing `:`; a colon that does not open a parameter
        terminated(tag(":"), not(satisfy(|c| c.is_ascii_lowercase() || c == '_'))),
        terminated(tag("-"), not(char('-'))),
    ))))(input)
}
