//! Lazy token stream with one-token look-ahead
//!
//! The scanner skips whitespace, then tries each pattern of the ordered
//! table; the first match wins. An unmatched position is fatal and carries
//! its source location. End-of-file is a real token (emitted indefinitely),
//! so callers never dereference a missing current token.

use stackc_core::Lookahead;
use tracing::trace;

use crate::error::CompileError;
use crate::token::{Span, Token, TokenKind, extract_value, patterns};

/// Compute the 0-indexed line and column of a byte offset.
pub(crate) fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let prefix = &source[..offset.min(source.len())];
    let line = prefix.bytes().filter(|&b| b == b'\n').count();
    let column = prefix
        .rfind('\n')
        .map(|index| offset - index - 1)
        .unwrap_or(offset);
    (line, column)
}

/// Produces one token per step; never ends (end-of-file repeats forever).
struct Scanner<'a> {
    source: &'a str,
    offset: usize,
}

impl Iterator for Scanner<'_> {
    type Item = Result<Token, CompileError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(c) = self.source[self.offset..].chars().next() {
            if !c.is_whitespace() {
                break;
            }
            self.offset += c.len_utf8();
        }
        if self.offset >= self.source.len() {
            return Some(Ok(Token::end_of_file(self.source.len())));
        }

        let rest = &self.source[self.offset..];
        for pattern in patterns() {
            if let Some(found) = pattern.regex.find(rest) {
                let span = Span::new(self.offset, self.offset + found.end());
                self.offset = span.end;
                let token = Token::new(
                    pattern.kind,
                    extract_value(pattern.kind, found.as_str()),
                    span,
                );
                trace!(kind = ?token.kind, start = span.start, "token");
                return Some(Ok(token));
            }
        }

        let (line, column) = line_column(self.source, self.offset);
        Some(Err(CompileError::UnrecognizedSource {
            offset: self.offset,
            line,
            column,
        }))
    }
}

/// The lexer: a scanner behind a two-slot look-ahead.
pub struct Lexer<'a> {
    tokens: Lookahead<Scanner<'a>>,
    end: Token,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Lexer<'a> {
        Lexer {
            tokens: Lookahead::new(Scanner { source, offset: 0 }),
            end: Token::end_of_file(source.len()),
        }
    }

    /// The token under the cursor.
    pub fn current(&self) -> Result<&Token, CompileError> {
        match self.tokens.current() {
            Some(Ok(token)) => Ok(token),
            Some(Err(err)) => Err(err.clone()),
            None => Ok(&self.end),
        }
    }

    /// The token after the current one.
    pub fn next(&self) -> Result<&Token, CompileError> {
        match self.tokens.peek() {
            Some(Ok(token)) => Ok(token),
            Some(Err(err)) => Err(err.clone()),
            None => Ok(&self.end),
        }
    }

    /// Unconditionally advance, returning the token that was current.
    pub fn move_next(&mut self) -> Result<Token, CompileError> {
        match self.tokens.advance() {
            Some(Ok(token)) => Ok(token),
            Some(Err(err)) => Err(err),
            None => Ok(self.end.clone()),
        }
    }

    /// Advance past the current token, which must be of the expected kind.
    pub fn consume(&mut self, expected: TokenKind) -> Result<Token, CompileError> {
        let current = self.current()?;
        if current.kind != expected {
            return Err(CompileError::UnexpectedToken {
                expected: expected.to_string(),
                found: current.clone(),
            });
        }
        self.move_next()
    }

    /// Advance past the current token if it matches, otherwise stay put.
    pub fn consume_if_matches(
        &mut self,
        expected: TokenKind,
    ) -> Result<Option<Token>, CompileError> {
        if self.current()?.kind == expected {
            Ok(Some(self.move_next()?))
        } else {
            Ok(None)
        }
    }

    pub fn check_current(&self, kind: TokenKind) -> bool {
        matches!(self.current(), Ok(token) if token.kind == kind)
    }

    pub fn check_next(&self, kind: TokenKind) -> bool {
        matches!(self.next(), Ok(token) if token.kind == kind)
    }
}
