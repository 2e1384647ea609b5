//! Statement splitting.
//!
//! Splits raw script text at top-level `;` while skipping the contents of
//! quoted strings and identifiers, comments, and dollar-quoted blocks.
//!
//! Offsets are reported twice: as byte offsets into the original `&str` (for
//! slicing on the Rust side) and as UTF-16 code-unit offsets (what browser
//! editors use for cursor positions). Characters outside the Basic
//! Multilingual Plane count as one `char`, four bytes and two UTF-16 units.

use serde::Serialize;

use crate::lexer::{
    dollar_tag_len, skip_block_comment, skip_bracketed, skip_dollar_quoted, skip_line_comment,
    skip_quoted,
};

/// One statement's source span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedStatement {
    /// Statement text without the terminating `;` and without surrounding
    /// whitespace or comments.
    pub code: String,
    /// Byte offset of the first character of `code`.
    pub start_offset: usize,
    /// Byte offset one past the last character of `code`.
    pub end_offset: usize,
    /// UTF-16 offset of the first character of `code`.
    pub utf16_start: usize,
    /// UTF-16 offset one past the last character of `code`.
    pub utf16_end: usize,
    /// 1-based line of the first character of `code`.
    pub line_number: usize,
    /// 1-based column (UTF-16 units) of the first character of `code`.
    pub column: usize,
}

impl ParsedStatement {
    /// Wrap a standalone piece of code as a single statement at line 1.
    #[must_use]
    pub fn standalone(code: impl Into<String>) -> Self {
        let code = code.into();
        let utf16_end = code.encode_utf16().count();
        Self {
            start_offset: 0,
            end_offset: code.len(),
            utf16_start: 0,
            utf16_end,
            line_number: 1,
            column: 1,
            code,
        }
    }
}

/// Split `script` into its non-empty statements, in source order.
#[must_use]
pub fn split_statements(script: &str) -> Vec<ParsedStatement> {
    let bytes = script.as_bytes();
    let mut locator = Locator::new(script);
    let mut statements = Vec::new();
    let mut span: Option<(usize, usize)> = None;
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            b';' => {
                if let Some((start, end)) = span.take() {
                    statements.push(locator.statement(start, end));
                }
                pos += 1;
            }
            b'-' if bytes.get(pos + 1) == Some(&b'-') => pos = skip_line_comment(bytes, pos),
            b'#' => pos = skip_line_comment(bytes, pos),
            b'/' if bytes.get(pos + 1) == Some(&b'*') => pos = skip_block_comment(bytes, pos),
            quote @ (b'\'' | b'"' | b'`') => {
                let end = skip_quoted(bytes, pos, quote);
                mark(&mut span, pos, end);
                pos = end;
            }
            b'[' => {
                let end = skip_bracketed(bytes, pos);
                mark(&mut span, pos, end);
                pos = end;
            }
            b'$' => {
                let end = dollar_tag_len(bytes, pos)
                    .map_or(pos + 1, |tag_len| skip_dollar_quoted(script, pos, tag_len));
                mark(&mut span, pos, end);
                pos = end;
            }
            b if b.is_ascii_whitespace() => pos += 1,
            _ => {
                let width = script[pos..].chars().next().map_or(1, char::len_utf8);
                mark(&mut span, pos, pos + width);
                pos += width;
            }
        }
    }

    if let Some((start, end)) = span {
        statements.push(locator.statement(start, end));
    }

    tracing::trace!(count = statements.len(), "split script");
    statements
}

/// Extend the current statement span to `end`, opening it at `start` if needed.
fn mark(span: &mut Option<(usize, usize)>, start: usize, end: usize) {
    *span = Some((span.map_or(start, |(first, _)| first), end));
}

/// Forward-only cursor translating byte offsets into line/column/UTF-16
/// positions. Queries must be made in non-decreasing offset order.
struct Locator<'a> {
    src: &'a str,
    byte: usize,
    utf16: usize,
    line: usize,
    column: usize,
}

impl<'a> Locator<'a> {
    const fn new(src: &'a str) -> Self {
        Self {
            src,
            byte: 0,
            utf16: 0,
            line: 1,
            column: 1,
        }
    }

    fn advance_to(&mut self, target: usize) {
        for ch in self.src[self.byte..target].chars() {
            let units = ch.len_utf16();
            self.utf16 += units;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += units;
            }
        }
        self.byte = target;
    }

    fn statement(&mut self, start: usize, end: usize) -> ParsedStatement {
        self.advance_to(start);
        let (line_number, column, utf16_start) = (self.line, self.column, self.utf16);
        self.advance_to(end);
        ParsedStatement {
            code: self.src[start..end].to_string(),
            start_offset: start,
            end_offset: end,
            utf16_start,
            utf16_end: self.utf16,
            line_number,
            column,
        }
    }
}
