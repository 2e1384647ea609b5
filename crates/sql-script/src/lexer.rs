//! Byte-level scanning helpers shared by the splitter, classifier and validator.
//!
//! Every delimiter the scanner cares about is ASCII, and UTF-8 continuation
//! bytes never collide with ASCII, so positions returned here always fall on
//! `char` boundaries of the scanned `&str`.

/// Skip a `--` or `#` line comment starting at `pos`. Returns the position of
/// the terminating newline (or end of input).
pub(crate) fn skip_line_comment(bytes: &[u8], pos: usize) -> usize {
    bytes[pos..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |offset| pos + offset)
}

/// Skip a `/* */` block comment starting at `pos`. Nested comments are
/// balanced; an unterminated comment runs to end of input.
pub(crate) fn skip_block_comment(bytes: &[u8], pos: usize) -> usize {
    let mut depth = 0usize;
    let mut i = pos;
    while i < bytes.len() {
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return i;
            }
        } else {
            i += 1;
        }
    }
    bytes.len()
}

/// Skip a string or identifier quoted with `quote`, starting at the opening
/// quote. A doubled quote inside the literal is an escaped quote.
pub(crate) fn skip_quoted(bytes: &[u8], pos: usize, quote: u8) -> usize {
    let mut i = pos + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Skip a `[bracketed]` identifier starting at the opening bracket.
pub(crate) fn skip_bracketed(bytes: &[u8], pos: usize) -> usize {
    bytes[pos + 1..]
        .iter()
        .position(|&b| b == b']')
        .map_or(bytes.len(), |offset| pos + 1 + offset + 1)
}

/// Length of the dollar-quote tag (`$$` or `$tag$`) opening at `pos`, if any.
///
/// Tags follow identifier rules, so positional parameters like `$1` never
/// open a dollar-quoted block. A `$` continuing an identifier (`a$b$c`)
/// never opens one either.
pub(crate) fn dollar_tag_len(bytes: &[u8], pos: usize) -> Option<usize> {
    if pos > 0 && is_identifier_byte(bytes[pos - 1]) {
        return None;
    }
    let first = *bytes.get(pos + 1)?;
    if first == b'$' {
        return Some(2);
    }
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut i = pos + 2;
    while let Some(&b) = bytes.get(i) {
        if b == b'$' {
            return Some(i + 1 - pos);
        }
        if !(b.is_ascii_alphanumeric() || b == b'_') {
            return None;
        }
        i += 1;
    }
    None
}

/// Bytes that may continue an identifier; non-ASCII counts as a letter.
const fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || !b.is_ascii()
}

/// Skip a dollar-quoted block whose opening tag starts at `pos`.
pub(crate) fn skip_dollar_quoted(src: &str, pos: usize, tag_len: usize) -> usize {
    let tag = &src[pos..pos + tag_len];
    let body = pos + tag_len;
    src[body..]
        .find(tag)
        .map_or(src.len(), |offset| body + offset + tag_len)
}

/// Skip whitespace and comments starting at `pos`.
pub(crate) fn skip_trivia(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() {
        match bytes[pos] {
            b if b.is_ascii_whitespace() => pos += 1,
            b'-' if bytes.get(pos + 1) == Some(&b'-') => pos = skip_line_comment(bytes, pos),
            b'#' => pos = skip_line_comment(bytes, pos),
            b'/' if bytes.get(pos + 1) == Some(&b'*') => pos = skip_block_comment(bytes, pos),
            _ => break,
        }
    }
    pos
}

/// Read a bare keyword/identifier word (`[A-Za-z0-9_]+`) at `pos`.
pub(crate) fn read_word(src: &str, pos: usize) -> Option<(&str, usize)> {
    let bytes = src.as_bytes();
    let len = bytes[pos..]
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count();
    (len > 0).then(|| (&src[pos..pos + len], pos + len))
}

/// Read one identifier part at `pos`: quoted (`"x"`, `` `x` ``, `[x]`) or bare.
///
/// Returns the unquoted text and the position after the identifier.
pub(crate) fn read_identifier(src: &str, pos: usize) -> Option<(String, usize)> {
    let bytes = src.as_bytes();
    match *bytes.get(pos)? {
        quote @ (b'"' | b'`') => {
            let end = skip_quoted(bytes, pos, quote);
            let inner_end = if bytes.get(end - 1) == Some(&quote) && end > pos + 1 {
                end - 1
            } else {
                end
            };
            let q = quote as char;
            Some((src[pos + 1..inner_end].replace(&format!("{q}{q}"), &q.to_string()), end))
        }
        b'[' => {
            let end = skip_bracketed(bytes, pos);
            let inner_end = if bytes.get(end - 1) == Some(&b']') {
                end - 1
            } else {
                end
            };
            Some((src[pos + 1..inner_end].to_string(), end))
        }
        _ => {
            let len = src[pos..]
                .char_indices()
                .take_while(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == '$')
                .map(|(i, c)| i + c.len_utf8())
                .last()?;
            Some((src[pos..pos + len].to_string(), pos + len))
        }
    }
}
