//! Stylesheet reference scanning.
//!
//! The scanner finds every `url()` and `@import` target in stylesheet text
//! and reports its byte span so callers can splice replacements in while
//! leaving every other byte untouched.

use av_core::charset_parameter;
use encoding_rs::Encoding;
use encoding_rs::UTF_8;
use std::ops::Range;

/// How a stylesheet refers to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CssReferenceKind {
    /// `@import` target: another stylesheet.
    Import,
    /// Any other `url()`, including `@font-face` sources.
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssReference {
    /// Span of the literal to replace: the whole `url(...)` token or the
    /// quoted string of a string-form `@import`.
    pub span: Range<usize>,
    /// Unescaped target URL.
    pub url: String,
    pub kind: CssReferenceKind,
}

/// Scans stylesheet text for references, in source order.
#[derive(Debug, Default)]
pub struct CssScanner;

impl CssScanner {
    pub fn scan(&self, input: &str) -> Vec<CssReference> {
        let bytes = input.as_bytes();
        let mut out = Vec::new();
        let mut idx = 0_usize;

        while idx < bytes.len() {
            let byte = bytes[idx];
            let next = bytes.get(idx + 1).copied();

            if byte == b'/' && next == Some(b'*') {
                idx = skip_comment(bytes, idx);
                continue;
            }

            if byte == b'"' || byte == b'\'' {
                idx = skip_string(bytes, idx).end;
                continue;
            }

            if byte == b'\\' {
                idx = idx.saturating_add(2);
                continue;
            }

            if byte == b'@' && starts_with_ignore_ascii_case(bytes, idx + 1, b"import") {
                let after = idx + 7;
                if !bytes.get(after).copied().is_some_and(is_ident_byte) {
                    if let Some((reference, end)) = scan_import(input, after) {
                        out.push(reference);
                        idx = end;
                        continue;
                    }
                }
                idx = after;
                continue;
            }

            if (byte == b'u' || byte == b'U')
                && starts_with_ignore_ascii_case(bytes, idx, b"url(")
                && !preceded_by_ident(bytes, idx)
            {
                if let Some((span, url)) = scan_url_function(input, idx) {
                    idx = span.end;
                    out.push(CssReference {
                        span,
                        url,
                        kind: CssReferenceKind::Url,
                    });
                    continue;
                }
                idx = skip_bad_url(bytes, idx + 4);
                continue;
            }

            idx += 1;
        }

        out
    }
}

fn scan_import(input: &str, from: usize) -> Option<(CssReference, usize)> {
    let bytes = input.as_bytes();
    let mut idx = skip_whitespace_and_comments(bytes, from);
    let byte = bytes.get(idx).copied()?;

    if byte == b'"' || byte == b'\'' {
        let span = skip_string(bytes, idx);
        if span.end - 1 == idx || bytes.get(span.end - 1).copied() != Some(byte) {
            return None;
        }
        let url = unescape(&input[span.start + 1..span.end - 1]);
        idx = span.end;
        return Some((
            CssReference {
                span,
                url,
                kind: CssReferenceKind::Import,
            },
            idx,
        ));
    }

    if starts_with_ignore_ascii_case(bytes, idx, b"url(") {
        let (span, url) = scan_url_function(input, idx)?;
        let end = span.end;
        return Some((
            CssReference {
                span,
                url,
                kind: CssReferenceKind::Import,
            },
            end,
        ));
    }

    None
}

/// Parses `url(...)` starting at `start`; returns the token span and target.
fn scan_url_function(input: &str, start: usize) -> Option<(Range<usize>, String)> {
    let bytes = input.as_bytes();
    let mut idx = start + 4;
    while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
        idx += 1;
    }

    let quote = bytes.get(idx).copied()?;
    if quote == b'"' || quote == b'\'' {
        let string = skip_string(bytes, idx);
        if bytes.get(string.end - 1).copied() != Some(quote) || string.end - 1 == idx {
            return None;
        }
        let url = unescape(&input[string.start + 1..string.end - 1]);
        let mut close = string.end;
        while close < bytes.len() && bytes[close].is_ascii_whitespace() {
            close += 1;
        }
        if bytes.get(close).copied() != Some(b')') {
            return None;
        }
        return Some((start..close + 1, url));
    }

    let value_start = idx;
    while idx < bytes.len() {
        match bytes[idx] {
            b')' => {
                let url = unescape(input[value_start..idx].trim_end());
                return Some((start..idx + 1, url));
            }
            b'\\' => idx += 2,
            b'"' | b'\'' | b'(' => return None,
            _ => idx += 1,
        }
    }

    None
}

/// A malformed `url(` swallows everything up to the next `)`.
fn skip_bad_url(bytes: &[u8], from: usize) -> usize {
    let mut idx = from;
    while idx < bytes.len() {
        match bytes[idx] {
            b')' => return idx + 1,
            b'\\' => idx += 2,
            _ => idx += 1,
        }
    }
    bytes.len()
}

/// Span of a quoted string starting at `start`, quotes included. An
/// unterminated string runs to the end of the line or input.
fn skip_string(bytes: &[u8], start: usize) -> Range<usize> {
    let quote = bytes[start];
    let mut idx = start + 1;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx += 2,
            b'\n' => return start..idx,
            byte if byte == quote => return start..idx + 1,
            _ => idx += 1,
        }
    }
    start..bytes.len()
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    let mut idx = start + 2;
    while idx + 1 < bytes.len() {
        if bytes[idx] == b'*' && bytes[idx + 1] == b'/' {
            return idx + 2;
        }
        idx += 1;
    }
    bytes.len()
}

fn skip_whitespace_and_comments(bytes: &[u8], mut idx: usize) -> usize {
    loop {
        while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
            idx += 1;
        }
        if bytes.get(idx).copied() == Some(b'/') && bytes.get(idx + 1).copied() == Some(b'*') {
            idx = skip_comment(bytes, idx);
            continue;
        }
        return idx;
    }
}

fn preceded_by_ident(bytes: &[u8], idx: usize) -> bool {
    idx > 0 && is_ident_byte(bytes[idx - 1])
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'\\') || byte >= 0x80
}

fn starts_with_ignore_ascii_case(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    let end = idx.saturating_add(pattern.len());
    if end > bytes.len() {
        return false;
    }

    bytes[idx..end]
        .iter()
        .zip(pattern.iter())
        .all(|(left, right)| left.eq_ignore_ascii_case(right))
}

/// Resolves CSS escapes (`\26 `, `\"`, escaped newlines).
pub fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }

        let mut hex = String::new();
        while hex.len() < 6 {
            match chars.peek() {
                Some(next) if next.is_ascii_hexdigit() => {
                    hex.push(*next);
                    chars.next();
                }
                _ => break,
            }
        }

        if hex.is_empty() {
            match chars.next() {
                Some('\n') | None => {}
                Some(other) => out.push(other),
            }
            continue;
        }

        if matches!(chars.peek(), Some(' ' | '\t' | '\n')) {
            chars.next();
        }
        let value = u32::from_str_radix(&hex, 16).unwrap_or(0xfffd);
        out.push(match char::from_u32(value) {
            Some(ch) if value != 0 => ch,
            _ => '\u{fffd}',
        });
    }

    out
}

/// Serializes a URL as a double-quoted `url()` token.
pub fn url_token(url: &str) -> String {
    let mut out = String::with_capacity(url.len() + 7);
    out.push_str("url(\"");
    for ch in url.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\a "),
            '\r' => out.push_str("\\d "),
            _ => out.push(ch),
        }
    }
    out.push_str("\")");
    out
}

/// Decodes stylesheet bytes: BOM, then `@charset`, then the MIME charset
/// parameter, then UTF-8.
pub fn decode_stylesheet(bytes: &[u8], mime: &str) -> String {
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| declared_charset(bytes).and_then(|label| Encoding::for_label(label.as_bytes())))
        .or_else(|| charset_parameter(mime).and_then(|label| Encoding::for_label(label.as_bytes())))
        .unwrap_or(UTF_8);

    // UTF-16 declarations inside ASCII-compatible text are bogus.
    let encoding = if encoding == encoding_rs::UTF_16LE || encoding == encoding_rs::UTF_16BE {
        if Encoding::for_bom(bytes).is_some() {
            encoding
        } else {
            UTF_8
        }
    } else {
        encoding
    };

    let (decoded, _, _) = encoding.decode(bytes);
    decoded.into_owned()
}

fn declared_charset(bytes: &[u8]) -> Option<String> {
    let rest = bytes.strip_prefix(b"@charset \"")?;
    let end = rest.iter().take(64).position(|byte| *byte == b'"')?;
    if rest.get(end + 1).copied() != Some(b';') {
        return None;
    }
    String::from_utf8(rest[..end].to_vec()).ok()
}
