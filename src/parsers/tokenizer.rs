//! Byte-level tokenizer for `songs.dta` manifests.
//!
//! Works on raw bytes so offsets stay exact even for manifests that are not
//! valid UTF-8 (older packs ship CP-1252 names). Every syntax character is
//! ASCII, which keeps scanning simple and lets the entry locator splice the
//! original buffer without re-encoding anything.

use std::borrow::Cow;

use serde::Serialize;
use tracing::warn;

/// Lexical class of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind
{
    Open,
    Close,
    /// Double-quoted string, escapes kept in `raw`
    Str,
    /// Single-quoted symbol, leading quote kept in `raw`
    Symbol,
    /// Bare word or number
    Atom,
}

/// A classified slice of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a>
{
    pub kind: TokenKind,
    pub raw: &'a [u8],
    pub start: usize,
    pub end: usize,
}

impl<'a> Token<'a>
{
    /// Raw token text decoded for display and comparison.
    pub fn text(&self) -> Cow<'a, str>
    {
        decode_text(self.raw)
    }

    pub fn is_paren(&self) -> bool
    {
        matches!(self.kind, TokenKind::Open | TokenKind::Close)
    }
}

/// Split `src` into tokens. Never fails; malformed input is tolerated.
pub fn tokenize(src: &[u8]) -> Vec<Token<'_>>
{
    let mut out = Vec::with_capacity(src.len() / 6);
    let mut i = 0;

    while i < src.len()
    {
        let b = src[i];

        if b.is_ascii_whitespace()
        {
            i += 1;
            continue;
        }

        match b
        {
            b';' =>
            {
                // Line comment: skip to the next newline
                i = memchr::memchr(b'\n', &src[i..]).map_or(src.len(), |n| i + n + 1);
            }
            b'(' | b')' =>
            {
                let kind = if b == b'(' { TokenKind::Open } else { TokenKind::Close };
                out.push(Token { kind, raw: &src[i..i + 1], start: i, end: i + 1 });
                i += 1;
            }
            b'"' =>
            {
                let start = i;
                let end = scan_string(src, start);
                out.push(Token { kind: TokenKind::Str, raw: &src[start..end], start, end });
                i = end;
            }
            _ =>
            {
                let start = i;
                while i < src.len() && !is_boundary(src[i])
                {
                    i += 1;
                }
                let kind = if b == b'\'' { TokenKind::Symbol } else { TokenKind::Atom };
                out.push(Token { kind, raw: &src[start..i], start, end: i });
            }
        }
    }

    out
}

/// Return the end offset (exclusive) of the string starting at `start`.
fn scan_string(
    src: &[u8],
    start: usize,
) -> usize
{
    let mut i = start + 1;
    while i < src.len()
    {
        match src[i]
        {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }

    warn!(offset = start, "unterminated string literal, taking the rest of the input");
    src.len()
}

fn is_boundary(b: u8) -> bool
{
    b.is_ascii_whitespace() || b == b'(' || b == b')'
}

/// True when `'text'` reads back as one symbol token holding `text`.
pub fn is_plain_symbol(text: &str) -> bool
{
    !text.is_empty()
        && text
            .bytes()
            .all(|b| !is_boundary(b) && !matches!(b, b'"' | b'\'' | b';'))
}

/// Inner text of a string token with `\"` and `\\` unescaped.
/// Tolerates a missing closing quote.
pub fn unescape_string(raw: &[u8]) -> Vec<u8>
{
    let inner = raw.strip_prefix(b"\"").unwrap_or(raw);
    let inner = match inner.strip_suffix(b"\"")
    {
        // A trailing `\"` is an escaped quote of an unterminated string
        Some(body) if !ends_with_escape(body) => body,
        _ => inner,
    };

    let mut out = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len()
    {
        if inner[i] == b'\\' && i + 1 < inner.len() && matches!(inner[i + 1], b'"' | b'\\')
        {
            out.push(inner[i + 1]);
            i += 2;
            continue;
        }
        out.push(inner[i]);
        i += 1;
    }
    out
}

// Odd run of trailing backslashes means the last byte is escaped
fn ends_with_escape(body: &[u8]) -> bool
{
    body.iter()
        .rev()
        .take_while(|&&b| b == b'\\')
        .count()
        % 2
        == 1
}

/// Escape a value for a double-quoted string token.
pub fn escape_string(value: &str) -> String
{
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars()
    {
        if c == '"' || c == '\\'
        {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

const CP1252_MAP: [u16; 32] = [
    0x20AC, 0xFFFD, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, 0x02C6, 0x2030, 0x0160, 0x2039,
    0x0152, 0xFFFD, 0x017D, 0xFFFD, 0xFFFD, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014,
    0x02DC, 0x2122, 0x0161, 0x203A, 0x0153, 0xFFFD, 0x017E, 0x0178,
];

fn decode_cp1252(bytes: &[u8]) -> String
{
    bytes
        .iter()
        .map(|&b| match b
        {
            0x00..=0x7F => b as char,
            0x80..=0x9F =>
            {
                char::from_u32(CP1252_MAP[(b - 0x80) as usize] as u32).unwrap_or('\u{FFFD}')
            }
            _ => char::from_u32(b as u32).unwrap_or('\u{FFFD}'),
        })
        .collect()
}

/// UTF-8 when valid, CP-1252 otherwise.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str>
{
    std::str::from_utf8(bytes)
        .map(Cow::Borrowed)
        .unwrap_or_else(|_| Cow::Owned(decode_cp1252(bytes)))
}
