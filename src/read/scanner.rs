// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of table-read, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use thiserror::Error;

use crate::{
    options::Dialect,
    read::token::{Token, KIND_BOOLEAN, KIND_FLOAT, KIND_INTEGER, KIND_QUOTED},
};

/// An error from scanning records, with the 1-based line number it occurred
/// on.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: u64,
}

impl ParseError {
    pub(crate) fn new(kind: ParseErrorKind, line: u64) -> Self {
        ParseError { kind, line }
    }
}

/// A kind of error from scanning a record.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The scanner reached a byte that is illegal in its current state, such
    /// as a control byte in a field body.
    #[error("unexpected byte {0:#04x} in record")]
    UnexpectedByte(u8),
    /// A lead byte was not followed by the expected continuation bytes, or a
    /// continuation byte appeared on its own.
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
    /// Only the delimiter, a record terminator, trailing spaces (when
    /// trimming), or a reopening quote may follow a closing quote.
    #[error("unexpected byte {0:#04x} after closing quote")]
    AfterQuote(u8),
    /// A quoted field was still open when the stream ended.
    #[error("quoted field is not closed")]
    UnclosedQuote,
    /// A record carries more fields than the header has columns.
    #[error("record has more than {limit} fields")]
    TooManyColumns { limit: usize },
    /// A record carries fewer fields than the header has columns.
    #[error("expected {expected} fields, found {found}")]
    ColumnCount { expected: usize, found: usize },
    /// Quoted column names must not contain line breaks.
    #[error("quoted column name spans multiple lines")]
    MultilineHeader,
    /// The header is empty (or a single zero-length field).
    #[error("no column names in the header")]
    NoColumnNames,
    /// The fallback integer parser overflowed.
    #[error("integer value out of range")]
    IntegerOverflow,
}

/// Column-major token workspace: `tokens[col][row]` for one chunk.
///
/// The matrix is allocated once per read and reused across chunks; cells are
/// overwritten as rows are scanned, and [`Token::NULL`] marks cells no record
/// has written yet.
pub(super) struct TokenMatrix {
    tokens: Vec<Token>,
    ncols: usize,
    nrows: usize,
}

impl TokenMatrix {
    pub(super) fn new(ncols: usize, nrows: usize) -> Self {
        TokenMatrix {
            tokens: vec![Token::NULL; ncols * nrows],
            ncols,
            nrows,
        }
    }

    #[inline(always)]
    pub(super) fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline(always)]
    pub(super) fn set(&mut self, col: usize, row: usize, token: Token) {
        debug_assert!(col < self.ncols && row < self.nrows);
        self.tokens[col * self.nrows + row] = token;
    }

    #[inline(always)]
    pub(super) fn get(&self, col: usize, row: usize) -> Token {
        self.tokens[col * self.nrows + row]
    }

    /// The token column, one cell per row slot.
    pub(super) fn column(&self, col: usize) -> &[Token] {
        &self.tokens[col * self.nrows..][..self.nrows]
    }
}

/// The outcome of scanning one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Scan {
    /// The record was scanned; `pos` is the offset just past its terminator
    /// and `ncols` the number of fields recorded.
    Record { pos: usize, ncols: usize },
    /// A quoted field ran past the last buffered terminator. The caller must
    /// grow the buffer and retry the same record from the same position.
    NeedMore,
}

/// States of the field scanner. `Begin` starts each field; a record ends from
/// any non-quoted state via LF or CR.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Begin,
    Sign,
    Integer,
    IntegerSpace,
    Dot,
    PointFloat,
    Exponent,
    ExponentSign,
    ExponentFloat,
    SpecialFloat,
    String,
    StringSpace,
    FloatSpace,
    QuoteEnd,
    QuoteEndSpace,
}

/// Scans one record starting at `pos`, writing one token per field into row
/// `row` of the matrix. `lastnl` is the offset of the last complete record
/// terminator in `mem`; the scanner never reads past it except to classify a
/// CR+LF pair.
///
/// Scanning is a pure function of `(mem, pos)`: retrying the same record
/// after the buffer grows yields the same tokens.
pub(super) fn scan_record(
    mem: &[u8],
    pos: usize,
    lastnl: usize,
    tokens: &mut TokenMatrix,
    row: usize,
    line: u64,
    dialect: &Dialect,
) -> Result<Scan, ParseError> {
    let Dialect { delim, quot, trim } = *dialect;
    let limit = tokens.ncols();
    let mut c = 0usize;
    let mut state = State::Begin;
    let mut quoted = false;
    let mut qstring = false;
    let mut pending = 0u8;
    let mut tok_start = pos;
    let mut tok_end = pos;
    let mut sp_lit: &'static [u8] = b"";
    let mut sp_at = 0usize;
    let mut i = pos;

    macro_rules! kind_here {
        () => {
            close_kind(state, &mem[tok_start..tok_end], qstring, sp_lit, sp_at)
        };
    }
    macro_rules! record_token {
        ($kind:expr) => {{
            let kind = $kind;
            if c >= limit {
                return Err(ParseError::new(ParseErrorKind::TooManyColumns { limit }, line));
            }
            tokens.set(c, row, Token::new(kind, tok_start, tok_end - tok_start));
            c += 1;
        }};
    }
    macro_rules! end_field {
        ($kind:expr) => {{
            record_token!($kind);
            state = State::Begin;
            quoted = false;
            qstring = false;
            pending = 0;
            tok_start = i + 1;
            tok_end = i + 1;
        }};
    }
    macro_rules! end_record {
        ($kind:expr) => {{
            record_token!($kind);
            let next = i + 1;
            let pos = if mem[i] == b'\r' && next < mem.len() && mem[next] == b'\n' {
                next + 1
            } else {
                next
            };
            return Ok(Scan::Record { pos, ncols: c });
        }};
    }
    // Any byte that is not special in the current state is string content.
    // The macros read the byte back through `mem[i]`: fn-local macros only
    // see bindings that already exist where they are defined.
    macro_rules! string_content {
        () => {
            match mem[i] {
                0x21..=0x7e | b'\t' | b' ' => {
                    tok_end = i + 1;
                    state = State::String;
                }
                b'\n' | b'\r' if quoted => {
                    tok_end = i + 1;
                    state = State::String;
                }
                0xc0..=0xf7 => {
                    let end = scan_utf8(mem, i, line)?;
                    tok_end = end + 1;
                    state = State::String;
                    i = end;
                }
                0x80..=0xbf | 0xf8..=0xff => {
                    return Err(ParseError::new(ParseErrorKind::InvalidUtf8, line));
                }
                other => {
                    return Err(ParseError::new(ParseErrorKind::UnexpectedByte(other), line));
                }
            }
        };
    }
    // First content byte of a field, quoted or not.
    macro_rules! begin_content {
        () => {
            match mem[i] {
                b'0'..=b'9' => {
                    tok_end = i + 1;
                    state = State::Integer;
                }
                b'+' | b'-' => {
                    tok_end = i + 1;
                    state = State::Sign;
                }
                b'.' => {
                    tok_end = i + 1;
                    state = State::Dot;
                }
                b'n' | b'N' => {
                    tok_end = i + 1;
                    sp_lit = b"nan";
                    sp_at = 1;
                    state = State::SpecialFloat;
                }
                b'i' | b'I' => {
                    tok_end = i + 1;
                    sp_lit = b"infinity";
                    sp_at = 1;
                    state = State::SpecialFloat;
                }
                _ => string_content!(),
            }
        };
    }
    // A quote inside a quoted field: an embedded escape when doubled,
    // otherwise the closing quote. Content never sits on `lastnl` (that byte
    // is a terminator), so peeking one ahead stays in bounds.
    macro_rules! quote_in_quoted {
        () => {
            if mem[i + 1] == quot {
                qstring = true;
                tok_end = i + 2;
                state = State::String;
                i += 1;
            } else {
                pending = kind_here!();
                quoted = false;
                state = State::QuoteEnd;
            }
        };
    }

    while i <= lastnl {
        let b = mem[i];
        match state {
            State::Begin => {
                if quoted {
                    if b == quot {
                        // Quoted-empty field; missing unless the quote
                        // reopens.
                        pending = Token::MISSING;
                        quoted = false;
                        state = State::QuoteEnd;
                    } else {
                        begin_content!();
                    }
                } else if b == delim {
                    end_field!(Token::MISSING);
                } else if b == b'\n' || b == b'\r' {
                    end_record!(Token::MISSING);
                } else if b == quot {
                    quoted = true;
                    tok_start = i + 1;
                    tok_end = i + 1;
                } else if trim && b == b' ' {
                    tok_start = i + 1;
                    tok_end = i + 1;
                } else {
                    begin_content!();
                }
            }
            State::Sign => {
                if quoted && b == quot {
                    quote_in_quoted!();
                } else if !quoted && b == delim {
                    end_field!(kind_here!());
                } else if !quoted && (b == b'\n' || b == b'\r') {
                    end_record!(kind_here!());
                } else if b.is_ascii_digit() {
                    tok_end = i + 1;
                    state = State::Integer;
                } else if b == b'.' {
                    tok_end = i + 1;
                    state = State::Dot;
                } else if b == b'n' || b == b'N' {
                    tok_end = i + 1;
                    sp_lit = b"nan";
                    sp_at = 1;
                    state = State::SpecialFloat;
                } else if b == b'i' || b == b'I' {
                    tok_end = i + 1;
                    sp_lit = b"infinity";
                    sp_at = 1;
                    state = State::SpecialFloat;
                } else if trim && !quoted && b == b' ' {
                    state = State::StringSpace;
                } else {
                    string_content!();
                }
            }
            State::Integer => {
                if quoted && b == quot {
                    quote_in_quoted!();
                } else if !quoted && b == delim {
                    end_field!(kind_here!());
                } else if !quoted && (b == b'\n' || b == b'\r') {
                    end_record!(kind_here!());
                } else if b.is_ascii_digit() {
                    tok_end = i + 1;
                } else if b == b'.' {
                    tok_end = i + 1;
                    state = State::PointFloat;
                } else if b == b'e' || b == b'E' {
                    tok_end = i + 1;
                    state = State::Exponent;
                } else if trim && !quoted && b == b' ' {
                    state = State::IntegerSpace;
                } else {
                    string_content!();
                }
            }
            State::Dot => {
                if quoted && b == quot {
                    quote_in_quoted!();
                } else if !quoted && b == delim {
                    end_field!(kind_here!());
                } else if !quoted && (b == b'\n' || b == b'\r') {
                    end_record!(kind_here!());
                } else if b.is_ascii_digit() {
                    tok_end = i + 1;
                    state = State::PointFloat;
                } else if trim && !quoted && b == b' ' {
                    state = State::StringSpace;
                } else {
                    string_content!();
                }
            }
            State::PointFloat => {
                if quoted && b == quot {
                    quote_in_quoted!();
                } else if !quoted && b == delim {
                    end_field!(kind_here!());
                } else if !quoted && (b == b'\n' || b == b'\r') {
                    end_record!(kind_here!());
                } else if b.is_ascii_digit() {
                    tok_end = i + 1;
                } else if b == b'e' || b == b'E' {
                    tok_end = i + 1;
                    state = State::Exponent;
                } else if trim && !quoted && b == b' ' {
                    state = State::FloatSpace;
                } else {
                    string_content!();
                }
            }
            State::Exponent => {
                if quoted && b == quot {
                    quote_in_quoted!();
                } else if !quoted && b == delim {
                    end_field!(kind_here!());
                } else if !quoted && (b == b'\n' || b == b'\r') {
                    end_record!(kind_here!());
                } else if b.is_ascii_digit() {
                    tok_end = i + 1;
                    state = State::ExponentFloat;
                } else if b == b'+' || b == b'-' {
                    tok_end = i + 1;
                    state = State::ExponentSign;
                } else if trim && !quoted && b == b' ' {
                    state = State::StringSpace;
                } else {
                    string_content!();
                }
            }
            State::ExponentSign => {
                if quoted && b == quot {
                    quote_in_quoted!();
                } else if !quoted && b == delim {
                    end_field!(kind_here!());
                } else if !quoted && (b == b'\n' || b == b'\r') {
                    end_record!(kind_here!());
                } else if b.is_ascii_digit() {
                    tok_end = i + 1;
                    state = State::ExponentFloat;
                } else if trim && !quoted && b == b' ' {
                    state = State::StringSpace;
                } else {
                    string_content!();
                }
            }
            State::ExponentFloat => {
                if quoted && b == quot {
                    quote_in_quoted!();
                } else if !quoted && b == delim {
                    end_field!(kind_here!());
                } else if !quoted && (b == b'\n' || b == b'\r') {
                    end_record!(kind_here!());
                } else if b.is_ascii_digit() {
                    tok_end = i + 1;
                } else if trim && !quoted && b == b' ' {
                    state = State::FloatSpace;
                } else {
                    string_content!();
                }
            }
            State::SpecialFloat => {
                if quoted && b == quot {
                    quote_in_quoted!();
                } else if !quoted && b == delim {
                    end_field!(kind_here!());
                } else if !quoted && (b == b'\n' || b == b'\r') {
                    end_record!(kind_here!());
                } else if sp_at < sp_lit.len() && b.eq_ignore_ascii_case(&sp_lit[sp_at]) {
                    sp_at += 1;
                    tok_end = i + 1;
                } else if trim && !quoted && b == b' ' {
                    state = if special_complete(sp_lit, sp_at) {
                        State::FloatSpace
                    } else {
                        State::StringSpace
                    };
                } else {
                    string_content!();
                }
            }
            State::String => {
                if quoted && b == quot {
                    quote_in_quoted!();
                } else if !quoted && b == delim {
                    end_field!(kind_here!());
                } else if !quoted && (b == b'\n' || b == b'\r') {
                    end_record!(kind_here!());
                } else if trim && !quoted && b == b' ' {
                    state = State::StringSpace;
                } else {
                    string_content!();
                }
            }
            State::IntegerSpace | State::FloatSpace | State::StringSpace => {
                if b == b' ' {
                    // consume trailing spaces
                } else if b == delim {
                    end_field!(kind_here!());
                } else if b == b'\n' || b == b'\r' {
                    end_record!(kind_here!());
                } else {
                    string_content!();
                }
            }
            State::QuoteEnd => {
                if b == delim {
                    end_field!(pending);
                } else if b == b'\n' || b == b'\r' {
                    end_record!(pending);
                } else if b == quot {
                    // Reopen: the closing quote was the first half of an
                    // embedded escape.
                    quoted = true;
                    qstring = true;
                    tok_end = i + 1;
                    state = State::String;
                } else if trim && b == b' ' {
                    state = State::QuoteEndSpace;
                } else {
                    return Err(ParseError::new(ParseErrorKind::AfterQuote(b), line));
                }
            }
            State::QuoteEndSpace => {
                if b == b' ' {
                    // consume trailing spaces
                } else if b == delim {
                    end_field!(pending);
                } else if b == b'\n' || b == b'\r' {
                    end_record!(pending);
                } else {
                    return Err(ParseError::new(ParseErrorKind::AfterQuote(b), line));
                }
            }
        }
        i += 1;
    }

    // Still inside the record at the buffered tail: a quoted field spans past
    // `lastnl`.
    Ok(Scan::NeedMore)
}

/// The candidate-kind bits of a field closed in the given state.
fn close_kind(state: State, bytes: &[u8], qstring: bool, sp_lit: &[u8], sp_at: usize) -> u8 {
    let q = if qstring { KIND_QUOTED } else { 0 };
    match state {
        State::Integer | State::IntegerSpace => KIND_INTEGER | KIND_FLOAT | q,
        State::PointFloat | State::ExponentFloat | State::FloatSpace => KIND_FLOAT | q,
        State::SpecialFloat if special_complete(sp_lit, sp_at) => KIND_FLOAT | q,
        State::String | State::StringSpace => bool_kind(bytes) | q,
        // Sign, Dot, Exponent, ExponentSign, and incomplete special floats
        // are plain strings.
        _ => q,
    }
}

/// Whether the matched prefix of `nan`/`infinity` is one of the accepted
/// literals (`nan`, `inf`, `infinity`).
fn special_complete(sp_lit: &[u8], sp_at: usize) -> bool {
    sp_at == sp_lit.len() || (sp_lit.len() == 8 && sp_at == 3)
}

fn bool_kind(bytes: &[u8]) -> u8 {
    let is_bool = bytes.eq_ignore_ascii_case(b"true")
        || bytes.eq_ignore_ascii_case(b"false")
        || bytes.eq_ignore_ascii_case(b"t")
        || bytes.eq_ignore_ascii_case(b"f");
    if is_bool {
        KIND_BOOLEAN
    } else {
        0
    }
}

/// Validates the continuation bytes of a multi-byte sequence and returns the
/// offset of its last byte.
fn scan_utf8(mem: &[u8], i: usize, line: u64) -> Result<usize, ParseError> {
    let need = match mem[i] {
        0xc0..=0xdf => 1,
        0xe0..=0xef => 2,
        0xf0..=0xf7 => 3,
        _ => unreachable!("not a lead byte"),
    };
    if i + need >= mem.len() {
        return Err(ParseError::new(ParseErrorKind::InvalidUtf8, line));
    }
    for k in 1..=need {
        if !matches!(mem[i + k], 0x80..=0xbf) {
            return Err(ParseError::new(ParseErrorKind::InvalidUtf8, line));
        }
    }
    Ok(i + need)
}

/// Scans the header record starting at `pos`. The same byte machine as
/// [`scan_record`], restricted to string fields: no numeric classification,
/// and quoted names must not span lines. Returns the offset just past the
/// terminator and the header tokens in order.
pub(super) fn scan_header(
    mem: &[u8],
    pos: usize,
    lastnl: usize,
    line: u64,
    dialect: &Dialect,
) -> Result<(usize, Vec<Token>), ParseError> {
    let Dialect { delim, quot, trim } = *dialect;
    let mut names = Vec::new();
    let mut state = State::Begin;
    let mut quoted = false;
    let mut qstring = false;
    let mut pending_missing = false;
    let mut tok_start = pos;
    let mut tok_end = pos;
    let mut i = pos;

    macro_rules! push_name {
        () => {{
            let missing = tok_start == tok_end
                && (pending_missing || !matches!(state, State::QuoteEnd | State::QuoteEndSpace));
            let kind = if missing {
                Token::MISSING
            } else if qstring {
                KIND_QUOTED
            } else {
                0
            };
            names.push(Token::new(kind, tok_start, tok_end - tok_start));
        }};
    }
    macro_rules! end_field {
        () => {{
            push_name!();
            state = State::Begin;
            quoted = false;
            qstring = false;
            pending_missing = false;
            tok_start = i + 1;
            tok_end = i + 1;
        }};
    }
    macro_rules! end_record {
        () => {{
            push_name!();
            let next = i + 1;
            let pos = if mem[i] == b'\r' && next < mem.len() && mem[next] == b'\n' {
                next + 1
            } else {
                next
            };
            return Ok((pos, names));
        }};
    }
    macro_rules! string_content {
        () => {
            match mem[i] {
                0x21..=0x7e | b'\t' | b' ' => {
                    tok_end = i + 1;
                    state = State::String;
                }
                0xc0..=0xf7 => {
                    let end = scan_utf8(mem, i, line)?;
                    tok_end = end + 1;
                    state = State::String;
                    i = end;
                }
                0x80..=0xbf | 0xf8..=0xff => {
                    return Err(ParseError::new(ParseErrorKind::InvalidUtf8, line));
                }
                other => {
                    return Err(ParseError::new(ParseErrorKind::UnexpectedByte(other), line));
                }
            }
        };
    }

    while i <= lastnl {
        let b = mem[i];
        match state {
            State::Begin => {
                if quoted {
                    if b == quot {
                        pending_missing = true;
                        quoted = false;
                        state = State::QuoteEnd;
                    } else if b == b'\n' || b == b'\r' {
                        return Err(ParseError::new(ParseErrorKind::MultilineHeader, line));
                    } else {
                        string_content!();
                    }
                } else if b == delim {
                    end_field!();
                } else if b == b'\n' || b == b'\r' {
                    end_record!();
                } else if b == quot {
                    quoted = true;
                    tok_start = i + 1;
                    tok_end = i + 1;
                } else if trim && b == b' ' {
                    tok_start = i + 1;
                    tok_end = i + 1;
                } else {
                    string_content!();
                }
            }
            State::String => {
                if quoted && b == quot {
                    if mem[i + 1] == quot {
                        qstring = true;
                        tok_end = i + 2;
                        i += 1;
                    } else {
                        quoted = false;
                        state = State::QuoteEnd;
                    }
                } else if quoted && (b == b'\n' || b == b'\r') {
                    return Err(ParseError::new(ParseErrorKind::MultilineHeader, line));
                } else if !quoted && b == delim {
                    end_field!();
                } else if !quoted && (b == b'\n' || b == b'\r') {
                    end_record!();
                } else if trim && !quoted && b == b' ' {
                    state = State::StringSpace;
                } else {
                    string_content!();
                }
            }
            State::StringSpace => {
                if b == b' ' {
                    // consume trailing spaces
                } else if b == delim {
                    end_field!();
                } else if b == b'\n' || b == b'\r' {
                    end_record!();
                } else {
                    string_content!();
                }
            }
            State::QuoteEnd => {
                if b == delim {
                    end_field!();
                } else if b == b'\n' || b == b'\r' {
                    end_record!();
                } else if b == quot {
                    quoted = true;
                    qstring = true;
                    pending_missing = false;
                    tok_end = i + 1;
                    state = State::String;
                } else if trim && b == b' ' {
                    state = State::QuoteEndSpace;
                } else {
                    return Err(ParseError::new(ParseErrorKind::AfterQuote(b), line));
                }
            }
            State::QuoteEndSpace => {
                if b == b' ' {
                    // consume trailing spaces
                } else if b == delim {
                    end_field!();
                } else if b == b'\n' || b == b'\r' {
                    end_record!();
                } else {
                    return Err(ParseError::new(ParseErrorKind::AfterQuote(b), line));
                }
            }
            _ => unreachable!("numeric state in header scan"),
        }
        i += 1;
    }

    Err(ParseError::new(ParseErrorKind::MultilineHeader, line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::token::KIND_BOOLEAN as BOOL;
    use crate::read::token::KIND_FLOAT as FLOAT;
    use crate::read::token::KIND_INTEGER as INT;
    use crate::read::token::KIND_QUOTED as QUOTED;

    fn csv() -> Dialect {
        Dialect {
            delim: b',',
            quot: b'"',
            trim: true,
        }
    }

    fn lastnl(mem: &[u8]) -> usize {
        memchr::memrchr2(b'\n', b'\r', mem).unwrap()
    }

    fn scan(mem: &[u8], ncols: usize) -> (Scan, TokenMatrix) {
        let mut tokens = TokenMatrix::new(ncols, 4);
        let scan = scan_record(mem, 0, lastnl(mem), &mut tokens, 0, 1, &csv()).unwrap();
        (scan, tokens)
    }

    fn field(mem: &[u8], tokens: &TokenMatrix, col: usize) -> (u8, Vec<u8>) {
        let t = tokens.get(col, 0);
        let (start, len) = t.location();
        (t.kind(), mem[start..start + len].to_vec())
    }

    #[test]
    fn numeric_candidates() {
        let mem = b"1,-2.5,3e4,+7,.5,5.\n";
        let (scan, tokens) = scan(mem, 6);
        assert_eq!(scan, Scan::Record { pos: mem.len(), ncols: 6 });
        assert_eq!(field(mem, &tokens, 0), (INT | FLOAT, b"1".to_vec()));
        assert_eq!(field(mem, &tokens, 1), (FLOAT, b"-2.5".to_vec()));
        assert_eq!(field(mem, &tokens, 2), (FLOAT, b"3e4".to_vec()));
        assert_eq!(field(mem, &tokens, 3), (INT | FLOAT, b"+7".to_vec()));
        assert_eq!(field(mem, &tokens, 4), (FLOAT, b".5".to_vec()));
        assert_eq!(field(mem, &tokens, 5), (FLOAT, b"5.".to_vec()));
    }

    #[test]
    fn incomplete_numbers_are_strings() {
        let mem = b"+,.,1e,1e+,nai\n";
        let (scan, tokens) = scan(mem, 5);
        assert_eq!(scan, Scan::Record { pos: mem.len(), ncols: 5 });
        for col in 0..5 {
            assert_eq!(field(mem, &tokens, col).0, 0, "column {col}");
        }
    }

    #[test]
    fn special_floats() {
        let mem = b"NaN,-inf,Infinity,nan5\n";
        let (_, tokens) = scan(mem, 4);
        assert_eq!(field(mem, &tokens, 0).0, FLOAT);
        assert_eq!(field(mem, &tokens, 1).0, FLOAT);
        assert_eq!(field(mem, &tokens, 2).0, FLOAT);
        assert_eq!(field(mem, &tokens, 3), (0, b"nan5".to_vec()));
    }

    #[test]
    fn boolean_literals() {
        let mem = b"true,FALSE,t,F,trueish\n";
        let (_, tokens) = scan(mem, 5);
        assert_eq!(field(mem, &tokens, 0).0, BOOL);
        assert_eq!(field(mem, &tokens, 1).0, BOOL);
        assert_eq!(field(mem, &tokens, 2).0, BOOL);
        assert_eq!(field(mem, &tokens, 3).0, BOOL);
        assert_eq!(field(mem, &tokens, 4).0, 0);
    }

    #[test]
    fn missing_fields() {
        let mem = b",x,\n";
        let (scan, tokens) = scan(mem, 3);
        assert_eq!(scan, Scan::Record { pos: 4, ncols: 3 });
        assert!(tokens.get(0, 0).is_missing());
        assert!(!tokens.get(1, 0).is_missing());
        assert!(tokens.get(2, 0).is_missing());
    }

    #[test]
    fn quoted_empty_is_missing() {
        let mem = b"\"\",y\n";
        let (_, tokens) = scan(mem, 2);
        assert!(tokens.get(0, 0).is_missing());
        assert_eq!(field(mem, &tokens, 1), (0, b"y".to_vec()));
    }

    #[test]
    fn quoted_fields_and_escapes() {
        use bstr::ByteSlice;

        let mem = b"\"he said \"\"hi\"\"\",\"a,b\"\n";
        let (scan, tokens) = scan(mem, 2);
        assert_eq!(scan, Scan::Record { pos: mem.len(), ncols: 2 });
        let (kind, raw) = field(mem, &tokens, 0);
        assert_eq!(kind, QUOTED);
        assert_eq!(raw.as_bstr(), b"he said \"\"hi\"\"".as_bstr());
        let (kind, raw) = field(mem, &tokens, 1);
        assert_eq!(kind, 0);
        assert_eq!(raw.as_bstr(), b"a,b".as_bstr());
    }

    #[test]
    fn doubled_quotes_only() {
        let mem = b"\"\"\"\"\n";
        let (_, tokens) = scan(mem, 1);
        let (kind, raw) = field(mem, &tokens, 0);
        assert_eq!(kind, QUOTED);
        assert_eq!(raw, b"\"\"".to_vec());
    }

    #[test]
    fn trimming() {
        let mem = b"  7 ,  a b  , \"q\" \n";
        let (_, tokens) = scan(mem, 3);
        assert_eq!(field(mem, &tokens, 0), (INT | FLOAT, b"7".to_vec()));
        assert_eq!(field(mem, &tokens, 1), (0, b"a b".to_vec()));
        assert_eq!(field(mem, &tokens, 2), (0, b"q".to_vec()));
    }

    #[test]
    fn all_space_field_is_missing() {
        let mem = b"   ,1\n";
        let (_, tokens) = scan(mem, 2);
        assert!(tokens.get(0, 0).is_missing());
    }

    #[test]
    fn multibyte_content() {
        let mem = "caf\u{e9},2\n".as_bytes();
        let (_, tokens) = scan(mem, 2);
        let (kind, raw) = field(mem, &tokens, 0);
        assert_eq!(kind, 0);
        assert_eq!(raw, "caf\u{e9}".as_bytes().to_vec());
        assert_eq!(field(mem, &tokens, 1).0, INT | FLOAT);
    }

    #[test]
    fn truncated_multibyte_is_an_error() {
        let mem = b"\xc3,x\n";
        let mut tokens = TokenMatrix::new(2, 1);
        let err = scan_record(mem, 0, lastnl(mem), &mut tokens, 0, 3, &csv()).unwrap_err();
        assert_eq!(err, ParseError::new(ParseErrorKind::InvalidUtf8, 3));
    }

    #[test]
    fn record_terminators() {
        for (mem, pos) in [
            (&b"a,b\nrest"[..], 4),
            (&b"a,b\r\nrest"[..], 5),
            (&b"a,b\rrest"[..], 4),
        ] {
            let lastnl = memchr::memchr2(b'\n', b'\r', mem).unwrap();
            let mut tokens = TokenMatrix::new(2, 1);
            let scan = scan_record(mem, 0, lastnl, &mut tokens, 0, 1, &csv()).unwrap();
            assert_eq!(scan, Scan::Record { pos, ncols: 2 }, "{mem:?}");
        }
    }

    #[test]
    fn quoted_line_break_is_content() {
        let mem = b"\"a\nb\",c\n";
        let (scan, tokens) = scan(mem, 2);
        assert_eq!(scan, Scan::Record { pos: mem.len(), ncols: 2 });
        assert_eq!(field(mem, &tokens, 0), (0, b"a\nb".to_vec()));
    }

    #[test]
    fn quoted_field_past_buffer_requests_more() {
        let mem = b"\"abc\n";
        let (scan, _) = scan(mem, 1);
        assert_eq!(scan, Scan::NeedMore);
    }

    #[test]
    fn too_many_fields() {
        let mem = b"a,b,c\n";
        let mut tokens = TokenMatrix::new(2, 1);
        let err = scan_record(mem, 0, lastnl(mem), &mut tokens, 0, 7, &csv()).unwrap_err();
        assert_eq!(
            err,
            ParseError::new(ParseErrorKind::TooManyColumns { limit: 2 }, 7),
        );
    }

    #[test]
    fn junk_after_closing_quote() {
        let mem = b"\"a\"x\n";
        let mut tokens = TokenMatrix::new(1, 1);
        let err = scan_record(mem, 0, lastnl(mem), &mut tokens, 0, 1, &csv()).unwrap_err();
        assert_eq!(err, ParseError::new(ParseErrorKind::AfterQuote(b'x'), 1));
    }

    #[test]
    fn tab_delimited() {
        let mem = b"x\t-1\tz z\n";
        let dialect = Dialect {
            delim: b'\t',
            quot: b'"',
            trim: true,
        };
        let mut tokens = TokenMatrix::new(3, 1);
        let scan = scan_record(mem, 0, lastnl(mem), &mut tokens, 0, 1, &dialect).unwrap();
        assert_eq!(scan, Scan::Record { pos: mem.len(), ncols: 3 });
        assert_eq!(tokens.get(1, 0).kind(), INT | FLOAT);
    }

    #[test]
    fn header_names() {
        let mem = b"a, \"b,c\" ,,\"d\"\"e\"\n";
        let (pos, names) = scan_header(mem, 0, lastnl(mem), 1, &csv()).unwrap();
        assert_eq!(pos, mem.len());
        assert_eq!(names.len(), 4);
        let window = |i: usize| {
            let (start, len) = names[i].location();
            &mem[start..start + len]
        };
        assert_eq!(window(0), b"a");
        assert_eq!(window(1), b"b,c");
        assert!(names[2].is_missing());
        assert_eq!(window(3), b"d\"\"e");
        assert!(names[3].is_quoted());
    }

    #[test]
    fn header_rejects_multiline_names() {
        let mem = b"\"a\nb\",c\n";
        let err = scan_header(mem, 0, lastnl(mem), 1, &csv()).unwrap_err();
        assert_eq!(err, ParseError::new(ParseErrorKind::MultilineHeader, 1));
    }
}
