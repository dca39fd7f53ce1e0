// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of table-read, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use std::{str, sync::Arc};

use memchr::memchr;

use crate::{
    read::{
        cache::StrCache,
        scanner::{ParseError, ParseErrorKind},
        token::Token,
    },
    table::Column,
};

/// Widest digit run that cannot overflow an `i64` in the fast accumulator.
const MAX_FAST_DIGITS: usize = 18;

/// Appends `n_values` parsed values to the column, reading each token's
/// window out of `mem`. `first_line` is the line number of row 0, for error
/// reporting.
pub(super) fn fill_column(
    column: &mut Column,
    n_values: usize,
    mem: &[u8],
    tokens: &[Token],
    quot: u8,
    cache: &mut StrCache,
    first_line: u64,
) -> Result<(), ParseError> {
    let tokens = &tokens[..n_values];
    match column {
        Column::Int(values) => {
            for (r, &t) in tokens.iter().enumerate() {
                values.push(parse_int(mem, t, first_line + r as u64)?);
            }
        }
        Column::OptInt(values) => {
            for (r, &t) in tokens.iter().enumerate() {
                if t.is_missing() {
                    values.push(None);
                } else {
                    values.push(Some(parse_int(mem, t, first_line + r as u64)?));
                }
            }
        }
        Column::Float(values) => {
            for &t in tokens {
                values.push(parse_float(mem, t));
            }
        }
        Column::OptFloat(values) => {
            for &t in tokens {
                if t.is_missing() {
                    values.push(None);
                } else {
                    values.push(Some(parse_float(mem, t)));
                }
            }
        }
        Column::Bool(values) => {
            for &t in tokens {
                values.push(parse_bool(mem, t));
            }
        }
        Column::OptBool(values) => {
            for &t in tokens {
                if t.is_missing() {
                    values.push(None);
                } else {
                    values.push(Some(parse_bool(mem, t)));
                }
            }
        }
        Column::Str(values) => {
            for (r, &t) in tokens.iter().enumerate() {
                values.push(materialize(mem, t, quot, cache, first_line + r as u64)?);
            }
        }
        Column::OptStr(values) => {
            for (r, &t) in tokens.iter().enumerate() {
                if t.is_missing() {
                    values.push(None);
                } else {
                    values.push(Some(materialize(mem, t, quot, cache, first_line + r as u64)?));
                }
            }
        }
        Column::Date(_) | Column::OptDate(_) | Column::DateTime(_) | Column::OptDateTime(_) => {
            unreachable!("date columns are created by the post-pass")
        }
    }
    Ok(())
}

/// Base-10 accumulation with an optional leading sign. Digit runs wider than
/// the fast path go through the full parser, which reports overflow.
fn parse_int(mem: &[u8], t: Token, line: u64) -> Result<i64, ParseError> {
    let (start, len) = t.location();
    let bytes = &mem[start..start + len];
    let (negative, digits) = match bytes.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some((b'+', rest)) => (false, rest),
        _ => (false, bytes),
    };
    if digits.len() <= MAX_FAST_DIGITS {
        let mut value: i64 = 0;
        for &b in digits {
            value = value * 10 + i64::from(b - b'0');
        }
        Ok(if negative { -value } else { value })
    } else {
        // SAFETY: integer-classified tokens contain only ASCII bytes.
        let s = unsafe { str::from_utf8_unchecked(bytes) };
        s.parse()
            .map_err(|_| ParseError::new(ParseErrorKind::IntegerOverflow, line))
    }
}

fn parse_float(mem: &[u8], t: Token) -> f64 {
    let (start, len) = t.location();
    let bytes = &mem[start..start + len];
    // SAFETY: float-classified tokens contain only ASCII bytes.
    let s = unsafe { str::from_utf8_unchecked(bytes) };
    // The scanner admits a strict subset of the std float grammar, including
    // NaN/Inf/Infinity in any case, so the parse cannot fail.
    s.parse().unwrap_or(f64::NAN)
}

fn parse_bool(mem: &[u8], t: Token) -> bool {
    let (start, _) = t.location();
    // Only `true`/`false`/`t`/`f` reach this path; the first letter decides.
    matches!(mem[start], b't' | b'T')
}

fn materialize(
    mem: &[u8],
    t: Token,
    quot: u8,
    cache: &mut StrCache,
    line: u64,
) -> Result<Arc<str>, ParseError> {
    let (start, len) = t.location();
    let bytes = &mem[start..start + len];
    if t.is_quoted() {
        let unescaped = unquote(bytes, quot);
        let s = str::from_utf8(&unescaped)
            .map_err(|_| ParseError::new(ParseErrorKind::InvalidUtf8, line))?;
        Ok(Arc::from(s))
    } else {
        let s = str::from_utf8(bytes)
            .map_err(|_| ParseError::new(ParseErrorKind::InvalidUtf8, line))?;
        Ok(cache.intern(s))
    }
}

/// Collapses doubled quotes: every quote byte is copied and the byte
/// immediately following it (its doubled mate) is skipped.
pub(super) fn unquote(bytes: &[u8], quot: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match memchr(quot, &bytes[i..]) {
            Some(j) => {
                let j = i + j;
                out.extend_from_slice(&bytes[i..=j]);
                i = j + 2;
            }
            None => {
                out.extend_from_slice(&bytes[i..]);
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::token::{KIND_FLOAT, KIND_INTEGER, KIND_QUOTED};

    fn token(kind: u8, mem: &[u8], needle: &[u8]) -> Token {
        let start = mem
            .windows(needle.len())
            .position(|w| w == needle)
            .expect("needle in mem");
        Token::new(kind, start, needle.len())
    }

    #[test]
    fn unquote_collapses_doubled_quotes() {
        assert_eq!(unquote(b"he said \"\"hi\"\"", b'"'), b"he said \"hi\"");
        assert_eq!(unquote(b"\"\"", b'"'), b"\"");
        assert_eq!(unquote(b"plain", b'"'), b"plain");
        assert_eq!(unquote(b"", b'"'), b"");
    }

    #[test]
    fn integer_fast_and_slow_paths() {
        let mem = b"42,-7,+0,000000000000000000012,9223372036854775807";
        let cases: [(&[u8], i64); 5] = [
            (b"42", 42),
            (b"-7", -7),
            (b"+0", 0),
            (b"000000000000000000012", 12),
            (b"9223372036854775807", i64::MAX),
        ];
        for (needle, expected) in cases {
            let t = token(KIND_INTEGER | KIND_FLOAT, mem, needle);
            assert_eq!(parse_int(mem, t, 1), Ok(expected), "{needle:?}");
        }
    }

    #[test]
    fn integer_overflow_is_reported() {
        let mem = b"9223372036854775808";
        let t = token(KIND_INTEGER | KIND_FLOAT, mem, mem);
        assert_eq!(
            parse_int(mem, t, 12),
            Err(ParseError::new(ParseErrorKind::IntegerOverflow, 12)),
        );
    }

    #[test]
    fn float_values_including_specials() {
        let mem = b"2.5,-1e3,NaN,-inf,Infinity,.5";
        let t = token(KIND_FLOAT, mem, b"2.5");
        assert_eq!(parse_float(mem, t), 2.5);
        let t = token(KIND_FLOAT, mem, b"-1e3");
        assert_eq!(parse_float(mem, t), -1000.0);
        let t = token(KIND_FLOAT, mem, b"NaN");
        assert!(parse_float(mem, t).is_nan());
        let t = token(KIND_FLOAT, mem, b"-inf");
        assert_eq!(parse_float(mem, t), f64::NEG_INFINITY);
        let t = token(KIND_FLOAT, mem, b"Infinity");
        assert_eq!(parse_float(mem, t), f64::INFINITY);
        let t = token(KIND_FLOAT, mem, b".5");
        assert_eq!(parse_float(mem, t), 0.5);
    }

    #[test]
    fn nullable_fill_propagates_missing() {
        let mem = b"1,,3";
        let tokens = [
            Token::new(KIND_INTEGER | KIND_FLOAT, 0, 1),
            Token::new(Token::MISSING, 2, 0),
            Token::new(KIND_INTEGER | KIND_FLOAT, 3, 1),
        ];
        let mut column = Column::OptInt(Vec::new());
        let mut cache = StrCache::new();
        fill_column(&mut column, 3, mem, &tokens, b'"', &mut cache, 1).unwrap();
        assert_eq!(column, Column::OptInt(vec![Some(1), None, Some(3)]));
    }

    #[test]
    fn quoted_strings_are_unescaped() {
        let mem = b"say \"\"hi\"\"";
        let tokens = [Token::new(KIND_QUOTED, 0, mem.len())];
        let mut column = Column::Str(Vec::new());
        let mut cache = StrCache::new();
        fill_column(&mut column, 1, mem, &tokens, b'"', &mut cache, 1).unwrap();
        assert_eq!(column, Column::Str(vec![Arc::from("say \"hi\"")]));
    }
}
