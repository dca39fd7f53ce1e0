// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of table-read, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use thiserror::Error;

/// Options for reading a delimited stream. The delimiter itself is supplied
/// by the entry point ([`read_delim`](crate::read_delim) takes it explicitly;
/// [`read_csv`](crate::read_csv) and [`read_tsv`](crate::read_tsv) fix it).
#[derive(Clone, Debug)]
pub struct ReadOptions {
    /// The quote byte. Defaults to `"`.
    pub quot: u8,
    /// Trim ASCII spaces around unquoted fields. Defaults to true.
    pub trim: bool,
    /// Number of leading lines to discard before the header. Defaults to 0.
    pub skip: u64,
    /// Explicit column names. When set, no header line is consumed from the
    /// stream. Defaults to none.
    pub colnames: Option<Vec<String>>,
    /// Target refill size of the rolling buffer in bytes. `0` disables
    /// chunking and reads the whole decompressed stream into memory.
    /// Defaults to 1 MiB.
    pub chunksize: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            quot: b'"',
            trim: true,
            skip: 0,
            colnames: None,
            chunksize: 1 << 20,
        }
    }
}

/// An invalid combination of reader options. Raised before any I/O.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Hash)]
pub enum ConfigError {
    #[error("delimiter and quote are the same byte")]
    DelimIsQuote,
    /// Delimiters may be TAB or any printable ASCII byte that is not a letter
    /// or digit.
    #[error("byte {0:#04x} is not allowed as a delimiter")]
    InvalidDelim(u8),
    /// Quotes may be any printable ASCII byte that is not a letter or digit.
    #[error("byte {0:#04x} is not allowed as a quote")]
    InvalidQuote(u8),
    #[error("cannot trim spaces when the delimiter is a space")]
    TrimSpaceDelim,
    #[error("cannot trim spaces when the quote is a space")]
    TrimSpaceQuote,
    #[error("chunk size {0} is too large (must be less than 2^36)")]
    ChunkSizeTooLarge(usize),
}

/// The three scanning parameters threaded through the tokenizer.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Dialect {
    pub(crate) delim: u8,
    pub(crate) quot: u8,
    pub(crate) trim: bool,
}

const fn allowed_quote(b: u8) -> bool {
    matches!(b, 0x20..=0x7e) && !b.is_ascii_alphanumeric()
}

const fn allowed_delim(b: u8) -> bool {
    b == b'\t' || allowed_quote(b)
}

impl ReadOptions {
    /// Checks this option set against the given delimiter and packages the
    /// scanning parameters.
    pub(crate) fn dialect(&self, delim: u8) -> Result<Dialect, ConfigError> {
        if delim == self.quot {
            return Err(ConfigError::DelimIsQuote);
        }
        if !allowed_delim(delim) {
            return Err(ConfigError::InvalidDelim(delim));
        }
        if !allowed_quote(self.quot) {
            return Err(ConfigError::InvalidQuote(self.quot));
        }
        if self.trim && delim == b' ' {
            return Err(ConfigError::TrimSpaceDelim);
        }
        if self.trim && self.quot == b' ' {
            return Err(ConfigError::TrimSpaceQuote);
        }
        if self.chunksize as u64 >= 1 << 36 {
            return Err(ConfigError::ChunkSizeTooLarge(self.chunksize));
        }
        Ok(Dialect {
            delim,
            quot: self.quot,
            trim: self.trim,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(delim: u8, options: &ReadOptions) -> Result<(), ConfigError> {
        options.dialect(delim).map(|_| ())
    }

    #[test]
    fn default_csv_and_tsv_dialects() {
        let options = ReadOptions::default();
        assert_eq!(validate(b',', &options), Ok(()));
        assert_eq!(validate(b'\t', &options), Ok(()));
        assert_eq!(validate(b';', &options), Ok(()));
        assert_eq!(validate(b'|', &options), Ok(()));
    }

    #[test]
    fn rejects_letters_and_digits() {
        let options = ReadOptions::default();
        assert_eq!(validate(b'a', &options), Err(ConfigError::InvalidDelim(b'a')));
        assert_eq!(validate(b'7', &options), Err(ConfigError::InvalidDelim(b'7')));
        let options = ReadOptions {
            quot: b'Q',
            ..ReadOptions::default()
        };
        assert_eq!(validate(b',', &options), Err(ConfigError::InvalidQuote(b'Q')));
    }

    #[test]
    fn rejects_delim_equal_to_quote() {
        let options = ReadOptions {
            quot: b',',
            ..ReadOptions::default()
        };
        assert_eq!(validate(b',', &options), Err(ConfigError::DelimIsQuote));
    }

    #[test]
    fn tab_is_a_delimiter_but_not_a_quote() {
        let options = ReadOptions {
            quot: b'\t',
            ..ReadOptions::default()
        };
        assert_eq!(validate(b',', &options), Err(ConfigError::InvalidQuote(b'\t')));
    }

    #[test]
    fn space_conflicts_with_trimming() {
        let trim = ReadOptions::default();
        assert_eq!(validate(b' ', &trim), Err(ConfigError::TrimSpaceDelim));
        let no_trim = ReadOptions {
            trim: false,
            ..ReadOptions::default()
        };
        assert_eq!(validate(b' ', &no_trim), Ok(()));
        let space_quote = ReadOptions {
            quot: b' ',
            ..ReadOptions::default()
        };
        assert_eq!(validate(b',', &space_quote), Err(ConfigError::TrimSpaceQuote));
    }

    #[test]
    fn chunk_size_ceiling() {
        let options = ReadOptions {
            chunksize: 1 << 36,
            ..ReadOptions::default()
        };
        assert_eq!(
            validate(b',', &options),
            Err(ConfigError::ChunkSizeTooLarge(1 << 36)),
        );
    }
}
