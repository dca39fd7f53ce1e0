// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of table-read, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

mod buffer;
mod cache;
mod driver;
mod fill;
mod infer;
mod scanner;
mod token;

use std::io;

use thiserror::Error;

use crate::options::ConfigError;

pub(crate) use driver::read_table;
pub use scanner::{ParseError, ParseErrorKind};
pub use token::TokenKind;

pub(crate) type RResult<T> = Result<T, ReadError>;

/// An error from reading a delimited stream, including IO errors.
#[derive(Debug, Error)]
pub enum ReadError {
    /// An invalid option combination, raised before any I/O.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A malformed record or header.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A later chunk contradicted the column type inferred from the first
    /// chunk.
    #[error(
        "type guess for column {column:?} failed in a later chunk; \
         increase chunksize or set chunksize = 0 to infer from the whole input"
    )]
    TypeGuess { column: String },
    /// URL sources are fetched through an external downloader, and none was
    /// found on PATH.
    #[error("no downloader found for URL input (tried curl and wget)")]
    MissingDownloader,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<ReadError> for io::Error {
    #[inline]
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::Io(err) => err,
            err @ (ReadError::Config(_) | ReadError::TypeGuess { .. }) => {
                io::Error::new(io::ErrorKind::InvalidInput, err.to_string())
            }
            err => io::Error::new(io::ErrorKind::InvalidData, err.to_string()),
        }
    }
}
