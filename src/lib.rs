// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of table-read, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! Streaming reader for delimited text (CSV, TSV, and friends) producing a
//! typed, columnar [`Table`].
//!
//! Bytes flow from a [`Source`] (local file, URL, subprocess output, or any
//! stream) through transparent gzip/zstd/xz framing into a rolling buffer. A
//! byte-level state machine scans one record at a time into packed token
//! descriptors, per-column candidate sets are intersected to infer types
//! (integer, float, boolean, string, each optionally nullable), and columns
//! are materialized chunk by chunk. A post-pass converts string columns that
//! look like dates or datetimes.

mod options;
mod read;
mod source;
mod table;

pub use crate::{
    options::{ConfigError, ReadOptions},
    read::{ParseError, ParseErrorKind, ReadError, TokenKind},
    source::Source,
    table::{Column, Table},
};

/// Reads a delimited stream with an explicit delimiter byte.
pub fn read_delim(
    source: impl Into<Source>,
    delim: u8,
    options: &ReadOptions,
) -> Result<Table, ReadError> {
    read::read_table(source.into(), delim, options)
}

/// Reads comma-separated input.
pub fn read_csv(source: impl Into<Source>, options: &ReadOptions) -> Result<Table, ReadError> {
    read_delim(source, b',', options)
}

/// Reads tab-separated input.
pub fn read_tsv(source: impl Into<Source>, options: &ReadOptions) -> Result<Table, ReadError> {
    read_delim(source, b'\t', options)
}
