// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of table-read, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use std::{mem, str};

use memchr::memchr_iter;
use tracing::{debug, trace};

use crate::{
    options::ReadOptions,
    read::{
        buffer::InputBuffer,
        cache::StrCache,
        fill::{fill_column, unquote},
        infer::{admissible, aggregate, detect_dates, new_column},
        scanner::{scan_header, scan_record, ParseError, ParseErrorKind, Scan, TokenMatrix},
        token::{Token, KIND_MISSING_BIT},
        RResult, ReadError,
    },
    source::Source,
    table::{Column, Table},
};

/// Fewest rows the token matrix is dimensioned for, however short the first
/// buffer looks.
const MIN_CHUNK_ROWS: usize = 5;

/// Reads the whole source into a table: validates options, frames the
/// stream, scans the header, then tokenizes, infers, and materializes chunk
/// by chunk.
pub(crate) fn read_table(source: Source, delim: u8, options: &ReadOptions) -> RResult<Table> {
    let dialect = options.dialect(delim)?;
    let stream = source.open()?;
    let mut input = if options.chunksize == 0 {
        InputBuffer::slurp(stream)?
    } else {
        InputBuffer::new(stream, options.chunksize)
    };
    let mut line: u64 = 1;
    line += input.skip_lines(options.skip)?;

    // Column names: supplied, or scanned from the header line.
    let mut names = match &options.colnames {
        Some(user) => user.clone(),
        None => {
            let Some(lastnl) = input.buffer_lines()? else {
                return Err(ParseError::new(ParseErrorKind::NoColumnNames, line).into());
            };
            let (pos, header) = scan_header(input.mem(), 0, lastnl, line, &dialect)?;
            let mut names = header_names(input.mem(), &header, dialect.quot, line)?;
            if names.len() == 1 && names[0].is_empty() {
                return Err(ParseError::new(ParseErrorKind::NoColumnNames, line).into());
            }
            rename_unnamed(&mut names);
            input.advance(pos);
            line += 1;
            names
        }
    };
    debug!(ncols = names.len(), "header");

    // Peek the first data record with one extra token slot: one more field
    // than the header has columns means the data rows carry row labels in an
    // unnamed leading column.
    loop {
        let Some(lastnl) = input.buffer_lines()? else {
            // No data rows at all: an empty table of string columns.
            let columns = names.iter().map(|_| Column::Str(Vec::new())).collect();
            return Ok(Table::new(names, columns));
        };
        let mut peek = TokenMatrix::new(names.len() + 1, 1);
        match scan_record(input.mem(), 0, lastnl, &mut peek, 0, line, &dialect)? {
            Scan::Record { ncols, .. } => {
                if ncols == names.len() + 1 {
                    debug!("first data row is one field wider; adding a row-label column");
                    names.insert(0, String::from("UNNAMED_0"));
                }
                break;
            }
            Scan::NeedMore if input.eof() => {
                return Err(ParseError::new(ParseErrorKind::UnclosedQuote, line).into());
            }
            Scan::NeedMore => input.grow(),
        }
    }
    let ncols = names.len();

    // Dimension the matrix from the newline density of the current buffer.
    let chunk_rows = {
        let mem = input.mem();
        let mut newlines = memchr_iter(b'\n', mem).count();
        if newlines == 0 {
            newlines = memchr_iter(b'\r', mem).count();
        }
        newlines.max(MIN_CHUNK_ROWS)
    };
    trace!(chunk_rows, "token matrix dimensioned");

    let mut matrix = TokenMatrix::new(ncols, chunk_rows);
    let mut columns: Vec<Column> = Vec::new();
    let mut caches: Vec<StrCache> = (0..ncols).map(|_| StrCache::new()).collect();
    let mut first_chunk = true;

    loop {
        let Some(lastnl) = input.buffer_lines()? else {
            break;
        };
        let mem = input.mem();
        let mut pos = 0;
        let mut rows = 0;
        while rows < chunk_rows && pos <= lastnl {
            match scan_record(mem, pos, lastnl, &mut matrix, rows, line + rows as u64, &dialect)? {
                Scan::Record { pos: next, ncols: found } => {
                    if found != ncols {
                        return Err(ParseError::new(
                            ParseErrorKind::ColumnCount { expected: ncols, found },
                            line + rows as u64,
                        )
                        .into());
                    }
                    pos = next;
                    rows += 1;
                }
                Scan::NeedMore => break,
            }
        }
        if rows == 0 {
            // A single record outgrew the window. A quoted field still open
            // at EOF can never complete.
            if input.eof() {
                return Err(ParseError::new(ParseErrorKind::UnclosedQuote, line).into());
            }
            input.grow();
            continue;
        }

        let classes = aggregate(&matrix, rows);
        if first_chunk {
            columns = classes.iter().map(|&class| new_column(class)).collect();
            first_chunk = false;
            for (name, column) in names.iter().zip(&columns) {
                debug!(column = %name, ty = column.type_name(), "inferred");
            }
        } else {
            for (c, &class) in classes.iter().enumerate() {
                if !admissible(&columns[c], class) {
                    return Err(ReadError::TypeGuess {
                        column: names[c].clone(),
                    });
                }
                if class & KIND_MISSING_BIT != 0 && !columns[c].is_nullable() {
                    debug!(column = %names[c], "late missings; promoting to nullable");
                    let column = mem::replace(&mut columns[c], Column::Str(Vec::new()));
                    columns[c] = column.into_nullable();
                }
            }
        }
        for c in 0..ncols {
            fill_column(
                &mut columns[c],
                rows,
                mem,
                matrix.column(c),
                dialect.quot,
                &mut caches[c],
                line,
            )?;
        }
        trace!(rows, consumed = pos, "chunk materialized");
        line += rows as u64;
        input.advance(pos);
    }

    detect_dates(&names, &mut columns);
    Ok(Table::new(names, columns))
}

/// Materializes the header tokens into owned names; empty fields become
/// empty strings for [`rename_unnamed`] to fill in.
fn header_names(
    mem: &[u8],
    tokens: &[Token],
    quot: u8,
    line: u64,
) -> Result<Vec<String>, ParseError> {
    tokens
        .iter()
        .map(|t| {
            if t.is_missing() {
                return Ok(String::new());
            }
            let (start, len) = t.location();
            let bytes = &mem[start..start + len];
            if t.is_quoted() {
                String::from_utf8(unquote(bytes, quot))
                    .map_err(|_| ParseError::new(ParseErrorKind::InvalidUtf8, line))
            } else {
                str::from_utf8(bytes)
                    .map(str::to_owned)
                    .map_err(|_| ParseError::new(ParseErrorKind::InvalidUtf8, line))
            }
        })
        .collect()
}

/// Replaces empty names with `UNNAMED_{i}`. Idempotent: non-empty names,
/// including ones already of that shape, are left alone.
fn rename_unnamed(names: &mut [String]) {
    for (i, name) in names.iter_mut().enumerate() {
        if name.is_empty() {
            *name = format!("UNNAMED_{i}");
        }
    }
}
