// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of table-read, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use std::sync::{Arc, OnceLock};

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use tracing::debug;

use crate::{
    read::{
        scanner::TokenMatrix,
        token::{KIND_BOOLEAN, KIND_CANDIDATES, KIND_FLOAT, KIND_INTEGER, KIND_MISSING_BIT},
    },
    table::Column,
};

/// Folds the kind bits of the chunk's scanned rows into one classification
/// byte per column: the low four bits are the running intersection of
/// non-missing candidate sets, bit 4 is a sticky saw-a-missing flag.
///
/// Missing tokens carry all candidate bits underneath the missing bit, so the
/// fold is a branch-free intersection.
pub(super) fn aggregate(tokens: &TokenMatrix, nrows: usize) -> Vec<u8> {
    (0..tokens.ncols())
        .map(|c| {
            let mut y = KIND_CANDIDATES;
            for r in 0..nrows {
                let x = tokens.get(c, r).kind();
                y = (x & y & KIND_CANDIDATES) | ((x | y) & KIND_MISSING_BIT);
            }
            y
        })
        .collect()
}

/// Picks the concrete column type for a first-chunk classification, in
/// priority order Int, Float, Bool, String, wrapped in the nullable form when
/// the chunk saw missings.
///
/// A column whose first chunk is entirely missing keeps every candidate bit;
/// no real token carries all four candidates at once, so that pattern means
/// "no evidence" and decays to nullable String. Later chunks cannot promote
/// it back to a numeric type.
pub(super) fn new_column(class: u8) -> Column {
    let missing = class & KIND_MISSING_BIT != 0;
    let candidates = class & KIND_CANDIDATES;
    let base = if candidates == KIND_CANDIDATES && missing {
        Column::Str(Vec::new())
    } else if candidates & KIND_INTEGER != 0 {
        Column::Int(Vec::new())
    } else if candidates & KIND_FLOAT != 0 {
        Column::Float(Vec::new())
    } else if candidates & KIND_BOOLEAN != 0 {
        Column::Bool(Vec::new())
    } else {
        Column::Str(Vec::new())
    };
    if missing {
        base.into_nullable()
    } else {
        base
    }
}

/// Whether a later chunk's classification still admits the column's concrete
/// type. The first-chunk choice is never changed, only widened to nullable.
pub(super) fn admissible(column: &Column, class: u8) -> bool {
    match column {
        Column::Int(_) | Column::OptInt(_) => class & KIND_INTEGER != 0,
        Column::Float(_) | Column::OptFloat(_) => class & KIND_FLOAT != 0,
        Column::Bool(_) | Column::OptBool(_) => class & KIND_BOOLEAN != 0,
        Column::Str(_) | Column::OptStr(_) => true,
        Column::Date(_) | Column::OptDate(_) | Column::DateTime(_) | Column::OptDateTime(_) => {
            unreachable!("date columns are created by the post-pass")
        }
    }
}

/// Values sampled from the head of a string column before attempting a date
/// conversion.
const DATE_SAMPLE: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shape {
    Date,
    DateTime,
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap())
}

fn datetime_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?$").unwrap())
}

/// Best-effort post-pass: converts string columns whose leading values look
/// like dates or datetimes, leaving the column untouched when any value
/// fails the strict parse.
pub(super) fn detect_dates(names: &[String], columns: &mut [Column]) {
    for (name, column) in names.iter().zip(columns.iter_mut()) {
        let converted = match column {
            Column::Str(values) => convert(values),
            Column::OptStr(values) => convert_nullable(values),
            _ => None,
        };
        if let Some(new) = converted {
            debug!(column = %name, to = new.type_name(), "detected temporal column");
            *column = new;
        }
    }
}

/// Sniffs the shape of the first few non-missing values. All sampled values
/// must agree, and an empty sample converts nothing.
fn sniff<'a>(values: impl Iterator<Item = &'a str>) -> Option<Shape> {
    let mut shape = None;
    for s in values.take(DATE_SAMPLE) {
        let this = if date_re().is_match(s) {
            Shape::Date
        } else if datetime_re().is_match(s) {
            Shape::DateTime
        } else {
            return None;
        };
        if *shape.get_or_insert(this) != this {
            return None;
        }
    }
    shape
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

fn convert(values: &[Arc<str>]) -> Option<Column> {
    match sniff(values.iter().map(|s| &**s))? {
        Shape::Date => values
            .iter()
            .map(|s| parse_date(s))
            .collect::<Option<Vec<_>>>()
            .map(Column::Date),
        Shape::DateTime => values
            .iter()
            .map(|s| parse_datetime(s))
            .collect::<Option<Vec<_>>>()
            .map(Column::DateTime),
    }
}

fn convert_nullable(values: &[Option<Arc<str>>]) -> Option<Column> {
    match sniff(values.iter().flatten().map(|s| &**s))? {
        Shape::Date => values
            .iter()
            .map(|v| match v {
                None => Some(None),
                Some(s) => parse_date(s).map(Some),
            })
            .collect::<Option<Vec<_>>>()
            .map(Column::OptDate),
        Shape::DateTime => values
            .iter()
            .map(|v| match v {
                None => Some(None),
                Some(s) => parse_datetime(s).map(Some),
            })
            .collect::<Option<Vec<_>>>()
            .map(Column::OptDateTime),
    }
}
