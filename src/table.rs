// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of table-read, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

use chrono::{NaiveDate, NaiveDateTime};

/// A materialized column of one inferred type.
///
/// Each concrete type has a nullable form holding a tagged optional per
/// element; a column with any missing entries is materialized in the nullable
/// form, and once nullable it stays nullable.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Int(Vec<i64>),
    OptInt(Vec<Option<i64>>),
    Float(Vec<f64>),
    OptFloat(Vec<Option<f64>>),
    Bool(Vec<bool>),
    OptBool(Vec<Option<bool>>),
    Str(Vec<Arc<str>>),
    OptStr(Vec<Option<Arc<str>>>),
    Date(Vec<NaiveDate>),
    OptDate(Vec<Option<NaiveDate>>),
    DateTime(Vec<NaiveDateTime>),
    OptDateTime(Vec<Option<NaiveDateTime>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::OptInt(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::OptFloat(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::OptBool(v) => v.len(),
            Column::Str(v) => v.len(),
            Column::OptStr(v) => v.len(),
            Column::Date(v) => v.len(),
            Column::OptDate(v) => v.len(),
            Column::DateTime(v) => v.len(),
            Column::OptDateTime(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_nullable(&self) -> bool {
        matches!(
            self,
            Column::OptInt(_)
                | Column::OptFloat(_)
                | Column::OptBool(_)
                | Column::OptStr(_)
                | Column::OptDate(_)
                | Column::OptDateTime(_)
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Column::Int(_) => "Int64",
            Column::OptInt(_) => "Int64?",
            Column::Float(_) => "Float64",
            Column::OptFloat(_) => "Float64?",
            Column::Bool(_) => "Bool",
            Column::OptBool(_) => "Bool?",
            Column::Str(_) => "String",
            Column::OptStr(_) => "String?",
            Column::Date(_) => "Date",
            Column::OptDate(_) => "Date?",
            Column::DateTime(_) => "DateTime",
            Column::OptDateTime(_) => "DateTime?",
        }
    }

    /// Copies the column into its nullable form. A nullable column is
    /// returned unchanged.
    pub(crate) fn into_nullable(self) -> Column {
        match self {
            Column::Int(v) => Column::OptInt(v.into_iter().map(Some).collect()),
            Column::Float(v) => Column::OptFloat(v.into_iter().map(Some).collect()),
            Column::Bool(v) => Column::OptBool(v.into_iter().map(Some).collect()),
            Column::Str(v) => Column::OptStr(v.into_iter().map(Some).collect()),
            Column::Date(v) => Column::OptDate(v.into_iter().map(Some).collect()),
            Column::DateTime(v) => Column::OptDateTime(v.into_iter().map(Some).collect()),
            nullable => nullable,
        }
    }
}

/// A table of named, typed columns in input column order.
#[derive(Clone, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Table {
    pub(crate) fn new(names: Vec<String>, columns: Vec<Column>) -> Self {
        debug_assert_eq!(names.len(), columns.len());
        Table { names, columns }
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn nrows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Looks a column up by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        let i = self.names.iter().position(|n| n == name)?;
        Some(&self.columns[i])
    }
}

impl Debug for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, column) in self.names.iter().zip(&self.columns) {
            map.entry(&format_args!("{name} :: {}", column.type_name()), column);
        }
        map.finish()
    }
}
