//! Decoded rows and query results.

use std::collections::HashMap;

use serde::Serialize;

use crate::value::CqlValue;

/// A decoded `(name, value)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: CqlValue,
    pub value: CqlValue,
}

/// One decoded row.
///
/// Columns keep server order. Lookups by name use the decoded name's
/// string form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    key: CqlValue,
    columns: Vec<Column>,
    #[serde(skip)]
    by_name: HashMap<String, usize>,
}

impl Row {
    pub fn new(key: CqlValue, columns: Vec<Column>) -> Self {
        let by_name = columns
            .iter()
            .enumerate()
            .map(|(idx, col)| (col.name.to_string(), idx))
            .collect();
        Self { key, columns, by_name }
    }

    pub fn key(&self) -> &CqlValue {
        &self.key
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of decoded columns (excludes skipped ones).
    pub fn col_count(&self) -> usize {
        self.columns.len()
    }

    /// Value of a column by decoded name.
    pub fn get(&self, name: &str) -> Option<&CqlValue> {
        self.by_name.get(name).map(|&idx| &self.columns[idx].value)
    }

    /// Value of a column by position.
    pub fn get_idx(&self, idx: usize) -> Option<&CqlValue> {
        self.columns.get(idx).map(|c| &c.value)
    }
}

/// Rows of a ROWS reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Rows(Vec<Row>);

impl Rows {
    pub fn new(rows: Vec<Row>) -> Self {
        Self(rows)
    }

    pub fn row_count(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.0.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Row> {
        self.0
    }
}

impl IntoIterator for Rows {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Rows {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Outcome of one executed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// SELECT
    Rows(Rows),
    /// Scalar integer reply
    Count(i64),
    /// Mutations and schema changes
    Void,
}

impl QueryResult {
    pub fn rows(&self) -> Option<&Rows> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Option<Rows> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// The only row of a single-row result.
    pub fn into_single_row(self) -> Option<Row> {
        match self {
            QueryResult::Rows(rows) if rows.row_count() == 1 => rows.into_iter().next(),
            _ => None,
        }
    }

    pub fn count(&self) -> Option<i64> {
        match self {
            QueryResult::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, QueryResult::Void)
    }
}
