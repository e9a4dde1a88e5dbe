use crate::value::{column_union, Record, Value};
use serde::Serialize;

pub const NO_DATA_COLUMN: &str = "No Data";

static NULL: Value = Value::Null;

/// Output of one analysis: column labels, ordered rows and their count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
    pub total_rows: usize,
}

impl ResultTable {
    /// Builds a table whose columns are the union of the record keys in first-seen order.
    pub fn from_records(rows: Vec<Record>) -> Self {
        Self::with_columns(column_union(&rows), rows)
    }

    pub fn with_columns(columns: Vec<String>, rows: Vec<Record>) -> Self {
        let total_rows = rows.len();
        Self {
            columns,
            rows,
            total_rows,
        }
    }

    /// The explanatory single-cell table shown when a query yields nothing.
    pub fn no_results(message: impl Into<String>) -> Self {
        Self {
            columns: vec![NO_DATA_COLUMN.to_string()],
            rows: vec![Record::from_pairs([(NO_DATA_COLUMN, Value::Text(message.into()))])],
            total_rows: 0,
        }
    }

    /// True for the placeholder produced by [`ResultTable::no_results`].
    pub fn is_empty_result(&self) -> bool {
        self.total_rows == 0
    }

    /// Cells of `row` in column order; missing cells are null.
    pub fn row_values<'a>(&'a self, row: &'a Record) -> impl Iterator<Item = &'a Value> + 'a {
        self.columns
            .iter()
            .map(move |c| row.get(c).unwrap_or(&NULL))
    }
}
