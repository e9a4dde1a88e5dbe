#![allow(dead_code)]

use datask::source::{load_rows, LoadOptions};
use datask::{Record, RowSet, Value};
use std::path::Path;

pub const SUPERSTORE_CSV: &str = "tests/sample-data/superstore.csv";

/// The ten-order fixture in `tests/sample-data`.
pub fn superstore() -> RowSet {
    load_rows(Path::new(SUPERSTORE_CSV), &LoadOptions::new()).unwrap()
}

/// Three rows: East 100, East 50, West 30.
pub fn regional_sales() -> RowSet {
    RowSet::new(vec![
        Record::from_pairs([("REGION", Value::from("East")), ("SALES", Value::from(100))]),
        Record::from_pairs([("REGION", Value::from("East")), ("SALES", Value::from(50))]),
        Record::from_pairs([("REGION", Value::from("West")), ("SALES", Value::from(30))]),
    ])
}

/// Values of `column` across the result rows, as text.
pub fn column_text(table: &datask::ResultTable, column: &str) -> Vec<String> {
    table
        .rows
        .iter()
        .map(|row| row.get(column).map(|v| v.as_text().into_owned()).unwrap_or_default())
        .collect()
}

pub fn number(row: &Record, column: &str) -> f64 {
    row.get(column).and_then(Value::as_number).unwrap()
}
