//! Cells, records and row sets, plus the schema inferred from them.
//!
//! Row access goes through typed accessors so the lenient and strict parsing
//! rules live in one place: [`Value::as_number`] follows leading-prefix number
//! parsing, [`Value::as_date`] accepts the common date layouts, and
//! [`Schema::infer`] only calls a column numeric when every value parses whole.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashSet;

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell. Text is parsed by its longest numeric prefix
    /// ("12.5kg" is 12.5); booleans, nulls and text without a numeric prefix are `None`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => parse_number_prefix(s),
            Value::Bool(_) | Value::Null => None,
        }
    }

    /// Text view of the cell. Nulls render as the empty string.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Value::Text(s) => Cow::Borrowed(s.as_str()),
            Value::Number(n) => Cow::Owned(format_plain_number(*n)),
            Value::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Value::Null => Cow::Borrowed(""),
        }
    }

    /// Calendar date view of the cell. Numbers are read as epoch milliseconds.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Text(s) => parse_date(s),
            Value::Number(n) if n.is_finite() => {
                DateTime::from_timestamp_millis(*n as i64).map(|dt| dt.date_naive())
            }
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s),
            nested => Value::Text(nested.to_string()),
        }
    }
}

/// Integral values print without a fractional part, like a spreadsheet would.
pub(crate) fn format_plain_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Parses the longest leading decimal number in `s` (after leading whitespace).
pub(crate) fn parse_number_prefix(s: &str) -> Option<f64> {
    let trimmed = s.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - digits_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        mantissa_digits += frac_end - frac_start;
        if mantissa_digits > 0 {
            end = frac_end;
        }
    }
    if mantissa_digits == 0 {
        return None;
    }
    // Optional exponent, only consumed when complete
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    trimmed[..end].parse::<f64>().ok()
}

/// Strict number parse used for schema inference: the whole string must be a finite number.
fn parse_number_strict(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y", "%b %d, %Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
];

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// A flat record: column name to value, keeping column insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut record = Record::new();
        for (k, v) in pairs {
            record.insert(k, v.into());
        }
        record
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    /// Exact lookup first, then ASCII case-insensitive.
    pub fn get_ci(&self, column: &str) -> Option<&Value> {
        self.get(column).or_else(|| {
            self.fields
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(column))
                .map(|(_, v)| v)
        })
    }

    /// Sets `column`, replacing an existing value in place.
    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, v)| (name.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Ordered sequence of records handed to one analysis call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    rows: Vec<Record>,
}

impl RowSet {
    pub fn new(rows: Vec<Record>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First `n` rows as a new row set.
    pub fn head(&self, n: usize) -> RowSet {
        RowSet::new(self.rows.iter().take(n).cloned().collect())
    }

    /// Union of column names in first-seen order.
    pub fn column_names(&self) -> Vec<String> {
        column_union(&self.rows)
    }

    pub fn schema(&self) -> Schema {
        Schema::infer(&self.rows)
    }
}

impl From<Vec<Record>> for RowSet {
    fn from(rows: Vec<Record>) -> Self {
        RowSet::new(rows)
    }
}

pub(crate) fn column_union(rows: &[Record]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for row in rows {
        for name in row.columns() {
            if seen.insert(name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Semantic type of a column, inferred from its non-null values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Date,
    Boolean,
    Text,
    /// Only nulls (or no rows at all)
    Empty,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Date => "date",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Text => "text",
            ColumnKind::Empty => "empty",
        }
    }

    /// Suitable as a chart label axis.
    pub fn is_categorical(&self) -> bool {
        matches!(self, ColumnKind::Text | ColumnKind::Date | ColumnKind::Boolean)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub kind: ColumnKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn infer(rows: &[Record]) -> Self {
        let fields = column_union(rows)
            .into_iter()
            .map(|name| {
                let kind = infer_kind(rows.iter().filter_map(|r| r.get(&name)));
                Field { name, kind }
            })
            .collect();
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn kind(&self, name: &str) -> Option<ColumnKind> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.kind)
    }

    /// Resolves a column reference to the name present in the data: exact match
    /// first, then ASCII case-insensitive.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|f| f.name.eq_ignore_ascii_case(name))
            })
            .map(|f| f.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn infer_kind<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnKind {
    let mut seen = false;
    let mut numeric = true;
    let mut date = true;
    let mut boolean = true;
    for value in values {
        match value {
            Value::Null => continue,
            Value::Number(_) => {
                date = false;
                boolean = false;
            }
            Value::Bool(_) => {
                numeric = false;
                date = false;
            }
            Value::Text(s) => {
                boolean = false;
                if numeric && parse_number_strict(s).is_none() {
                    numeric = false;
                }
                if date && parse_date(s).is_none() {
                    date = false;
                }
            }
        }
        seen = true;
    }
    if !seen {
        ColumnKind::Empty
    } else if numeric {
        ColumnKind::Numeric
    } else if boolean {
        ColumnKind::Boolean
    } else if date {
        ColumnKind::Date
    } else {
        ColumnKind::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn number_prefix_parsing() {
        assert_eq!(parse_number_prefix("12.5kg"), Some(12.5));
        assert_eq!(parse_number_prefix("  -3"), Some(-3.0));
        assert_eq!(parse_number_prefix(".5"), Some(0.5));
        assert_eq!(parse_number_prefix("1e3x"), Some(1000.0));
        assert_eq!(parse_number_prefix("1e"), Some(1.0));
        assert_eq!(parse_number_prefix("abc"), None);
        assert_eq!(parse_number_prefix("-"), None);
        assert_eq!(parse_number_prefix(""), None);
    }

    #[test]
    fn typed_accessors() {
        assert_eq!(Value::from("42").as_number(), Some(42.0));
        assert_eq!(Value::Bool(true).as_number(), None);
        assert_eq!(Value::Null.as_number(), None);
        assert_eq!(Value::from(150.0).as_text(), "150");
        assert_eq!(Value::from(1.25).as_text(), "1.25");
        assert_eq!(Value::Null.as_text(), "");

        let d = Value::from("2015-06-01").as_date().unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2015, 6, 1));
        let d = Value::from("2016-01-01T10:30:00Z").as_date().unwrap();
        assert_eq!(d.year(), 2016);
        let d = Value::from("11/08/2016").as_date().unwrap();
        assert_eq!((d.year(), d.month()), (2016, 11));
        assert!(Value::from("not-a-date").as_date().is_none());
    }

    #[test]
    fn record_keeps_order_and_replaces() {
        let mut r = Record::from_pairs([("B", Value::from(1.0)), ("A", Value::from("x"))]);
        r.insert("B", Value::from(2.0));
        assert_eq!(r.columns().collect::<Vec<_>>(), vec!["B", "A"]);
        assert_eq!(r.get("B"), Some(&Value::Number(2.0)));
        assert_eq!(r.get("b"), None);
        assert_eq!(r.get_ci("b"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn record_serializes_in_order() {
        let r = Record::from_pairs([("Z", Value::from(1.0)), ("A", Value::Null)]);
        assert_eq!(serde_json::to_string(&r).unwrap(), r#"{"Z":1.0,"A":null}"#);
    }

    #[test]
    fn schema_inference() {
        let rows = vec![
            Record::from_pairs([
                ("REGION", Value::from("East")),
                ("SALES", Value::from("10.5")),
                ("ORDER_DATE", Value::from("2015-01-02")),
                ("FLAG", Value::Bool(true)),
                ("EMPTY", Value::Null),
            ]),
            Record::from_pairs([
                ("REGION", Value::from("West")),
                ("SALES", Value::from(3.0)),
                ("ORDER_DATE", Value::from("2016-03-04")),
                ("FLAG", Value::Bool(false)),
                ("EMPTY", Value::Null),
            ]),
        ];
        let schema = Schema::infer(&rows);
        assert_eq!(schema.kind("REGION"), Some(ColumnKind::Text));
        assert_eq!(schema.kind("SALES"), Some(ColumnKind::Numeric));
        assert_eq!(schema.kind("ORDER_DATE"), Some(ColumnKind::Date));
        assert_eq!(schema.kind("FLAG"), Some(ColumnKind::Boolean));
        assert_eq!(schema.kind("EMPTY"), Some(ColumnKind::Empty));
        assert_eq!(schema.resolve("sales"), Some("SALES"));
        assert_eq!(schema.resolve("missing"), None);
    }

    #[test]
    fn column_union_first_seen_order() {
        let rows = RowSet::new(vec![
            Record::from_pairs([("a", Value::from(1.0))]),
            Record::from_pairs([("b", Value::from(1.0)), ("a", Value::from(2.0))]),
        ]);
        assert_eq!(rows.column_names(), vec!["a".to_string(), "b".to_string()]);
    }
}
