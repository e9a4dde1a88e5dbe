//! In-memory SQL interpreter.
//!
//! SQL text, whether synthesized from a question or supplied by an external
//! service, is tokenized, split into clauses and executed against a
//! [`RowSet`](crate::value::RowSet). Only the subset that analytic questions
//! need is understood: a SELECT list of columns and `SUM/COUNT/AVG/MAX/MIN`
//! aggregates, a WHERE clause of simple predicates, GROUP BY, ORDER BY and LIMIT.

mod interpreter;
mod lexer;
mod parser;
mod predicate;

use serde::Serialize;
use std::fmt;

pub use interpreter::{
    apply_group_by, apply_limit, apply_order_by, apply_select, execute, run, try_execute,
    NO_RESULTS_MESSAGE, RECORD_COUNT_COLUMN,
};
pub use parser::{parse_components, OrderSpec, OrderTarget, ParsedSqlComponents, SelectItem};
pub use predicate::{apply_where, parse_predicates, CompareOp, Predicate};

/// Errors raised while reading or executing SQL text.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SqlError {
    #[error("unterminated {0} literal")]
    Unterminated(&'static str),
    #[error("query has no SELECT list")]
    MissingSelect,
    #[error("query has no FROM clause")]
    MissingFrom,
    #[error("invalid LIMIT '{0}'")]
    InvalidLimit(String),
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFunction {
    Sum,
    Count,
    Avg,
    Max,
    Min,
}

impl AggregateFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Min => "MIN",
        }
    }

    /// Case-insensitive lookup; `MEAN` is accepted for `AVG`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "SUM" => Some(AggregateFunction::Sum),
            "COUNT" => Some(AggregateFunction::Count),
            "AVG" | "MEAN" => Some(AggregateFunction::Avg),
            "MAX" => Some(AggregateFunction::Max),
            "MIN" => Some(AggregateFunction::Min),
            _ => None,
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    /// Default when ORDER BY omits a direction
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default output name of an aggregate: `total_count` for `COUNT(*)`,
/// otherwise `<func>_<column>` in lower case with non-identifier characters
/// replaced by underscores.
pub fn aggregate_alias(function: AggregateFunction, argument: Option<&str>) -> String {
    match argument {
        None | Some("*") if function == AggregateFunction::Count => "total_count".to_string(),
        None | Some("*") => format!("{}_all", function.as_str().to_lowercase()),
        Some(column) => format!(
            "{}_{}",
            function.as_str().to_lowercase(),
            sanitize_identifier(column).to_lowercase()
        ),
    }
}

pub(crate) fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Quotes a column name for SQL text unless it is a plain identifier.
pub fn quote_identifier(name: &str) -> String {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    };
    if plain && lexer::keyword(name).is_none() {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_aliases() {
        assert_eq!(aggregate_alias(AggregateFunction::Count, None), "total_count");
        assert_eq!(aggregate_alias(AggregateFunction::Count, Some("*")), "total_count");
        assert_eq!(aggregate_alias(AggregateFunction::Sum, Some("SALES")), "sum_sales");
        assert_eq!(
            aggregate_alias(AggregateFunction::Avg, Some("Unit Price")),
            "avg_unit_price"
        );
    }

    #[test]
    fn identifier_quoting() {
        assert_eq!(quote_identifier("SALES"), "SALES");
        assert_eq!(quote_identifier("Unit Price"), "\"Unit Price\"");
        assert_eq!(quote_identifier("order"), "\"order\"");
        assert_eq!(quote_identifier("1st"), "\"1st\"");
    }

    #[test]
    fn function_names() {
        assert_eq!(AggregateFunction::from_name("avg"), Some(AggregateFunction::Avg));
        assert_eq!(AggregateFunction::from_name("Mean"), Some(AggregateFunction::Avg));
        assert_eq!(AggregateFunction::from_name("median"), None);
    }
}
