//! Query synthesis: [`QueryPlan`] to SQL text, a short rationale and two
//! follow-up questions. Also renders a parsed query as an equivalent pandas
//! snippet for display.

use crate::analyzer::{Intent, QueryPlan};
use crate::mapping::{ColumnMapping, Concept};
use crate::sql::{
    parse_predicates, quote_identifier, AggregateFunction, OrderTarget, ParsedSqlComponents,
    Predicate, SelectItem, SortDirection,
};
use crate::value::format_plain_number;
use serde::Serialize;

pub const DEFAULT_TABLE: &str = "DATASET";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesizedQuery {
    pub sql: String,
    pub rationale: String,
    pub suggestions: Vec<String>,
}

/// Lower case with underscores as spaces, for prose.
fn display_name(column: &str) -> String {
    column.to_lowercase().replace('_', " ")
}

/// Writes `plan` as SQL against `table`. Never fails; the fallback intent
/// picks its columns from `mapping`.
pub fn build_query(
    plan: &QueryPlan,
    row_count: usize,
    table: &str,
    mapping: &ColumnMapping,
) -> SynthesizedQuery {
    match (&plan.intent, &plan.aggregate_column) {
        (Intent::Fallback, _) | (_, None) => fallback_query(plan, row_count, table, mapping),
        (_, Some(column)) => aggregate_query(plan, column, row_count, table),
    }
}

fn aggregate_expression(function: AggregateFunction, argument: Option<&str>) -> String {
    match argument {
        Some(column) => format!("{}({})", function, quote_identifier(column)),
        None => format!("{}(*)", function),
    }
}

fn aggregate_query(plan: &QueryPlan, column: &str, row_count: usize, table: &str) -> SynthesizedQuery {
    let function = plan.aggregate_function;
    let argument = plan.aggregate_argument();
    let alias = crate::sql::aggregate_alias(function, argument);

    let mut select = vec![format!(
        "{} AS {}",
        aggregate_expression(function, argument),
        quote_identifier(&alias)
    )];
    if function != AggregateFunction::Count {
        select.push("COUNT(*) AS record_count".to_string());
    }

    let mut sql = match &plan.group_by {
        Some(group) => format!("SELECT {}, {}", quote_identifier(group), select.join(", ")),
        None => format!("SELECT {}", select.join(", ")),
    };
    sql.push_str(&format!(" FROM {}", table));
    if let Some(where_clause) = &plan.where_clause {
        sql.push_str(&format!(" WHERE {}", where_clause));
    }
    if let Some(group) = &plan.group_by {
        sql.push_str(&format!(
            " GROUP BY {} ORDER BY {} {} LIMIT {}",
            quote_identifier(group),
            quote_identifier(&alias),
            plan.order_direction,
            plan.limit
        ));
    }

    let subject = if column == crate::analyzer::ALL_ROWS {
        "records".to_string()
    } else {
        column.to_lowercase()
    };
    let func = function.as_str().to_lowercase();
    let filtered = plan.where_clause.is_some();

    let first_line = match (&plan.intent, &plan.group_by) {
        (Intent::Comparison, Some(group)) => {
            format!("• Comparing {} across different {}s", subject, display_name(group))
        }
        (_, Some(group)) => format!(
            "• Analyzing {} of {} by {}{}",
            func,
            subject,
            display_name(group),
            if filtered { " with filters" } else { "" }
        ),
        (_, None) => format!(
            "• Calculating {} of {}{}",
            func,
            if column == crate::analyzer::ALL_ROWS {
                "total records"
            } else {
                subject.as_str()
            },
            if filtered { " with filters" } else { "" }
        ),
    };
    let last_line = if filtered {
        "• Applying filters to focus on specific data subset".to_string()
    } else if plan.intent == Intent::Comparison {
        "• Ranking to show top performers".to_string()
    } else {
        format!(
            "• Ranking results to identify {} values",
            match plan.order_direction {
                SortDirection::Desc => "highest",
                SortDirection::Asc => "lowest",
            }
        )
    };
    let rationale = format!(
        "{}\n• Processing {} records to find patterns\n{}",
        first_line, row_count, last_line
    );

    let suggestions = match (&plan.intent, &plan.group_by) {
        (Intent::Comparison, Some(_)) => vec![
            format!("What drives high {} performance?", subject),
            format!("How does {} vary by region?", subject),
        ],
        (_, Some(group)) => vec![
            format!(
                "Which {} has the {} {}?",
                display_name(group),
                match plan.order_direction {
                    SortDirection::Desc => "lowest",
                    SortDirection::Asc => "highest",
                },
                if column == crate::analyzer::ALL_ROWS {
                    "count"
                } else {
                    subject.as_str()
                }
            ),
            "How does performance vary across different time periods?".to_string(),
        ],
        (_, None) => vec![
            "What are the overall trends?".to_string(),
            "How does performance vary across different time periods?".to_string(),
        ],
    };

    SynthesizedQuery {
        sql,
        rationale,
        suggestions,
    }
}

fn fallback_query(
    plan: &QueryPlan,
    row_count: usize,
    table: &str,
    mapping: &ColumnMapping,
) -> SynthesizedQuery {
    let where_sql = plan
        .where_clause
        .as_ref()
        .map(|w| format!(" WHERE {}", w))
        .unwrap_or_default();
    let sales = mapping.get(Concept::Sales);
    let dimension = [
        (Concept::Category, "product category"),
        (Concept::Region, "region"),
    ]
    .into_iter()
    .find_map(|(concept, label)| mapping.get(concept).map(|column| (column, label)));

    let (sql, focus) = match (dimension, sales) {
        (Some((group, label)), Some(sales)) => (
            format!(
                "SELECT {group}, SUM({sales}) AS total_sales, COUNT(*) AS record_count FROM {table}{where_sql} \
                 GROUP BY {group} ORDER BY total_sales DESC LIMIT {limit}",
                group = quote_identifier(group),
                sales = quote_identifier(sales),
                table = table,
                where_sql = where_sql,
                limit = plan.limit
            ),
            format!("• Analyzing sales performance by {}", label),
        ),
        _ => (
            format!("SELECT * FROM {}{} LIMIT {}", table, where_sql, plan.limit),
            "• Showing sample data for exploration".to_string(),
        ),
    };

    SynthesizedQuery {
        sql,
        rationale: format!(
            "• Providing general data overview\n• Processing {} records to find patterns\n{}",
            row_count, focus
        ),
        suggestions: vec![
            "Which product categories perform best?".to_string(),
            "What are the sales trends by region?".to_string(),
        ],
    }
}

/// Fixed query used when synthesized SQL cannot be used.
pub fn last_resort(table: &str) -> SynthesizedQuery {
    SynthesizedQuery {
        sql: format!("SELECT * FROM {} LIMIT 10", table),
        rationale: "• Basic data exploration query due to analysis error".to_string(),
        suggestions: vec![
            "What are the sales trends?".to_string(),
            "Which products perform best?".to_string(),
        ],
    }
}

fn py_str(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn py_condition(predicate: &Predicate) -> Option<String> {
    match predicate {
        Predicate::ExtractYear { column, year } => Some(format!(
            "(pd.to_datetime(df[{}], errors=\"coerce\").dt.year == {})",
            py_str(column),
            year
        )),
        Predicate::ExtractMonth { column, month } => Some(format!(
            "(pd.to_datetime(df[{}], errors=\"coerce\").dt.month == {})",
            py_str(column),
            month
        )),
        Predicate::TextEquals { column, literal } => {
            Some(format!("(df[{}] == {})", py_str(column), py_str(literal)))
        }
        Predicate::Compare { column, op, value } => {
            let symbol = match op {
                crate::sql::CompareOp::Eq => "==",
                crate::sql::CompareOp::Gt => ">",
                crate::sql::CompareOp::Lt => "<",
                crate::sql::CompareOp::Ge => ">=",
                crate::sql::CompareOp::Le => "<=",
            };
            Some(format!(
                "(pd.to_numeric(df[{}], errors=\"coerce\") {} {})",
                py_str(column),
                symbol,
                format_plain_number(*value)
            ))
        }
        Predicate::Unrecognized(_) => None,
    }
}

fn pandas_function(function: AggregateFunction, argument: Option<&str>) -> &'static str {
    match (function, argument) {
        (AggregateFunction::Count, None) => "size",
        (AggregateFunction::Count, Some(_)) => "count",
        (AggregateFunction::Sum, _) => "sum",
        (AggregateFunction::Avg, _) => "mean",
        (AggregateFunction::Max, _) => "max",
        (AggregateFunction::Min, _) => "min",
    }
}

/// Renders a parsed query as pandas code operating on a DataFrame `df`.
pub fn pandas_code(query: &ParsedSqlComponents) -> String {
    let mut lines = vec![
        "import pandas as pd".to_string(),
        String::new(),
        format!("# df holds the rows of {}", query.table),
    ];

    if let Some(where_clause) = &query.where_clause {
        let predicates = parse_predicates(where_clause);
        let conditions: Vec<String> = predicates.iter().filter_map(py_condition).collect();
        for predicate in &predicates {
            if let Predicate::Unrecognized(text) = predicate {
                lines.push(format!("# filter not translated: {}", text));
            }
        }
        if !conditions.is_empty() {
            lines.push(format!("df = df[{}]", conditions.join(" & ")));
        }
    }

    let aggregates: Vec<(String, &str, &'static str)> = query
        .select
        .iter()
        .filter_map(|item| match item {
            SelectItem::Aggregate {
                function, argument, ..
            } => Some((
                item.output_name().unwrap_or_default(),
                argument.as_deref().unwrap_or(""),
                pandas_function(*function, argument.as_deref()),
            )),
            _ => None,
        })
        .collect();

    let mut chain = if !query.group_by.is_empty() {
        let keys: Vec<String> = query.group_by.iter().map(|k| py_str(k)).collect();
        let first_key = query.group_by[0].as_str();
        let mut named: Vec<String> = aggregates
            .iter()
            .map(|(alias, column, func)| {
                let column = if column.is_empty() { first_key } else { *column };
                format!("{}=({}, {})", alias, py_str(column), py_str(func))
            })
            .collect();
        if !query.select.iter().any(|i| matches!(i, SelectItem::Aggregate { function: AggregateFunction::Count, .. })) {
            named.push(format!("record_count=({}, \"size\")", py_str(first_key)));
        }
        vec![
            format!("df.groupby([{}], as_index=False)", keys.join(", ")),
            format!(".agg({})", named.join(", ")),
        ]
    } else if !aggregates.is_empty() {
        let mut cells: Vec<String> = aggregates
            .iter()
            .map(|(alias, column, func)| {
                let value = match (*column, *func) {
                    (_, "size") => "len(df)".to_string(),
                    ("", _) => "len(df)".to_string(),
                    (column, func) => format!("df[{}].{}()", py_str(column), func),
                };
                format!("{}: {}", py_str(alias), value)
            })
            .collect();
        if !query.select.iter().any(|i| matches!(i, SelectItem::Aggregate { function: AggregateFunction::Count, .. })) {
            cells.push("\"record_count\": len(df)".to_string());
        }
        vec![format!("pd.DataFrame([{{{}}}])", cells.join(", "))]
    } else if query.select.contains(&SelectItem::Wildcard) {
        vec!["df".to_string()]
    } else {
        let columns: Vec<String> = query
            .select
            .iter()
            .filter_map(|item| match item {
                SelectItem::Column { name, .. } => Some(py_str(name)),
                _ => None,
            })
            .collect();
        let renames: Vec<String> = query
            .select
            .iter()
            .filter_map(|item| match item {
                SelectItem::Column {
                    name,
                    alias: Some(alias),
                } => Some(format!("{}: {}", py_str(name), py_str(alias))),
                _ => None,
            })
            .collect();
        let mut chain = vec![format!("df[[{}]]", columns.join(", "))];
        if !renames.is_empty() {
            chain.push(format!(".rename(columns={{{}}})", renames.join(", ")));
        }
        chain
    };

    if query.distinct {
        chain.push(".drop_duplicates()".to_string());
    }

    let sort_keys: Vec<(String, bool)> = query
        .order_by
        .iter()
        .filter_map(|spec| {
            let name = match &spec.target {
                OrderTarget::Column(name) => Some(
                    query
                        .select
                        .iter()
                        .find_map(|item| match item {
                            SelectItem::Column {
                                name: source,
                                alias: Some(alias),
                            } if source == name => Some(alias.clone()),
                            _ => None,
                        })
                        .unwrap_or_else(|| name.clone()),
                ),
                OrderTarget::Position(p) => p
                    .checked_sub(1)
                    .and_then(|i| query.select.get(i))
                    .and_then(SelectItem::output_name),
                OrderTarget::Aggregate { function, argument } => {
                    Some(crate::sql::aggregate_alias(*function, argument.as_deref()))
                }
            }?;
            Some((name, spec.direction == SortDirection::Asc))
        })
        .collect();
    if !sort_keys.is_empty() {
        let names: Vec<String> = sort_keys.iter().map(|(n, _)| py_str(n)).collect();
        let ascending: Vec<&str> = sort_keys
            .iter()
            .map(|(_, asc)| if *asc { "True" } else { "False" })
            .collect();
        chain.push(format!(
            ".sort_values([{}], ascending=[{}])",
            names.join(", "),
            ascending.join(", ")
        ));
    }
    if let Some(limit) = query.limit {
        chain.push(format!(".head({})", limit));
    }

    if chain.len() == 1 {
        lines.push(format!("result = {}", chain[0]));
    } else {
        lines.push("result = (".to_string());
        for part in chain {
            lines.push(format!("    {}", part));
        }
        lines.push(")".to_string());
    }
    lines.join("\n")
}
