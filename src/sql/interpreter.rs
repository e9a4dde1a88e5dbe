use super::parser::{parse_components, OrderSpec, OrderTarget, ParsedSqlComponents, SelectItem};
use super::predicate::apply_where;
use super::{aggregate_alias, AggregateFunction, SortDirection, SqlError};
use crate::result::ResultTable;
use crate::value::{column_union, Record, RowSet, Value};
use log::{debug, warn};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub const NO_RESULTS_MESSAGE: &str = "No results found";
pub const RECORD_COUNT_COLUMN: &str = "record_count";

/// Runs `sql` against `rows`. Never fails: unreadable SQL, unknown GROUP BY
/// columns and empty results all produce the "No results" table.
pub fn execute(sql: &str, rows: &RowSet) -> ResultTable {
    match try_execute(sql, rows) {
        Ok(table) if table.rows.is_empty() => {
            debug!("query returned no rows: {}", sql);
            ResultTable::no_results(NO_RESULTS_MESSAGE)
        }
        Ok(table) => table,
        Err(e) => {
            warn!("could not execute query ({}): {}", e, sql);
            ResultTable::no_results(NO_RESULTS_MESSAGE)
        }
    }
}

/// Like [`execute`] but reports why a query could not run. An empty result is
/// returned as a table with no rows.
pub fn try_execute(sql: &str, rows: &RowSet) -> Result<ResultTable, SqlError> {
    let components = parse_components(sql)?;
    debug!("parsed query: {:?}", components);
    run(&components, rows.rows())
}

/// Executes already parsed components: WHERE, then GROUP BY (or projection),
/// then ORDER BY, then LIMIT.
pub fn run(components: &ParsedSqlComponents, rows: &[Record]) -> Result<ResultTable, SqlError> {
    let filtered = match &components.where_clause {
        Some(where_text) => apply_where(rows, where_text),
        None => rows.to_vec(),
    };

    let shaped = if !components.group_by.is_empty() || components.has_aggregates() {
        apply_group_by(&filtered, &components.select, &components.group_by)?
    } else {
        apply_select(&filtered, &components.select)
    };
    let shaped = if components.distinct {
        distinct(shaped)
    } else {
        shaped
    };

    let ordered = apply_order_by(shaped, &components.order_by, &components.select);
    let limited = apply_limit(ordered, components.limit);

    let columns = if limited.is_empty() {
        components
            .select
            .iter()
            .filter_map(SelectItem::output_name)
            .collect()
    } else {
        column_union(&limited)
    };
    Ok(ResultTable::with_columns(columns, limited))
}

/// Exact name first, then ASCII case-insensitive.
fn resolve<'a>(columns: &'a [String], name: &str) -> Option<&'a str> {
    columns
        .iter()
        .find(|c| *c == name)
        .or_else(|| columns.iter().find(|c| c.eq_ignore_ascii_case(name)))
        .map(String::as_str)
}

fn log_skipped_expressions(select: &[SelectItem]) {
    for item in select {
        if let SelectItem::Expression { text, .. } = item {
            debug!("SELECT expression not evaluated: {}", text);
        }
    }
}

/// Column projection for queries without aggregates.
pub fn apply_select(rows: &[Record], select: &[SelectItem]) -> Vec<Record> {
    let projects_nothing = select
        .iter()
        .all(|item| matches!(item, SelectItem::Wildcard | SelectItem::Expression { .. }));
    if projects_nothing {
        // nothing readable to project; keep whole rows
        log_skipped_expressions(select);
        return rows.to_vec();
    }
    log_skipped_expressions(select);
    let columns = column_union(rows);

    rows.iter()
        .map(|row| {
            let mut out = Record::new();
            for item in select {
                match item {
                    SelectItem::Wildcard => {
                        for (name, value) in row.iter() {
                            out.insert(name, value.clone());
                        }
                    }
                    SelectItem::Column { name, alias } => {
                        let source = resolve(&columns, name).unwrap_or(name);
                        let value = row.get(source).cloned().unwrap_or(Value::Null);
                        out.insert(alias.as_deref().unwrap_or(source), value);
                    }
                    SelectItem::Aggregate { .. } | SelectItem::Expression { .. } => {}
                }
            }
            out
        })
        .collect()
}

/// Buckets rows by the GROUP BY columns and evaluates the SELECT list per
/// bucket. Without GROUP BY columns all rows form a single bucket.
///
/// Each output row carries `record_count` unless the SELECT list already has
/// a COUNT aggregate.
pub fn apply_group_by(
    rows: &[Record],
    select: &[SelectItem],
    group_by: &[String],
) -> Result<Vec<Record>, SqlError> {
    let columns = column_union(rows);
    if rows.is_empty() && !group_by.is_empty() {
        return Ok(Vec::new());
    }
    let keys = group_by
        .iter()
        .map(|name| {
            resolve(&columns, name).ok_or_else(|| SqlError::UnknownColumn(name.clone()))
        })
        .collect::<Result<Vec<&str>, SqlError>>()?;
    log_skipped_expressions(select);

    // Buckets keep the order in which their first row appeared
    let mut index: HashMap<Vec<String>, usize> = HashMap::new();
    let mut buckets: Vec<Vec<&Record>> = Vec::new();
    if keys.is_empty() {
        buckets.push(rows.iter().collect());
    } else {
        for row in rows {
            let key: Vec<String> = keys
                .iter()
                .map(|k| row.get(k).map(|v| v.as_text().into_owned()).unwrap_or_default())
                .collect();
            match index.get(&key) {
                Some(&i) => buckets[i].push(row),
                None => {
                    index.insert(key, buckets.len());
                    buckets.push(vec![row]);
                }
            }
        }
    }
    debug!("grouped {} rows into {} buckets", rows.len(), buckets.len());

    let has_count = select.iter().any(|item| {
        matches!(
            item,
            SelectItem::Aggregate {
                function: AggregateFunction::Count,
                ..
            }
        )
    });
    let selected_keys: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|k| {
            select.iter().any(|item| match item {
                SelectItem::Wildcard => true,
                SelectItem::Column { name, .. } => name.eq_ignore_ascii_case(k),
                _ => false,
            })
        })
        .collect();

    let output = buckets
        .into_iter()
        .map(|bucket| {
            let first = bucket.first().copied();
            let mut out = Record::new();
            for key in keys.iter().filter(|k| !selected_keys.contains(*k)) {
                let value = first.and_then(|r| r.get(key)).cloned().unwrap_or(Value::Null);
                out.insert(*key, value);
            }
            for item in select {
                match item {
                    SelectItem::Wildcard => {
                        if let Some(first) = first {
                            for (name, value) in first.iter() {
                                out.insert(name, value.clone());
                            }
                        }
                    }
                    SelectItem::Column { name, alias } => {
                        let source = resolve(&columns, name).unwrap_or(name);
                        let value = first
                            .and_then(|r| r.get(source))
                            .cloned()
                            .unwrap_or(Value::Null);
                        out.insert(alias.as_deref().unwrap_or(source), value);
                    }
                    SelectItem::Aggregate {
                        function,
                        argument,
                        alias,
                    } => {
                        let source = argument
                            .as_deref()
                            .map(|a| resolve(&columns, a).unwrap_or(a));
                        let name = alias
                            .clone()
                            .unwrap_or_else(|| aggregate_alias(*function, argument.as_deref()));
                        out.insert(name, aggregate(*function, source, &bucket));
                    }
                    SelectItem::Expression { .. } => {}
                }
            }
            if !has_count && !out.contains(RECORD_COUNT_COLUMN) {
                out.insert(RECORD_COUNT_COLUMN, Value::from(bucket.len()));
            }
            out
        })
        .collect();
    Ok(output)
}

/// SUM and AVG treat non-numeric cells as 0; MAX and MIN skip them and are
/// null when nothing numeric remains. COUNT is the bucket size.
fn aggregate(function: AggregateFunction, column: Option<&str>, bucket: &[&Record]) -> Value {
    let numbers = move || {
        bucket.iter().map(move |row| {
            column
                .and_then(|c| row.get(c))
                .and_then(Value::as_number)
        })
    };
    match function {
        AggregateFunction::Count => Value::from(bucket.len()),
        AggregateFunction::Sum => {
            Value::Number(numbers().fold(0.0, |total, n| total + n.unwrap_or(0.0)))
        }
        AggregateFunction::Avg => {
            if bucket.is_empty() {
                Value::Null
            } else {
                let total = numbers().fold(0.0, |total, n| total + n.unwrap_or(0.0));
                Value::Number(total / bucket.len() as f64)
            }
        }
        AggregateFunction::Max => numbers()
            .flatten()
            .reduce(f64::max)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        AggregateFunction::Min => numbers()
            .flatten()
            .reduce(f64::min)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    }
}

fn distinct(rows: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| {
            let key: Vec<(String, String)> = row
                .iter()
                .map(|(k, v)| (k.to_string(), v.as_text().into_owned()))
                .collect();
            seen.insert(key)
        })
        .collect()
}

/// Finds the output column an ORDER BY key refers to.
fn order_column(spec: &OrderSpec, select: &[SelectItem], columns: &[String]) -> Option<String> {
    let found = match &spec.target {
        OrderTarget::Position(position) => {
            let index = position.checked_sub(1)?;
            if select.contains(&SelectItem::Wildcard) {
                columns.get(index).cloned()
            } else {
                select.get(index).and_then(SelectItem::output_name)
            }
        }
        OrderTarget::Aggregate { function, argument } => select
            .iter()
            .find(|item| match item {
                SelectItem::Aggregate {
                    function: f,
                    argument: a,
                    ..
                } => {
                    f == function
                        && match (a, argument) {
                            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                            (None, None) => true,
                            _ => false,
                        }
                }
                _ => false,
            })
            .and_then(SelectItem::output_name)
            .or_else(|| Some(aggregate_alias(*function, argument.as_deref()))),
        OrderTarget::Column(name) => resolve(columns, name).map(str::to_string).or_else(|| {
            select.iter().find_map(|item| match item {
                SelectItem::Column {
                    name: source,
                    alias: Some(alias),
                } if source.eq_ignore_ascii_case(name) => Some(alias.clone()),
                _ => None,
            })
        }),
    };
    found.and_then(|name| resolve(columns, &name).map(str::to_string))
}

/// Numbers compare numerically; anything else compares as lower-cased text.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        _ => {
            let text = |v: Option<&Value>| v.map(|v| v.as_text().to_lowercase()).unwrap_or_default();
            text(a).cmp(&text(b))
        }
    }
}

/// Stable sort on the ORDER BY keys. Keys that match no output column are skipped.
pub fn apply_order_by(
    mut rows: Vec<Record>,
    order_by: &[OrderSpec],
    select: &[SelectItem],
) -> Vec<Record> {
    if order_by.is_empty() || rows.is_empty() {
        return rows;
    }
    let columns = column_union(&rows);
    let keys: Vec<(String, SortDirection)> = order_by
        .iter()
        .filter_map(|spec| match order_column(spec, select, &columns) {
            Some(column) => Some((column, spec.direction)),
            None => {
                debug!("ORDER BY key ignored: {:?}", spec.target);
                None
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        keys.iter()
            .map(|(column, direction)| {
                let ord = compare_values(a.get(column), b.get(column));
                match direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    rows
}

/// Keeps the first `limit` rows; `None` keeps all.
pub fn apply_limit(mut rows: Vec<Record>, limit: Option<usize>) -> Vec<Record> {
    if let Some(n) = limit {
        rows.truncate(n);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales_rows() -> RowSet {
        RowSet::new(vec![
            Record::from_pairs([("REGION", Value::from("East")), ("SALES", Value::from(100.0))]),
            Record::from_pairs([("REGION", Value::from("East")), ("SALES", Value::from(50.0))]),
            Record::from_pairs([("REGION", Value::from("West")), ("SALES", Value::from(30.0))]),
        ])
    }

    #[test]
    fn test_grouped_sum_with_record_count() {
        let table = execute(
            "SELECT REGION, SUM(SALES) AS sum_sales FROM T GROUP BY REGION ORDER BY sum_sales DESC LIMIT 10",
            &sales_rows(),
        );
        assert_eq!(
            table.rows,
            vec![
                Record::from_pairs([
                    ("REGION", Value::from("East")),
                    ("sum_sales", Value::from(150.0)),
                    ("record_count", Value::from(2usize)),
                ]),
                Record::from_pairs([
                    ("REGION", Value::from("West")),
                    ("sum_sales", Value::from(30.0)),
                    ("record_count", Value::from(1usize)),
                ]),
            ]
        );
        assert_eq!(table.columns, vec!["REGION", "sum_sales", "record_count"]);
        assert_eq!(table.total_rows, 2);
    }

    #[test]
    fn test_explicit_count_suppresses_record_count() {
        let table = execute(
            "SELECT region, COUNT(*) AS total_count FROM t GROUP BY region",
            &sales_rows(),
        );
        assert_eq!(table.columns, vec!["REGION", "total_count"]);
        assert_eq!(table.rows[0].get("total_count"), Some(&Value::from(2usize)));
    }

    #[test]
    fn test_unknown_group_column_is_no_results() {
        let rows = sales_rows();
        assert_eq!(
            try_execute("SELECT SEGMENT, COUNT(*) FROM t GROUP BY SEGMENT", &rows).unwrap_err(),
            SqlError::UnknownColumn("SEGMENT".to_string())
        );
        let table = execute("SELECT SEGMENT, COUNT(*) FROM t GROUP BY SEGMENT", &rows);
        assert!(table.is_empty_result());
        assert_eq!(table.columns, vec!["No Data"]);
    }

    #[test]
    fn test_unparsable_sql_is_no_results() {
        let table = execute("show me the money", &sales_rows());
        assert!(table.is_empty_result());
    }

    #[test]
    fn test_global_aggregate() {
        let table = execute(
            "SELECT SUM(SALES) AS total_sales, MAX(SALES), MIN(SALES), AVG(SALES) FROM t WHERE REGION = 'East'",
            &sales_rows(),
        );
        assert_eq!(table.total_rows, 1);
        let row = &table.rows[0];
        assert_eq!(row.get("total_sales"), Some(&Value::from(150.0)));
        assert_eq!(row.get("max_sales"), Some(&Value::from(100.0)));
        assert_eq!(row.get("min_sales"), Some(&Value::from(50.0)));
        assert_eq!(row.get("avg_sales"), Some(&Value::from(75.0)));
        assert_eq!(row.get("record_count"), Some(&Value::from(2usize)));
    }

    #[test]
    fn test_max_min_skip_non_numeric() {
        let rows = RowSet::new(vec![
            Record::from_pairs([("G", Value::from("a")), ("V", Value::from("oops"))]),
            Record::from_pairs([("G", Value::from("a")), ("V", Value::from(4.0))]),
            Record::from_pairs([("G", Value::from("b")), ("V", Value::Null)]),
        ]);
        let table = execute("SELECT G, MAX(V), SUM(V), AVG(V) FROM t GROUP BY G", &rows);
        assert_eq!(table.rows[0].get("max_v"), Some(&Value::from(4.0)));
        assert_eq!(table.rows[0].get("sum_v"), Some(&Value::from(4.0)));
        assert_eq!(table.rows[0].get("avg_v"), Some(&Value::from(2.0)));
        assert_eq!(table.rows[1].get("max_v"), Some(&Value::Null));
        assert_eq!(table.rows[1].get("sum_v"), Some(&Value::from(0.0)));
    }

    #[test]
    fn test_select_star_limit_keeps_order() {
        let rows = sales_rows();
        let table = execute("SELECT * FROM T LIMIT 2", &rows);
        assert_eq!(table.rows, rows.rows()[..2].to_vec());
        let table = execute("SELECT * FROM T LIMIT 50", &rows);
        assert_eq!(table.rows, rows.rows().to_vec());
    }

    #[test]
    fn test_projection_with_alias_and_order() {
        let table = execute(
            "SELECT region AS r, sales FROM t ORDER BY sales",
            &sales_rows(),
        );
        assert_eq!(table.columns, vec!["r", "SALES"]);
        let sales: Vec<_> = table.rows.iter().map(|r| r.get("SALES").cloned()).collect();
        assert_eq!(
            sales,
            vec![
                Some(Value::from(30.0)),
                Some(Value::from(50.0)),
                Some(Value::from(100.0))
            ]
        );
    }

    #[test]
    fn test_order_by_position_and_aggregate() {
        let rows = sales_rows();
        let by_position = execute(
            "SELECT REGION, SUM(SALES) FROM t GROUP BY REGION ORDER BY 2 ASC",
            &rows,
        );
        assert_eq!(by_position.rows[0].get("REGION"), Some(&Value::from("West")));
        let by_expr = execute(
            "SELECT REGION, SUM(SALES) FROM t GROUP BY REGION ORDER BY SUM(SALES) DESC",
            &rows,
        );
        assert_eq!(by_expr.rows[0].get("REGION"), Some(&Value::from("East")));
    }

    #[test]
    fn test_text_order_is_case_insensitive() {
        let rows = RowSet::new(vec![
            Record::from_pairs([("NAME", Value::from("beta"))]),
            Record::from_pairs([("NAME", Value::from("Alpha"))]),
            Record::from_pairs([("NAME", Value::from("Gamma"))]),
        ]);
        let table = execute("SELECT NAME FROM t ORDER BY NAME DESC", &rows);
        let names: Vec<_> = table
            .rows
            .iter()
            .map(|r| r.get("NAME").unwrap().as_text().into_owned())
            .collect();
        assert_eq!(names, vec!["Gamma", "beta", "Alpha"]);
    }

    #[test]
    fn test_record_counts_cover_all_rows() {
        let rows = sales_rows();
        let table = execute("SELECT REGION, SUM(SALES) FROM t GROUP BY REGION", &rows);
        let total: f64 = table
            .rows
            .iter()
            .filter_map(|r| r.get("record_count").and_then(Value::as_number))
            .sum();
        assert_eq!(total as usize, rows.len());
    }

    #[test]
    fn test_multi_column_group_and_distinct() {
        let rows = RowSet::new(vec![
            Record::from_pairs([("A", Value::from("x")), ("B", Value::from(1.0))]),
            Record::from_pairs([("A", Value::from("x")), ("B", Value::from(1.0))]),
            Record::from_pairs([("A", Value::from("x")), ("B", Value::from(2.0))]),
        ]);
        let grouped = execute("SELECT A, B, COUNT(*) FROM t GROUP BY A, B", &rows);
        assert_eq!(grouped.total_rows, 2);
        let distinct = execute("SELECT DISTINCT A FROM t", &rows);
        assert_eq!(distinct.total_rows, 1);
    }

    #[test]
    fn test_execute_is_idempotent() {
        let rows = sales_rows();
        let sql = "SELECT REGION, AVG(SALES) FROM t GROUP BY REGION ORDER BY 2 DESC";
        assert_eq!(execute(sql, &rows), execute(sql, &rows));
    }

    fn region_sums(table: &ResultTable) -> Vec<(String, Option<f64>)> {
        table
            .rows
            .iter()
            .map(|r| {
                (
                    r.get("REGION").map(|v| v.as_text().into_owned()).unwrap_or_default(),
                    r.get("s").and_then(Value::as_number),
                )
            })
            .collect()
    }

    #[test]
    fn test_dialect_syntax_is_ignored() {
        let rows = sales_rows();
        let expected = vec![
            ("East".to_string(), Some(150.0)),
            ("West".to_string(), Some(30.0)),
        ];
        for sql in [
            "SELECT REGION, SUM(SALES) AS s FROM T WHERE SALES::FLOAT > 0 GROUP BY REGION",
            "-- customer's revenue\nSELECT REGION, SUM(SALES) AS s FROM T GROUP BY REGION",
            "SELECT REGION, /* don't */ SUM(SALES) AS s FROM T GROUP BY REGION",
            "SELECT REGION, REGION || '-x' AS tag, SUM(SALES) AS s FROM T GROUP BY REGION",
            "SELECT [REGION], SUM(SALES) AS s FROM T GROUP BY REGION",
            "SELECT REGION, SUM(SALES) AS s FROM T GROUP BY REGION, REGION::text",
        ] {
            let table = execute(sql, &rows);
            assert_eq!(region_sums(&table), expected, "{}", sql);
        }
    }

    #[test]
    fn test_unreadable_predicates_keep_rows() {
        let rows = sales_rows();
        for sql in [
            "SELECT * FROM T WHERE REGION = ?",
            "SELECT * FROM T WHERE REGION = #East#",
            "SELECT * FROM T WHERE REGION = \u{2018}East\u{2019}",
        ] {
            assert_eq!(execute(sql, &rows).total_rows, 3, "{}", sql);
        }
        let table = execute(
            "SELECT * FROM T WHERE SALES::FLOAT > 0 AND REGION = 'West'",
            &rows,
        );
        assert_eq!(table.total_rows, 1);
    }

    #[test]
    fn test_expression_only_select_keeps_rows() {
        let rows = sales_rows();
        let table = execute("SELECT TOP 2 * FROM T", &rows);
        assert_eq!(table.total_rows, 3);
        assert_eq!(table.columns, vec!["REGION", "SALES"]);
        assert_eq!(table.rows, rows.rows().to_vec());
    }

    #[test]
    fn test_sum_over_no_rows_is_zero() {
        let table = execute(
            "SELECT SUM(SALES) AS s, COUNT(*) AS n FROM T WHERE REGION = 'Nowhere'",
            &sales_rows(),
        );
        assert_eq!(table.total_rows, 1);
        let row = &table.rows[0];
        assert!(matches!(row.get("s"), Some(Value::Number(n)) if *n == 0.0 && n.is_sign_positive()));
        assert_eq!(row.get("n"), Some(&Value::from(0usize)));
    }

    #[test]
    fn test_empty_result_columns() {
        let table = try_execute("SELECT REGION FROM t WHERE SALES > 1000", &sales_rows()).unwrap();
        assert!(table.rows.is_empty());
        assert_eq!(table.columns, vec!["REGION"]);
    }
}
