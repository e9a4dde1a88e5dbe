//! Terminal rendering of analyses, result tables and schemas.

use crate::engine::Analysis;
use crate::mapping::suggest_mappings;
use crate::result::ResultTable;
use crate::value::{RowSet, Value};
use color_eyre::Result;

fn display_width(s: &str) -> usize {
    s.chars().count()
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Number(n) => {
            let text = crate::value::format_plain_number(*n);
            if text.contains('.') && n.abs() < 1e15 {
                format!("{:.2}", n)
            } else {
                text
            }
        }
        other => other.as_text().replace('\n', "\\n"),
    }
}

fn table_rule(widths: &[usize]) -> String {
    let mut out = String::from("+");
    for width in widths {
        out.push_str(&"-".repeat(*width + 2));
        out.push('+');
    }
    out
}

fn table_row(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::from("|");
    for (i, width) in widths.iter().enumerate() {
        let cell = cells.get(i).map(String::as_str).unwrap_or_default();
        let cell_width = display_width(cell);
        line.push(' ');
        line.push_str(cell);
        if *width > cell_width {
            line.push_str(&" ".repeat(*width - cell_width));
        }
        line.push_str(" |");
    }
    line
}

fn ascii_table(headers: &[String], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(display_width(cell));
            }
        }
    }

    let rule = table_rule(&widths);
    let mut lines = vec![rule.clone(), table_row(headers, &widths), rule.clone()];
    lines.extend(rows.iter().map(|row| table_row(row, &widths)));
    lines.push(rule);
    lines
}

/// Boxed table of at most `max_rows` rows followed by a row count line.
pub fn render_table(table: &ResultTable, max_rows: usize) -> String {
    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .take(max_rows)
        .map(|row| table.row_values(row).map(cell_text).collect())
        .collect();
    let mut lines = ascii_table(&table.columns, &rows);
    if table.rows.len() > rows.len() {
        lines.push(format!("(showing {} of {} rows)", rows.len(), table.total_rows));
    } else {
        lines.push(format!("({} rows)", table.total_rows));
    }
    lines.join("\n")
}

pub fn render_analysis(analysis: &Analysis, max_rows: usize) -> String {
    let mut out = Vec::new();

    if let Some(question) = &analysis.question {
        out.push(format!("Question: {}", question));
    }
    if !analysis.missing_concepts.is_empty() {
        let names: Vec<&str> = analysis.missing_concepts.iter().map(|c| c.as_str()).collect();
        out.push(format!("Note: no column found for {}", names.join(", ")));
    }
    out.push(String::new());
    out.push("SQL:".to_string());
    out.push(format!("  {}", analysis.sql));
    out.push(String::new());
    out.push(analysis.rationale.clone());
    out.push(String::new());
    out.push(render_table(&analysis.result, max_rows));

    let viz = &analysis.visualization;
    out.push(String::new());
    out.push(format!("Chart: {} ({})", viz.title, viz.kind.as_str()));
    if let (Some(x), Some(y)) = (&viz.axes.x, &viz.axes.y) {
        out.push(format!("  x: {}  y: {}", x, y));
    }
    for point in &viz.series {
        out.push(format!("  {}: {}", point.label, point.formatted_value));
    }

    if !analysis.suggestions.is_empty() {
        out.push(String::new());
        out.push("Try next:".to_string());
        for suggestion in &analysis.suggestions {
            out.push(format!("  - {}", suggestion));
        }
    }

    out.join("\n")
}

pub fn render_json(analysis: &Analysis) -> Result<String> {
    Ok(serde_json::to_string_pretty(analysis)?)
}

/// Inferred column kinds and the concept each column was mapped to.
pub fn render_schema(rows: &RowSet) -> String {
    let schema = rows.schema();
    let field_rows: Vec<Vec<String>> = schema
        .fields()
        .iter()
        .map(|f| vec![f.name.clone(), f.kind.as_str().to_string()])
        .collect();
    let mut lines = ascii_table(&["column".to_string(), "kind".to_string()], &field_rows);

    let mapping_rows: Vec<Vec<String>> = suggest_mappings(&schema.names())
        .into_iter()
        .map(|s| {
            vec![
                s.concept.as_str().to_string(),
                s.column.unwrap_or_else(|| "-".to_string()),
                format!("{:.1}", s.confidence),
                s.alternatives.join(", "),
            ]
        })
        .collect();
    lines.push(String::new());
    lines.extend(ascii_table(
        &[
            "concept".to_string(),
            "column".to_string(),
            "confidence".to_string(),
            "alternatives".to_string(),
        ],
        &mapping_rows,
    ));
    lines.push(format!("({} rows)", rows.len()));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Record;

    #[test]
    fn test_render_table_layout() {
        let table = ResultTable::from_records(vec![
            Record::from_pairs([("REGION", Value::from("East")), ("sum_sales", Value::from(150.0))]),
            Record::from_pairs([("REGION", Value::from("West")), ("sum_sales", Value::from(30.25))]),
        ]);
        let text = render_table(&table, 10);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "+--------+-----------+");
        assert_eq!(lines[1], "| REGION | sum_sales |");
        assert_eq!(lines[3], "| East   | 150       |");
        assert_eq!(lines[4], "| West   | 30.25     |");
        assert_eq!(lines[6], "(2 rows)");
    }

    #[test]
    fn test_render_table_truncates() {
        let table = ResultTable::from_records(
            (0..5).map(|i| Record::from_pairs([("N", Value::from(i))])).collect(),
        );
        assert!(render_table(&table, 2).ends_with("(showing 2 of 5 rows)"));
    }

    #[test]
    fn test_schema_lists_mapping() {
        let rows = RowSet::new(vec![Record::from_pairs([
            ("Region", Value::from("East")),
            ("Sales", Value::from(1.0)),
        ])]);
        let text = render_schema(&rows);
        assert!(text.contains("| Region | text    |"));
        assert!(text.contains("| sales "));
        assert!(text.contains("0.8"));
    }
}
