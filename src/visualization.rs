//! Chart descriptor derived from a [`ResultTable`].
//!
//! Column roles are read from the first row: a cell that is a number, or
//! text starting with one, makes its column numeric; other text makes it
//! categorical. Booleans and nulls take no role.

use crate::result::ResultTable;
use crate::value::{Record, Value};
use serde::Serialize;

/// Rows shown in a bar chart.
const BAR_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    BarChart,
    LineChart,
    ScatterPlot,
    SummaryStats,
    Table,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::BarChart => "bar_chart",
            ChartKind::LineChart => "line_chart",
            ChartKind::ScatterPlot => "scatter_plot",
            ChartKind::SummaryStats => "summary_stats",
            ChartKind::Table => "table",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Axes {
    pub x: Option<String>,
    pub y: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub label: String,
    pub value: f64,
    pub formatted_value: String,
}

impl SeriesPoint {
    fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
            formatted_value: format_number(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationSpec {
    #[serde(rename = "type")]
    pub kind: ChartKind,
    pub title: String,
    pub description: String,
    pub axes: Axes,
    pub series: Vec<SeriesPoint>,
}

impl VisualizationSpec {
    fn empty() -> Self {
        Self {
            kind: ChartKind::Table,
            title: "No Data Available".to_string(),
            description: "No results to visualize".to_string(),
            axes: Axes::default(),
            series: Vec::new(),
        }
    }
}

/// Compact display form: `1.2M`, `3.4K`, `12.345`, `0.25`.
pub fn format_number(value: f64) -> String {
    let magnitude = value.abs();
    let sign = if value < 0.0 { "-" } else { "" };
    let body = if magnitude >= 1_000_000.0 {
        format!("{:.1}M", magnitude / 1_000_000.0)
    } else if magnitude >= 1_000.0 {
        format!("{:.1}K", magnitude / 1_000.0)
    } else if magnitude >= 1.0 {
        let text = format!("{:.3}", magnitude);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        format!("{:.2}", magnitude)
    };
    format!("{}{}", sign, body)
}

fn title_for(question: &str, rows: usize) -> String {
    let q = question.to_lowercase();
    let heading = if q.contains("trend") {
        "Trends Analysis"
    } else if q.contains("top") || q.contains("highest") {
        "Top Performers"
    } else if q.contains("count") || q.contains("how many") {
        "Count Analysis"
    } else {
        "Data Analysis Results"
    };
    format!("{} ({} records)", heading, rows)
}

fn number(row: &Record, column: &str) -> f64 {
    row.get(column).and_then(Value::as_number).unwrap_or(0.0)
}

fn label(row: &Record, column: &str) -> String {
    row.get(column)
        .map(|v| v.as_text().into_owned())
        .unwrap_or_default()
}

pub fn build_visualization(table: &ResultTable, question: &str) -> VisualizationSpec {
    let first = match table.rows.first() {
        Some(first) if !table.is_empty_result() => first,
        _ => return VisualizationSpec::empty(),
    };

    let mut numeric = Vec::new();
    let mut categorical = Vec::new();
    for column in &table.columns {
        match first.get(column) {
            Some(value) if value.as_number().is_some() => numeric.push(column.as_str()),
            Some(Value::Text(_)) => categorical.push(column.as_str()),
            _ => {}
        }
    }

    let rows = &table.rows;
    let kind = if !numeric.is_empty() && numeric.len() == table.columns.len() && rows.len() == 1 {
        ChartKind::SummaryStats
    } else if !categorical.is_empty() && !numeric.is_empty() {
        if rows.len() <= BAR_LIMIT {
            ChartKind::BarChart
        } else {
            ChartKind::LineChart
        }
    } else if numeric.len() >= 2 {
        ChartKind::ScatterPlot
    } else {
        ChartKind::Table
    };

    let axes = match kind {
        ChartKind::ScatterPlot => Axes {
            x: Some(numeric[0].to_string()),
            y: Some(numeric[1].to_string()),
        },
        _ => Axes {
            x: categorical
                .first()
                .copied()
                .or_else(|| table.columns.first().map(String::as_str))
                .map(str::to_string),
            y: numeric
                .first()
                .copied()
                .or_else(|| table.columns.get(1).map(String::as_str))
                .map(str::to_string),
        },
    };

    let series = match kind {
        ChartKind::BarChart | ChartKind::LineChart => {
            let take = if kind == ChartKind::BarChart {
                BAR_LIMIT
            } else {
                rows.len()
            };
            rows.iter()
                .take(take)
                .map(|row| SeriesPoint::new(label(row, categorical[0]), number(row, numeric[0])))
                .collect()
        }
        ChartKind::ScatterPlot => rows
            .iter()
            .map(|row| {
                SeriesPoint::new(format_number(number(row, numeric[0])), number(row, numeric[1]))
            })
            .collect(),
        ChartKind::SummaryStats => numeric
            .iter()
            .map(|column| SeriesPoint::new(*column, number(first, column)))
            .collect(),
        ChartKind::Table => Vec::new(),
    };

    VisualizationSpec {
        kind,
        title: title_for(question, table.total_rows),
        description: format!("{} records analyzed", table.total_rows),
        axes,
        series,
    }
}
