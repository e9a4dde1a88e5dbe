//! Question analysis: free text to [`QueryPlan`].
//!
//! Intent rules are tried in a fixed order and the first match wins:
//! count, ranking, "X by Y", comparison, then the exploratory fallback.
//! Filters (category, date, region) and the result limit are extracted
//! independently of the intent. Nothing here fails; a concept that the
//! dataset lacks simply narrows the plan.

use crate::mapping::{ColumnMapping, Concept};
use crate::sql::{aggregate_alias, quote_identifier, AggregateFunction, SortDirection};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

pub const DEFAULT_LIMIT: usize = 10;

/// Marker for "all rows" in [`QueryPlan::aggregate_column`].
pub const ALL_ROWS: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Count,
    Ranking,
    MetricByDimension,
    Comparison,
    Fallback,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Count => "count",
            Intent::Ranking => "ranking",
            Intent::MetricByDimension => "metric_by_dimension",
            Intent::Comparison => "comparison",
            Intent::Fallback => "fallback",
        }
    }
}

/// What to compute for a question, before it is written as SQL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    pub intent: Intent,
    pub group_by: Option<String>,
    /// Column to aggregate, or [`ALL_ROWS`]
    pub aggregate_column: Option<String>,
    pub aggregate_function: AggregateFunction,
    /// Conjunction of simple predicates joined by " AND "
    pub where_clause: Option<String>,
    pub order_direction: SortDirection,
    pub limit: usize,
}

impl QueryPlan {
    pub fn fallback(limit: usize) -> Self {
        Self {
            intent: Intent::Fallback,
            group_by: None,
            aggregate_column: None,
            aggregate_function: AggregateFunction::Sum,
            where_clause: None,
            order_direction: SortDirection::Desc,
            limit,
        }
    }

    /// The aggregated column, or `None` when the plan counts rows.
    pub fn aggregate_argument(&self) -> Option<&str> {
        self.aggregate_column.as_deref().filter(|c| *c != ALL_ROWS)
    }

    /// Output name of the primary aggregate (`total_count`, `sum_sales`, ...).
    pub fn aggregate_alias(&self) -> Option<String> {
        self.aggregate_column
            .as_ref()
            .map(|_| aggregate_alias(self.aggregate_function, self.aggregate_argument()))
    }
}

/// Only called from `Lazy` initializers below.
fn regex(pattern: &str) -> Regex {
    // patterns are static
    Regex::new(pattern).expect("valid regex")
}

static COUNT_WORDS: Lazy<Regex> = Lazy::new(|| regex(r"\b(how many|counts?|number of|total)\b"));
static RANKING_WORDS: Lazy<Regex> =
    Lazy::new(|| regex(r"\b(most|highest|top|best|worst|lowest)\b"));
static ASCENDING_WORDS: Lazy<Regex> = Lazy::new(|| regex(r"\b(worst|lowest)\b"));
static COMPARISON_WORDS: Lazy<Regex> =
    Lazy::new(|| regex(r"\b(compare|comparing|comparison|versus|vs|average|avg)\b"));
static COUNT_METRIC_WORDS: Lazy<Regex> = Lazy::new(|| regex(r"\b(counts?|number)\b"));
static YEAR: Lazy<Regex> = Lazy::new(|| regex(r"\b(19|20)\d{2}\b"));
static MONTH: Lazy<Regex> = Lazy::new(|| {
    regex(r"\b(january|february|march|april|may|june|july|august|september|october|november|december)\b")
});
static LIMIT_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        regex(r"\btop\s+(\d+)\b"),
        regex(r"\b(\d+)\s+(top|best|highest|most)\b"),
    ]
});

/// Dimension keywords in priority order.
static DIMENSIONS: Lazy<Vec<(Concept, Regex)>> = Lazy::new(|| {
    [
        (Concept::Customer, r"\bcustomers?\b"),
        (Concept::Order, r"\borders?\b"),
        (Concept::Region, r"\bregions?\b"),
        (Concept::Category, r"\bcategor(y|ies)\b"),
        (Concept::Product, r"\bproducts?\b"),
        (Concept::Segment, r"\bsegments?\b"),
        (Concept::ShipMode, r"\b(ship_mode|ship modes?|shipping)\b"),
        (Concept::City, r"\bcit(y|ies)\b"),
        (Concept::State, r"\bstates?\b"),
        (Concept::Country, r"\bcountr(y|ies)\b"),
    ]
    .into_iter()
    .map(|(concept, pattern)| (concept, regex(pattern)))
    .collect()
});

/// Metric keywords in priority order, with the aggregate each implies.
static METRICS: Lazy<Vec<(Concept, AggregateFunction, Regex)>> = Lazy::new(|| {
    [
        (Concept::Sales, AggregateFunction::Sum, r"\b(sales|revenue)"),
        (Concept::Profit, AggregateFunction::Sum, r"\bprofit"),
        (Concept::Quantity, AggregateFunction::Sum, r"\b(quantit|units\b)"),
        (Concept::Discount, AggregateFunction::Avg, r"\bdiscount"),
    ]
    .into_iter()
    .map(|(concept, function, pattern)| (concept, function, regex(pattern)))
    .collect()
});

const CATEGORICAL_FALLBACK: [Concept; 9] = [
    Concept::Category,
    Concept::Region,
    Concept::Customer,
    Concept::Product,
    Concept::Segment,
    Concept::ShipMode,
    Concept::City,
    Concept::State,
    Concept::Country,
];

const NUMERIC_FALLBACK: [Concept; 4] = [
    Concept::Sales,
    Concept::Profit,
    Concept::Quantity,
    Concept::Discount,
];

const CATEGORY_FILTERS: [(&str, &str); 3] = [
    ("office supplies", "Office Supplies"),
    ("furniture", "Furniture"),
    ("technology", "Technology"),
];

static REGION_FILTERS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\bcentral\b", "Central"),
        (r"\beast\b", "East"),
        (r"\bwest\b", "West"),
        (r"\bsouth\b", "South"),
    ]
    .into_iter()
    .map(|(pattern, value)| (regex(pattern), value))
    .collect()
});

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Concept lookups restricted to columns that exist in the current data.
struct Resolver<'a> {
    mapping: &'a ColumnMapping,
    columns: Vec<&'a str>,
}

impl<'a> Resolver<'a> {
    fn column(&self, concept: Concept) -> Option<String> {
        self.mapping
            .get(concept)
            .filter(|c| self.columns.contains(c))
            .map(str::to_string)
    }

    fn dimension(&self, text: &str) -> Option<String> {
        DIMENSIONS
            .iter()
            .filter(|(_, pattern)| pattern.is_match(text))
            .find_map(|(concept, _)| self.column(*concept))
    }

    fn first_categorical(&self) -> Option<String> {
        CATEGORICAL_FALLBACK.iter().find_map(|c| self.column(*c))
    }

    fn metric(&self, text: &str) -> Option<(String, AggregateFunction)> {
        METRICS
            .iter()
            .filter(|(_, _, pattern)| pattern.is_match(text))
            .find_map(|(concept, function, _)| self.column(*concept).map(|c| (c, *function)))
    }

    fn first_numeric(&self) -> Option<String> {
        NUMERIC_FALLBACK.iter().find_map(|c| self.column(*c))
    }

    /// Metric from the text, else the first numeric concept summed, else a row count.
    fn metric_or_default(&self, text: &str) -> (String, AggregateFunction) {
        self.metric(text)
            .or_else(|| self.first_numeric().map(|c| (c, AggregateFunction::Sum)))
            .unwrap_or_else(|| (ALL_ROWS.to_string(), AggregateFunction::Count))
    }
}

pub fn analyze_question<S: AsRef<str>>(
    question: &str,
    columns: &[S],
    mapping: &ColumnMapping,
) -> QueryPlan {
    analyze_question_with_limit(question, columns, mapping, DEFAULT_LIMIT)
}

/// Like [`analyze_question`] with a configurable default result limit.
pub fn analyze_question_with_limit<S: AsRef<str>>(
    question: &str,
    columns: &[S],
    mapping: &ColumnMapping,
    default_limit: usize,
) -> QueryPlan {
    let q = question.to_lowercase();
    let resolver = Resolver {
        mapping,
        columns: columns.iter().map(AsRef::as_ref).collect(),
    };
    debug!("analyzing {:?} over columns {:?}", q, resolver.columns);

    let mut plan = if COUNT_WORDS.is_match(&q) {
        count_plan(&q, &resolver, default_limit)
    } else if RANKING_WORDS.is_match(&q) {
        ranking_plan(&q, &resolver, default_limit)
    } else if let Some((metric_text, dimension_text)) = q.split_once(" by ") {
        by_plan(metric_text, dimension_text, &resolver, default_limit)
    } else if COMPARISON_WORDS.is_match(&q) {
        comparison_plan(&q, &resolver, default_limit)
    } else {
        QueryPlan::fallback(default_limit)
    };

    plan.where_clause = extract_filters(&q, &resolver);
    if let Some(limit) = extract_limit(&q) {
        plan.limit = limit;
    }
    debug!("plan: {:?}", plan);
    plan
}

fn count_plan(q: &str, resolver: &Resolver, limit: usize) -> QueryPlan {
    QueryPlan {
        intent: Intent::Count,
        group_by: resolver.dimension(q),
        aggregate_column: Some(ALL_ROWS.to_string()),
        aggregate_function: AggregateFunction::Count,
        where_clause: None,
        order_direction: SortDirection::Desc,
        limit,
    }
}

fn ranking_plan(q: &str, resolver: &Resolver, limit: usize) -> QueryPlan {
    let (column, function) = resolver.metric_or_default(q);
    QueryPlan {
        intent: Intent::Ranking,
        group_by: resolver
            .dimension(q)
            .or_else(|| resolver.first_categorical()),
        aggregate_column: Some(column),
        aggregate_function: function,
        where_clause: None,
        order_direction: if ASCENDING_WORDS.is_match(q) {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        },
        limit,
    }
}

fn by_plan(metric_text: &str, dimension_text: &str, resolver: &Resolver, limit: usize) -> QueryPlan {
    let group_by = resolver.dimension(dimension_text);
    let metric = resolver.metric(metric_text).or_else(|| {
        COUNT_METRIC_WORDS
            .is_match(metric_text)
            .then(|| (ALL_ROWS.to_string(), AggregateFunction::Count))
    });
    if group_by.is_none() && metric.is_none() {
        debug!("'by' question resolved neither metric nor dimension");
        return QueryPlan::fallback(limit);
    }
    let (column, function) = metric.unwrap_or_else(|| resolver.metric_or_default(""));
    QueryPlan {
        intent: Intent::MetricByDimension,
        group_by,
        aggregate_column: Some(column),
        aggregate_function: function,
        where_clause: None,
        order_direction: SortDirection::Desc,
        limit,
    }
}

fn comparison_plan(q: &str, resolver: &Resolver, limit: usize) -> QueryPlan {
    let group_by = resolver
        .dimension(q)
        .or_else(|| resolver.first_categorical());
    let column = resolver
        .metric(q)
        .map(|(column, _)| column)
        .or_else(|| resolver.first_numeric());
    match (group_by, column) {
        (Some(group_by), Some(column)) => QueryPlan {
            intent: Intent::Comparison,
            group_by: Some(group_by),
            aggregate_column: Some(column),
            aggregate_function: AggregateFunction::Avg,
            where_clause: None,
            order_direction: SortDirection::Desc,
            limit,
        },
        _ => {
            debug!("comparison question lacks a dimension or metric");
            QueryPlan::fallback(limit)
        }
    }
}

/// Category, then date, then region predicates, joined with " AND ".
fn extract_filters(q: &str, resolver: &Resolver) -> Option<String> {
    let mut predicates = Vec::new();

    if let Some(category) = resolver.column(Concept::Category) {
        if let Some((_, value)) = CATEGORY_FILTERS.iter().find(|(word, _)| q.contains(word)) {
            predicates.push(format!("{} = '{}'", quote_identifier(&category), value));
        }
    }

    if let (Some(date), Some(year)) = (resolver.column(Concept::Date), YEAR.find(q)) {
        let date = quote_identifier(&date);
        predicates.push(format!("EXTRACT(YEAR FROM {}) = {}", date, year.as_str()));
        let month = MONTH
            .find(q)
            .and_then(|m| MONTHS.iter().position(|name| *name == m.as_str()));
        if let Some(index) = month {
            predicates.push(format!("EXTRACT(MONTH FROM {}) = {}", date, index + 1));
        }
    }

    if let Some(region) = resolver.column(Concept::Region) {
        if let Some((_, value)) = REGION_FILTERS.iter().find(|(pattern, _)| pattern.is_match(q)) {
            predicates.push(format!("{} = '{}'", quote_identifier(&region), value));
        }
    }

    if predicates.is_empty() {
        None
    } else {
        Some(predicates.join(" AND "))
    }
}

/// "top N" or "N top/best/highest/most".
fn extract_limit(q: &str) -> Option<usize> {
    LIMIT_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(q))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .filter(|n| *n > 0)
}
