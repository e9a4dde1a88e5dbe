//! The question-answering pipeline.
//!
//! A question is analyzed into a [`QueryPlan`], written as SQL, and that SQL
//! is what runs: on a live [`SqlExecutor`] when one is supplied and answers,
//! otherwise on the in-memory interpreter. The SQL shown to the user is thus
//! always the SQL that produced the rows.

use crate::analyzer::{analyze_question_with_limit, QueryPlan};
use crate::config::EngineConfig;
use crate::mapping::{map_columns, ColumnMapping, Concept};
use crate::result::ResultTable;
use crate::sql::{self, parse_components};
use crate::synthesizer::{build_query, last_resort, pandas_code, SynthesizedQuery};
use crate::value::RowSet;
use crate::visualization::{build_visualization, VisualizationSpec};
use color_eyre::Result;
use log::{debug, info, warn};
use serde::Serialize;
use std::borrow::Cow;

/// Concepts whose absence makes most questions degrade to fallbacks.
pub const CRITICAL_CONCEPTS: [Concept; 5] = [
    Concept::Sales,
    Concept::Profit,
    Concept::Category,
    Concept::Region,
    Concept::ShipMode,
];

/// A database (or any service) able to run SQL text directly.
pub trait SqlExecutor {
    fn run(&self, sql: &str) -> Result<RowSet>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Rows came from a [`SqlExecutor`]
    Live,
    /// Rows came from the in-memory interpreter
    Simulated,
}

/// Everything produced for one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub question: Option<String>,
    pub plan: Option<QueryPlan>,
    pub mapping: ColumnMapping,
    pub missing_concepts: Vec<Concept>,
    pub sql: String,
    pub pandas_code: Option<String>,
    pub rationale: String,
    pub suggestions: Vec<String>,
    pub result: ResultTable,
    pub visualization: VisualizationSpec,
    pub source: ResultSource,
    /// Rows the question was answered over, after capping
    pub rows_analyzed: usize,
}

pub struct Engine {
    config: EngineConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn capped<'a>(&self, rows: &'a RowSet) -> Cow<'a, RowSet> {
        if rows.len() > self.config.max_rows {
            warn!(
                "row set has {} rows; analyzing the first {}",
                rows.len(),
                self.config.max_rows
            );
            Cow::Owned(rows.head(self.config.max_rows))
        } else {
            Cow::Borrowed(rows)
        }
    }

    fn mapping_for(&self, rows: &RowSet) -> (ColumnMapping, Vec<Concept>) {
        let mapping = map_columns(&rows.column_names());
        let missing = mapping.missing(&CRITICAL_CONCEPTS);
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(Concept::as_str).collect();
            warn!("no column found for: {}", names.join(", "));
        }
        (mapping, missing)
    }

    /// The plan a question resolves to over `rows`, without running anything.
    pub fn plan(&self, question: &str, rows: &RowSet) -> QueryPlan {
        let rows = self.capped(rows);
        let columns = rows.column_names();
        let mapping = map_columns(&columns);
        analyze_question_with_limit(question, &columns, &mapping, self.config.default_limit)
    }

    /// Answers `question` over `rows` with the in-memory interpreter.
    pub fn answer(&self, question: &str, rows: &RowSet) -> Analysis {
        self.answer_with_executor(question, rows, None)
    }

    pub fn answer_with_executor(
        &self,
        question: &str,
        rows: &RowSet,
        executor: Option<&dyn SqlExecutor>,
    ) -> Analysis {
        let rows = self.capped(rows);
        let columns = rows.column_names();
        let (mapping, missing_concepts) = self.mapping_for(&rows);

        let plan = analyze_question_with_limit(
            question,
            &columns,
            &mapping,
            self.config.default_limit,
        );
        let mut query = build_query(&plan, rows.len(), &self.config.table_name, &mapping);
        if let Err(e) = parse_components(&query.sql) {
            warn!("synthesized query is unreadable ({}); using last resort", e);
            query = last_resort(&self.config.table_name);
        }
        info!("{} -> {}", question, query.sql);

        self.finish(Some(question), Some(plan), mapping, missing_concepts, query, &rows, executor)
    }

    /// Runs externally supplied SQL (for example from a language model)
    /// through the same execution path as synthesized SQL.
    pub fn answer_with_sql(
        &self,
        sql_text: &str,
        question: Option<&str>,
        rows: &RowSet,
        executor: Option<&dyn SqlExecutor>,
    ) -> Analysis {
        let rows = self.capped(rows);
        let (mapping, missing_concepts) = self.mapping_for(&rows);
        let query = SynthesizedQuery {
            sql: sql_text.trim().to_string(),
            rationale: format!(
                "• Executing supplied query\n• Processing {} records",
                rows.len()
            ),
            suggestions: Vec::new(),
        };
        self.finish(question, None, mapping, missing_concepts, query, &rows, executor)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        question: Option<&str>,
        plan: Option<QueryPlan>,
        mapping: ColumnMapping,
        missing_concepts: Vec<Concept>,
        query: SynthesizedQuery,
        rows: &RowSet,
        executor: Option<&dyn SqlExecutor>,
    ) -> Analysis {
        let (result, source) = run_query(&query.sql, rows, executor);
        let pandas = parse_components(&query.sql).ok().map(|c| pandas_code(&c));
        let visualization = build_visualization(&result, question.unwrap_or_default());
        debug!(
            "{} result rows ({:?}), chart {}",
            result.total_rows,
            source,
            visualization.kind.as_str()
        );

        Analysis {
            question: question.map(str::to_string),
            plan,
            mapping,
            missing_concepts,
            sql: query.sql,
            pandas_code: pandas,
            rationale: query.rationale,
            suggestions: query.suggestions,
            result,
            visualization,
            source,
            rows_analyzed: rows.len(),
        }
    }
}

/// Live execution when available and non-empty, otherwise the interpreter.
fn run_query(
    sql_text: &str,
    rows: &RowSet,
    executor: Option<&dyn SqlExecutor>,
) -> (ResultTable, ResultSource) {
    if let Some(executor) = executor {
        match executor.run(sql_text) {
            Ok(live) if !live.is_empty() => {
                return (
                    ResultTable::from_records(live.into_rows()),
                    ResultSource::Live,
                )
            }
            Ok(_) => warn!("live query returned no rows; interpreting locally"),
            Err(e) => warn!("live query failed ({}); interpreting locally", e),
        }
    }
    (sql::execute(sql_text, rows), ResultSource::Simulated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Intent;
    use crate::value::{Record, Value};
    use crate::visualization::ChartKind;
    use color_eyre::eyre::eyre;

    fn rows() -> RowSet {
        RowSet::new(vec![
            Record::from_pairs([
                ("REGION", Value::from("East")),
                ("CATEGORY", Value::from("Furniture")),
                ("SALES", Value::from(100.0)),
            ]),
            Record::from_pairs([
                ("REGION", Value::from("East")),
                ("CATEGORY", Value::from("Technology")),
                ("SALES", Value::from(50.0)),
            ]),
            Record::from_pairs([
                ("REGION", Value::from("West")),
                ("CATEGORY", Value::from("Furniture")),
                ("SALES", Value::from(30.0)),
            ]),
        ])
    }

    struct Failing;

    impl SqlExecutor for Failing {
        fn run(&self, _sql: &str) -> Result<RowSet> {
            Err(eyre!("connection refused"))
        }
    }

    struct Fixed(RowSet);

    impl SqlExecutor for Fixed {
        fn run(&self, _sql: &str) -> Result<RowSet> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_answer_runs_displayed_sql() {
        let analysis = Engine::default().answer("top regions by sales", &rows());
        assert_eq!(analysis.source, ResultSource::Simulated);
        assert_eq!(analysis.result, sql::execute(&analysis.sql, &rows()));
        assert_eq!(analysis.result.rows[0].get("REGION"), Some(&Value::from("East")));
        assert_eq!(analysis.result.rows[0].get("sum_sales"), Some(&Value::from(150.0)));
        assert_eq!(analysis.visualization.kind, ChartKind::BarChart);
        assert_eq!(analysis.suggestions.len(), 2);
        assert!(analysis.pandas_code.is_some());
    }

    #[test]
    fn test_missing_concepts_reported() {
        let analysis = Engine::default().answer("anything", &rows());
        assert_eq!(
            analysis.missing_concepts,
            vec![Concept::Profit, Concept::ShipMode]
        );
        assert_eq!(analysis.plan.map(|p| p.intent), Some(Intent::Fallback));
    }

    #[test]
    fn test_failing_executor_falls_back() {
        let analysis = Engine::default().answer_with_executor("how many regions", &rows(), Some(&Failing));
        assert_eq!(analysis.source, ResultSource::Simulated);
        assert_eq!(analysis.result.total_rows, 2);
    }

    #[test]
    fn test_live_rows_used() {
        let live = RowSet::new(vec![Record::from_pairs([("total_count", Value::from(99))])]);
        let analysis =
            Engine::default().answer_with_executor("how many regions", &rows(), Some(&Fixed(live)));
        assert_eq!(analysis.source, ResultSource::Live);
        assert_eq!(analysis.result.rows[0].get("total_count"), Some(&Value::from(99)));

        let empty = Fixed(RowSet::default());
        let analysis = Engine::default().answer_with_executor("how many regions", &rows(), Some(&empty));
        assert_eq!(analysis.source, ResultSource::Simulated);
    }

    #[test]
    fn test_rows_are_capped() {
        let engine = Engine::new(EngineConfig {
            max_rows: 2,
            ..EngineConfig::default()
        });
        let analysis = engine.answer("how many regions", &rows());
        assert_eq!(analysis.rows_analyzed, 2);
        assert_eq!(analysis.result.total_rows, 1);
    }

    #[test]
    fn test_supplied_sql() {
        let analysis = Engine::default().answer_with_sql(
            "SELECT CATEGORY, COUNT(*) AS n FROM orders GROUP BY CATEGORY ORDER BY n DESC;",
            None,
            &rows(),
            None,
        );
        assert!(analysis.plan.is_none());
        assert!(analysis.suggestions.is_empty());
        assert_eq!(analysis.result.rows[0].get("CATEGORY"), Some(&Value::from("Furniture")));
        assert_eq!(analysis.result.rows[0].get("n"), Some(&Value::from(2)));

        let analysis = Engine::default().answer_with_sql("DROP TABLE orders", None, &rows(), None);
        assert!(analysis.result.is_empty_result());
        assert!(analysis.pandas_code.is_none());
    }

    #[test]
    fn test_plan_uses_default_limit() {
        let engine = Engine::new(EngineConfig {
            default_limit: 4,
            ..EngineConfig::default()
        });
        assert_eq!(engine.plan("top regions", &rows()).limit, 4);
    }
}
