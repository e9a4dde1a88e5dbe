//! Ask questions of tabular data.
//!
//! A free-text question is mapped onto the dataset's columns, turned into a
//! [`QueryPlan`], written as SQL and executed, either by a live database
//! behind [`SqlExecutor`] or by the in-memory interpreter in [`sql`]. The
//! result comes back as a [`ResultTable`] plus a [`VisualizationSpec`].
//!
//! ```no_run
//! use datask::{Engine, source};
//! # fn main() -> color_eyre::Result<()> {
//! let rows = source::load_rows("orders.csv".as_ref(), &source::LoadOptions::new())?;
//! let analysis = Engine::default().answer("What are the top 3 regions by sales?", &rows);
//! println!("{}", analysis.sql);
//! # Ok(())
//! # }
//! ```

use log::LevelFilter;

pub mod analyzer;
pub mod config;
pub mod engine;
pub mod mapping;
pub mod render;
pub mod result;
pub mod source;
pub mod sql;
pub mod synthesizer;
pub mod value;
pub mod visualization;

pub use analyzer::{analyze_question, Intent, QueryPlan};
pub use config::{AppConfig, ConfigManager, EngineConfig};
pub use datask_cli::{Args, FileFormat, OutputFormat};
pub use engine::{Analysis, Engine, ResultSource, SqlExecutor};
pub use mapping::{map_columns, ColumnMapping, Concept};
pub use result::ResultTable;
pub use sql::{execute, parse_components, ParsedSqlComponents, SqlError};
pub use synthesizer::{build_query, SynthesizedQuery};
pub use value::{Record, RowSet, Value};
pub use visualization::{build_visualization, ChartKind, VisualizationSpec};

/// Application name used for the config directory
pub const APP_NAME: &str = "datask";

/// Installs the logger: this crate logs at `level`, and `RUST_LOG` directives
/// are applied on top. Safe to call more than once.
pub fn init_logging(level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_module(APP_NAME, level)
        .parse_default_env()
        .is_test(false)
        .try_init();
}
