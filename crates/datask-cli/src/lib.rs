//! Shared CLI definitions for datask.
//!
//! Used by the main application and by the build script (manpage) and
//! gen_docs binary (command-line-options markdown).

use clap::{CommandFactory, Parser, ValueEnum};
use std::path::{Path, PathBuf};

/// File format for row-set files.
/// When `--input-format` is not specified, format is auto-detected from the file extension.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FileFormat {
    /// Comma-separated values
    Csv,
    /// Tab-separated values
    Tsv,
    /// Parquet columnar format
    Parquet,
    /// JSON array of flat records
    Json,
}

impl FileFormat {
    /// Detect file format from path extension. Returns None when extension is missing or unknown.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Parse format from extension string (e.g. "parquet", "csv").
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "tsv" => Some(Self::Tsv),
            "parquet" => Some(Self::Parquet),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// How an analysis is written to stdout
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned text table with rationale, SQL and chart summary
    Table,
    /// The full analysis serialized as JSON
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Json => "json",
        }
    }
}

/// Command-line arguments for datask
#[derive(Clone, Parser, Debug)]
#[command(
    name = "datask",
    version,
    about = "Ask natural-language questions of a tabular dataset"
)]
pub struct Args {
    /// Path to the data file to analyze (CSV, TSV, Parquet or a JSON array of records)
    #[arg(required_unless_present = "generate_config", value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Natural-language question, e.g. "What are the top 3 regions by sales?"
    #[arg(short = 'q', long = "question", conflicts_with = "sql")]
    pub question: Option<String>,

    /// Run this SQL against the data instead of synthesizing one from a question
    #[arg(long = "sql")]
    pub sql: Option<String>,

    /// Print the inferred schema and concept mapping and exit
    #[arg(long = "schema", action)]
    pub schema: bool,

    /// Output format (default: table)
    #[arg(long = "format", value_enum)]
    pub format: Option<OutputFormat>,

    /// Force input file format. By default format is auto-detected from the file extension.
    #[arg(long = "input-format", value_enum)]
    pub input_format: Option<FileFormat>,

    /// Table name used in synthesized SQL (default: DATASET)
    #[arg(long = "table-name")]
    pub table_name: Option<String>,

    /// Maximum number of rows loaded from the file (default: 5000)
    #[arg(long = "max-rows", value_name = "N")]
    pub max_rows: Option<usize>,

    /// Specify the delimiter to use when reading a delimited text file
    #[arg(long = "delimiter")]
    pub delimiter: Option<u8>,

    /// Specify that the file has no header
    #[arg(long = "no-header")]
    pub no_header: Option<bool>,

    /// Enable debug logging of plans and generated SQL
    #[arg(long = "debug", action)]
    pub debug: bool,

    /// Generate default configuration file at ~/.config/datask/config.toml
    #[arg(long = "generate-config", action)]
    pub generate_config: bool,

    /// Force overwrite existing config file when using --generate-config
    #[arg(long = "force", requires = "generate_config", action)]
    pub force: bool,
}

/// Escape `|` and newlines for use in markdown table cells.
fn escape_table_cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\n', '\r'], " ")
}

/// Render command-line options as markdown.
pub fn render_options_markdown() -> String {
    let mut cmd = Args::command();
    cmd.build();
    let mut out = String::from("# Command Line Options\n\n");
    out.push_str("## Usage\n\n```\n");
    out.push_str(&cmd.render_usage().to_string());
    out.push_str("\n```\n\n");
    out.push_str("## Options\n\n");
    out.push_str("| Option | Description |\n");
    out.push_str("|--------|-------------|\n");

    for arg in cmd.get_arguments() {
        let id = arg.get_id().as_ref().to_string();
        if id == "help" || id == "version" {
            continue;
        }
        let placeholder: String = arg
            .get_value_names()
            .map(|names| {
                names
                    .iter()
                    .map(|n: &clap::builder::Str| format!("<{}>", n.as_ref() as &str))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();
        let option_str = if arg.is_positional() {
            if arg.is_required_set() {
                placeholder
            } else {
                format!("[{placeholder}]")
            }
        } else {
            let mut parts = Vec::new();
            if let Some(s) = arg.get_short() {
                parts.push(format!("-{s}"));
            }
            if let Some(l) = arg.get_long() {
                parts.push(format!("--{l}"));
            }
            let op = parts.join(", ");
            if arg.get_action().takes_values() && !placeholder.is_empty() {
                format!("{op} {placeholder}")
            } else {
                op
            }
        };

        let help = arg
            .get_help()
            .map(|h| escape_table_cell(&h.to_string()))
            .unwrap_or_else(|| "-".to_string());

        out.push_str(&format!("| `{option_str}` | {help} |\n"));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_format_from_path() {
        assert_eq!(
            FileFormat::from_path(Path::new("data.parquet")),
            Some(FileFormat::Parquet)
        );
        assert_eq!(
            FileFormat::from_path(Path::new("data.CSV")),
            Some(FileFormat::Csv)
        );
        assert_eq!(
            FileFormat::from_path(Path::new("rows.json")),
            Some(FileFormat::Json)
        );
        assert_eq!(FileFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_question_and_sql_conflict() {
        let result = Args::try_parse_from(["datask", "data.csv", "-q", "how many", "--sql", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_generate_config_needs_no_path() {
        let args = Args::try_parse_from(["datask", "--generate-config"]).unwrap();
        assert!(args.generate_config);
        assert!(args.path.is_none());
    }

    #[test]
    fn test_options_markdown_lists_question() {
        let md = render_options_markdown();
        assert!(md.contains("--question"));
        assert!(md.contains("| Option | Description |"));
    }
}
