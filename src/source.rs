//! Row-set providers: delimited text and Parquet through polars, JSON
//! records through serde_json.

use crate::config::DataConfig;
use crate::value::{Record, RowSet, Value};
use crate::FileFormat;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use log::debug;
use polars::prelude::*;
use std::path::Path;
use std::sync::Arc;

/// How a data file is read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadOptions {
    /// Overrides detection from the file extension
    pub format: Option<FileFormat>,
    pub delimiter: Option<u8>,
    pub has_header: Option<bool>,
    pub infer_schema_rows: Option<usize>,
    pub max_rows: Option<usize>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(data: &DataConfig, max_rows: usize) -> Self {
        Self {
            format: None,
            delimiter: data.delimiter,
            has_header: data.has_header,
            infer_schema_rows: data.infer_schema_rows,
            max_rows: Some(max_rows),
        }
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_has_header(mut self, has_header: bool) -> Self {
        self.has_header = Some(has_header);
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }
}

/// Reads `path` into a row set, detecting the format from its extension
/// unless `options.format` is set.
pub fn load_rows(path: &Path, options: &LoadOptions) -> Result<RowSet> {
    if !path.exists() {
        return Err(eyre!("File not found: {}", path.display()));
    }
    let format = options
        .format
        .or_else(|| FileFormat::from_path(path))
        .ok_or_else(|| {
            eyre!(
                "Cannot detect the format of {}; use --input-format",
                path.display()
            )
        })?;
    debug!("loading {} as {:?}", path.display(), format);

    let rows = match format {
        FileFormat::Json => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
            rows_from_json(&text)?
        }
        FileFormat::Parquet => {
            let pl_path = PlPath::Local(Arc::from(path));
            let lf = LazyFrame::scan_parquet(pl_path, Default::default())?;
            collect_rows(lf, options.max_rows)?
        }
        FileFormat::Csv | FileFormat::Tsv => {
            let default_delimiter = if format == FileFormat::Tsv { b'\t' } else { b',' };
            let pl_path = PlPath::Local(Arc::from(path));
            let mut reader = LazyCsvReader::new(pl_path)
                .with_separator(options.delimiter.unwrap_or(default_delimiter));
            if let Some(has_header) = options.has_header {
                reader = reader.with_has_header(has_header);
            }
            if let Some(n) = options.infer_schema_rows {
                reader = reader.with_infer_schema_length(Some(n));
            }
            collect_rows(reader.finish()?, options.max_rows)?
        }
    };

    Ok(match options.max_rows {
        Some(max) if rows.len() > max => rows.head(max),
        _ => rows,
    })
}

fn collect_rows(lf: LazyFrame, max_rows: Option<usize>) -> Result<RowSet> {
    let lf = match max_rows {
        Some(max) => lf.limit(max as IdxSize),
        None => lf,
    };
    rows_from_dataframe(&lf.collect()?)
}

fn is_numeric_type(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Converts a DataFrame column by column. Numbers become [`Value::Number`],
/// booleans [`Value::Bool`], everything else (dates included) its string form.
pub fn rows_from_dataframe(df: &DataFrame) -> Result<RowSet> {
    let mut records = vec![Record::new(); df.height()];

    for col in df.get_columns() {
        let name = col.name().to_string();
        let series = col.as_materialized_series();
        let cells: Vec<Value> = if is_numeric_type(series.dtype()) {
            let cast = series.cast(&DataType::Float64)?;
            cast.f64()?
                .into_iter()
                .map(|v| v.map(Value::Number).unwrap_or(Value::Null))
                .collect()
        } else if series.dtype() == &DataType::Boolean {
            series
                .bool()?
                .into_iter()
                .map(|v| v.map(Value::Bool).unwrap_or(Value::Null))
                .collect()
        } else {
            let cast = series.cast(&DataType::String)?;
            cast.str()?
                .into_iter()
                .map(|v| v.map(Value::from).unwrap_or(Value::Null))
                .collect()
        };
        for (record, cell) in records.iter_mut().zip(cells) {
            record.insert(name.clone(), cell);
        }
    }

    Ok(RowSet::new(records))
}

/// Accepts a JSON array of flat objects, or an object holding such an array
/// under `"data"` or `"rows"`.
pub fn rows_from_json(text: &str) -> Result<RowSet> {
    let parsed: serde_json::Value =
        serde_json::from_str(text).map_err(|e| eyre!("Invalid JSON: {}", e))?;

    let items = match parsed {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("data").or_else(|| map.remove("rows")) {
            Some(serde_json::Value::Array(items)) => items,
            _ => return Err(eyre!("JSON object has no \"data\" or \"rows\" array")),
        },
        _ => return Err(eyre!("JSON input must be an array of records")),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            serde_json::Value::Object(fields) => Ok(Record::from_pairs(
                fields.into_iter().map(|(k, v)| (k, Value::from(v))),
            )),
            other => Err(eyre!("Record {} is not an object: {}", i, other)),
        })
        .collect::<Result<Vec<_>>>()
        .map(RowSet::new)
}
