use crate::Args;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Manages config directory and config file operations
#[derive(Clone)]
pub struct ConfigManager {
    pub(crate) config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager with a custom config directory (primarily for testing)
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Create a new ConfigManager for the given app name
    pub fn new(app_name: &str) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre!("Could not determine config directory"))?
            .join(app_name);

        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get path to a specific file within the config directory
    pub fn config_path(&self, path: &str) -> PathBuf {
        self.config_dir.join(path)
    }

    pub fn ensure_config_dir(&self) -> Result<()> {
        if !self.config_dir.exists() {
            std::fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// Default configuration template as a string
    pub fn generate_default_config(&self) -> String {
        DEFAULT_CONFIG_TEMPLATE.to_string()
    }

    /// Write default configuration to config file
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let config_path = self.config_path("config.toml");

        if config_path.exists() && !force {
            return Err(eyre!(
                "Config file already exists at {}. Use --force to overwrite.",
                config_path.display()
            ));
        }

        self.ensure_config_dir()?;
        std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)?;

        Ok(config_path)
    }

    /// Read `config.toml` from this directory; defaults when the file is absent.
    pub fn load_config(&self) -> Result<AppConfig> {
        let config_path = self.config_path("config.toml");

        if !config_path.exists() {
            return Ok(AppConfig::default());
        }

        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            eyre!(
                "Failed to read config file at {}: {}",
                config_path.display(),
                e
            )
        })?;

        toml::from_str(&content).map_err(|e| {
            eyre!(
                "Failed to parse config file at {}: {}",
                config_path.display(),
                e
            )
        })
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration format version (for future compatibility)
    pub version: String,
    pub engine: EngineConfig,
    pub data: DataConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Settings the analysis engine reads on every question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Table name written into synthesized SQL
    pub table_name: String,
    /// Result limit when the question names none
    pub default_limit: usize,
    /// Rows beyond this are dropped before analysis
    pub max_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DataConfig {
    pub delimiter: Option<u8>,
    pub has_header: Option<bool>,
    pub infer_schema_rows: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// "table" or "json"
    pub format: String,
    pub max_display_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            engine: EngineConfig::default(),
            data: DataConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            table_name: "DATASET".to_string(),
            default_limit: 10,
            max_rows: 5000,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "table".to_string(),
            max_display_rows: 50,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Option<LevelFilter> {
        self.level.parse().ok()
    }
}

// Configuration loading and merging
impl AppConfig {
    /// Load configuration from all layers (default → user)
    pub fn load(app_name: &str) -> Result<Self> {
        let manager = ConfigManager::new(app_name)?;
        Self::load_from(&manager)
    }

    /// Like [`AppConfig::load`] with an explicit config directory.
    pub fn load_from(manager: &ConfigManager) -> Result<Self> {
        let mut config = AppConfig::default();
        config.merge(manager.load_config()?);
        config.validate()?;
        Ok(config)
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: AppConfig) {
        if other.version != AppConfig::default().version {
            self.version = other.version;
        }

        self.engine.merge(other.engine);
        self.data.merge(other.data);
        self.output.merge(other.output);
        self.logging.merge(other.logging);
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.version.starts_with("0.1") {
            return Err(eyre!(
                "Unsupported config version: {}. Expected 0.1.x",
                self.version
            ));
        }

        if self.engine.table_name.trim().is_empty() {
            return Err(eyre!("table_name must not be empty"));
        }

        if self.engine.default_limit == 0 {
            return Err(eyre!("default_limit must be greater than 0"));
        }

        if self.engine.max_rows == 0 {
            return Err(eyre!("max_rows must be greater than 0"));
        }

        if self.output.max_display_rows == 0 {
            return Err(eyre!("max_display_rows must be greater than 0"));
        }

        match self.output.format.as_str() {
            "table" | "json" => {}
            _ => {
                return Err(eyre!(
                    "Invalid output format: {}. Must be 'table' or 'json'",
                    self.output.format
                ))
            }
        }

        if self.logging.level_filter().is_none() {
            return Err(eyre!(
                "Invalid logging level: {}. Must be one of off, error, warn, info, debug, trace",
                self.logging.level
            ));
        }

        Ok(())
    }

    /// Command-line flags win over file values.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(table_name) = &args.table_name {
            self.engine.table_name = table_name.clone();
        }
        if let Some(max_rows) = args.max_rows {
            self.engine.max_rows = max_rows;
        }
        if let Some(delimiter) = args.delimiter {
            self.data.delimiter = Some(delimiter);
        }
        if let Some(no_header) = args.no_header {
            self.data.has_header = Some(!no_header);
        }
        if let Some(format) = args.format {
            self.output.format = format.as_str().to_string();
        }
        if args.debug {
            self.logging.level = "debug".to_string();
        }
    }
}

// Merge implementations for each config section
impl EngineConfig {
    pub fn merge(&mut self, other: Self) {
        let default = EngineConfig::default();
        if other.table_name != default.table_name {
            self.table_name = other.table_name;
        }
        if other.default_limit != default.default_limit {
            self.default_limit = other.default_limit;
        }
        if other.max_rows != default.max_rows {
            self.max_rows = other.max_rows;
        }
    }
}

impl DataConfig {
    pub fn merge(&mut self, other: Self) {
        if other.delimiter.is_some() {
            self.delimiter = other.delimiter;
        }
        if other.has_header.is_some() {
            self.has_header = other.has_header;
        }
        if other.infer_schema_rows.is_some() {
            self.infer_schema_rows = other.infer_schema_rows;
        }
    }
}

impl OutputConfig {
    pub fn merge(&mut self, other: Self) {
        let default = OutputConfig::default();
        if other.format != default.format {
            self.format = other.format;
        }
        if other.max_display_rows != default.max_display_rows {
            self.max_display_rows = other.max_display_rows;
        }
    }
}

impl LoggingConfig {
    pub fn merge(&mut self, other: Self) {
        if other.level != LoggingConfig::default().level {
            self.level = other.level;
        }
    }
}

// Default configuration template
const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../config/default.toml");
