use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use datask::config::{AppConfig, ConfigManager};
use datask::render::{render_analysis, render_json, render_schema};
use datask::source::{load_rows, LoadOptions};
use datask::{Args, Engine, APP_NAME};
use log::LevelFilter;

fn handle_early_exit_flags(args: &Args) -> Result<Option<()>> {
    if args.generate_config {
        let manager = ConfigManager::new(APP_NAME)?;
        let path = manager.write_default_config(args.force)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(Some(()));
    }

    Ok(None)
}

fn load_options(args: &Args, config: &AppConfig) -> LoadOptions {
    let mut options = LoadOptions::from_config(&config.data, config.engine.max_rows);
    if let Some(format) = args.input_format {
        options = options.with_format(format);
    }
    options
}

fn run(args: &Args, config: &AppConfig) -> Result<()> {
    let path = args
        .path
        .as_deref()
        .ok_or_else(|| eyre!("A data file path is required"))?;
    let rows = load_rows(path, &load_options(args, config))?;
    log::info!("loaded {} rows from {}", rows.len(), path.display());

    if args.schema {
        println!("{}", render_schema(&rows));
        return Ok(());
    }

    let engine = Engine::new(config.engine.clone());
    let analysis = match (&args.sql, &args.question) {
        (Some(sql), question) => engine.answer_with_sql(sql, question.as_deref(), &rows, None),
        (None, Some(question)) => engine.answer(question, &rows),
        (None, None) => {
            return Err(eyre!("Nothing to do: pass --question, --sql or --schema"));
        }
    };

    let output = match config.output.format.as_str() {
        "json" => render_json(&analysis)?,
        _ => render_analysis(&analysis, config.output.max_display_rows),
    };
    println!("{}", output);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    color_eyre::install()?;

    if let Some(()) = handle_early_exit_flags(&args)? {
        return Ok(());
    }

    let mut config = AppConfig::load(APP_NAME)?;
    config.apply_args(&args);
    config.validate()?;
    datask::init_logging(
        config
            .logging
            .level_filter()
            .unwrap_or(LevelFilter::Warn),
    );

    run(&args, &config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use datask::FileFormat;

    #[test]
    fn test_args_to_load_options() {
        let args = Args::try_parse_from([
            "datask",
            "rows.txt",
            "--input-format",
            "json",
            "--max-rows",
            "7",
            "--no-header",
            "true",
        ])
        .unwrap();
        let mut config = AppConfig::default();
        config.apply_args(&args);
        let options = load_options(&args, &config);
        assert_eq!(options.format, Some(FileFormat::Json));
        assert_eq!(options.max_rows, Some(7));
        assert_eq!(options.has_header, Some(false));
    }
}
