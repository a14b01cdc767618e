use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::*;
use sheetcols::filename::{file_size_mb, is_within_size_limit, output_filename};
use sheetcols::{ColumnError, ColumnRemover, ColumnSet, ServiceConfig};
use std::path::{Path, PathBuf};

mod formatter;

const DEFAULT_CONFIG: &str = "sheetcols.toml";

#[derive(Parser)]
#[command(name = "sheetcli")]
#[command(about = "Preview and remove columns of Excel workbooks", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log more (-v for progress, -vv for every column)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the columns of the first worksheet with sample values
    Preview {
        /// Path to the Excel file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    /// Remove columns from every worksheet
    Delete {
        /// Path to the Excel file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Comma-separated 1-based column numbers, e.g. "3,5"
        #[arg(long, value_name = "COLUMNS")]
        columns: String,

        /// Output file (defaults to a `_processed` copy next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Show what would be done without writing anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripting
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    if let Err(err) = run(&cli) {
        let exit_code = match err.downcast_ref::<ColumnError>() {
            // Processing failures keep their details in the log
            Some(column_err) => {
                eprintln!("{} {}", "error:".red().bold(), column_err);
                if column_err.is_invalid_input() { 2 } else { 1 }
            }
            None => {
                eprintln!("{} {:#}", "error:".red().bold(), err);
                1
            }
        };
        std::process::exit(exit_code);
    }
}

fn init_logger(verbose: u8) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(log::LevelFilter::Info);
        }
        _ => {
            builder.filter_level(log::LevelFilter::Debug);
        }
    }
    builder.init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match &cli.command {
        Command::Preview { file, format } => {
            let (name, data) = read_upload(file, &config)?;
            let preview = ColumnRemover::with_config(config).preview(&name, &data)?;
            match format {
                OutputFormat::Human => formatter::print_preview(&preview),
                OutputFormat::Json => formatter::print_json(&preview)?,
            }
        }
        Command::Delete {
            file,
            columns,
            output,
            dry_run,
        } => {
            let output_path = match output {
                Some(path) => path.clone(),
                None => {
                    let name = upload_name(file);
                    file.with_file_name(output_filename(&name, &config.output_suffix))
                }
            };

            if *dry_run {
                let columns = ColumnSet::parse(columns)?;
                formatter::print_dry_run(file, &columns, &output_path);
                return Ok(());
            }

            let (name, data) = read_upload(file, &config)?;
            let processed = ColumnRemover::with_config(config).delete_columns(&name, &data, columns)?;
            std::fs::write(&output_path, &processed.bytes)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            formatter::print_report(&processed.report, &output_path);
        }
    }

    Ok(())
}

/// Explicit `--config`, else `sheetcols.toml` in the working directory when present
fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    if let Some(config_path) = path {
        return ServiceConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    let default_config_path = PathBuf::from(DEFAULT_CONFIG);
    if default_config_path.exists() {
        ServiceConfig::from_file(&default_config_path).with_context(|| {
            format!(
                "Failed to load config from {}",
                default_config_path.display()
            )
        })
    } else {
        Ok(ServiceConfig::default())
    }
}

fn upload_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read the document the way an upload arrives: a display name plus its bytes
fn read_upload(path: &Path, config: &ServiceConfig) -> Result<(String, Vec<u8>)> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("Failed to open {}", path.display()))?
        .len();
    if !is_within_size_limit(size, config.max_file_size_mb) {
        return Err(ColumnError::invalid(format!(
            "file is too large: {:.1} MB (limit {} MB)",
            file_size_mb(size),
            config.max_file_size_mb
        ))
        .into());
    }

    let data =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok((upload_name(path), data))
}
