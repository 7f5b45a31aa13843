// ABOUTME: Command-line entry point for SQL Server records
// ABOUTME: Loads an environment's connection config and runs one database task

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use sql_server_record::{ConfigFile, Delimiter, ScriptSource, SqlServerRecord, DEFAULT_MARKER};

/// SQL Server database tasks
#[derive(Parser, Debug)]
#[command(name = "sql-server-record")]
#[command(about = "Create, drop, set up, and load SQL Server databases", long_about = None)]
struct Args {
    /// Connection config file, keyed by environment
    #[arg(short, long, default_value_os_t = ConfigFile::default_path())]
    config: PathBuf,

    /// Environment section to use
    #[arg(short, long, default_value = "development")]
    env: String,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print script outcomes as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the configured database
    Create,
    /// Drop the configured database if it exists
    Drop,
    /// Create the database, switch to it, and load structure files
    Setup { files: Vec<PathBuf> },
    /// Drop, then set up again
    Reset { files: Vec<PathBuf> },
    /// Load structure files split on GO lines
    Structure { files: Vec<PathBuf> },
    /// Load data files with one statement per line
    Data { files: Vec<PathBuf> },
    /// Load files with an explicit delimiter
    Script {
        /// Treat every line as a statement
        #[arg(long)]
        line_break: bool,
        /// Batch separator token
        #[arg(long, default_value = DEFAULT_MARKER)]
        marker: String,
        files: Vec<PathBuf>,
    },
}

fn init_logger(log_level: &str) {
    let mut logger = env_logger::builder();
    logger.format_target(false);
    if env::var("RUST_LOG").is_err() {
        logger.parse_filters(log_level);
    }
    logger.init();
}

fn sources(files: Vec<PathBuf>) -> Vec<ScriptSource> {
    files.into_iter().map(ScriptSource::from).collect()
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logger(&args.log_level);

    let file = ConfigFile::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let config = file.config_for(&args.env)?.clone();

    let mut record = SqlServerRecord::establish(config)
        .await
        .context("Failed to connect to SQL Server")?;
    let version = record.executor_mut().server_version().await?;
    log::info!("Connected: {}", version.lines().next().unwrap_or_default());

    let outcomes = match args.command {
        Command::Create => {
            record.create_database().await?;
            Vec::new()
        }
        Command::Drop => {
            record.drop_database().await?;
            Vec::new()
        }
        Command::Setup { files } => record.setup_database_with(sources(files)).await?,
        Command::Reset { files } => record.reset_database_with(sources(files)).await?,
        Command::Structure { files } => {
            record.use_database().await?;
            record.load_structure(sources(files)).await
        }
        Command::Data { files } => {
            record.use_database().await?;
            record.load_data(sources(files)).await
        }
        Command::Script {
            line_break,
            marker,
            files,
        } => {
            let delimiter = if line_break {
                Delimiter::LineBreak
            } else {
                Delimiter::marker(&marker)?
            };
            record.use_database().await?;
            record.load_scripts(sources(files), &delimiter).await
        }
    };

    record.close().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    }

    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
    if failed > 0 {
        log::error!("{} of {} scripts failed", failed, outcomes.len());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
