use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recall::config::{Config, Overrides, Settings};

mod cli;

use cli::commands;

/// The main CLI command line interface.
#[derive(Parser)]
#[command(name = "recall")]
#[command(version)]
#[command(about = "Organizational memory for AI coding assistants")]
#[command(long_about = "Recall stores patterns, failures, decisions and context in a\n\
    searchable SQLite database and serves them to AI coding assistants\n\
    over the Model Context Protocol on stdio.")]
#[command(after_help = "EXAMPLES:\n    \
    recall serve                  Run the MCP server on stdio\n    \
    recall search \"retry\"         Search stored knowledge\n    \
    recall flight-log --session X Show a session's flight recorder\n\n\
    For more information about a command, run 'recall <command> --help'.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the knowledge database
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Path to the config file (default: ~/.recall/config.yaml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server on stdio
    #[command(long_about = "Starts the MCP (Model Context Protocol) server on stdio.\n\
        The server reads JSON-RPC requests from stdin and writes responses\n\
        to stdout.\n\n\
        Available tools:\n  \
        - search: Full-text search over knowledge\n  \
        - get: Fetch one item by ID\n  \
        - add: Store a new item\n  \
        - feedback: Rate an item's usefulness\n  \
        - log: Append to the session flight recorder")]
    Serve(commands::serve::Args),

    /// Search stored knowledge
    Search(commands::search::Args),

    /// Show the flight recorder for a session
    FlightLog(commands::flight_log::Args),

    /// Generate shell completion scripts
    Completions(commands::completions::Args),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions(args) = &cli.command {
        commands::completions::generate_completions(&mut Cli::command(), args.shell);
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;
    let mut overrides = Overrides {
        db_path: cli.db.clone(),
        ..Default::default()
    };
    if let Commands::Serve(args) = &cli.command {
        overrides.session_id = args.session_id.clone();
        overrides.project_path = args.resolved_project_path();
    }
    let settings = Settings::resolve(overrides, config)?;

    let _guard = init_logging(cli.verbose, &settings)?;
    tracing::debug!(
        "Using database {} (session {})",
        settings.db_path.display(),
        settings.session_id
    );

    match cli.command {
        Commands::Serve(_) => commands::serve::run(&settings),
        Commands::Search(args) => commands::search::run(args, &settings),
        Commands::FlightLog(args) => commands::flight_log::run(args, &settings),
        Commands::Completions(_) => Ok(()),
    }
}

/// Initializes tracing.
///
/// Stdout belongs to the protocol, so console logs go to stderr. With a
/// log file configured they go there instead; the returned guard must live
/// until exit so buffered lines are flushed.
fn init_logging(verbose: bool, settings: &Settings) -> Result<Option<WorkerGuard>> {
    let filter = if verbose { "recall=debug" } else { "recall=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());

    match &settings.log_file {
        Some(log_file) => {
            let dir = log_file
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(std::path::Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let file_name = log_file
                .file_name()
                .context("Log file path has no file name")?;

            let file_appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .without_time()
                        .with_writer(std::io::stderr),
                )
                .init();
            Ok(None)
        }
    }
}
