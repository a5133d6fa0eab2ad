//! Serve command - run the MCP server on stdio.
//!
//! Reads JSON-RPC requests from stdin and writes responses to stdout.
//! All logging goes to stderr or the configured log file.

use anyhow::{Context, Result};

use recall::config::Settings;
use recall::mcp::{self, ToolContext};

use crate::cli::open_database;

/// Arguments for the serve command.
#[derive(clap::Args)]
#[command(after_help = "EXAMPLES:\n    \
    recall serve                              Serve the default store\n    \
    recall serve --project-path .             Stamp project items with this directory\n    \
    recall --db /tmp/k.db serve --session-id ci-42")]
pub struct Args {
    /// Session id for feedback and flight recorder entries
    #[arg(long, value_name = "ID")]
    #[arg(long_help = "Session id attributed to feedback and flight recorder\n\
        entries. Defaults to RECALL_SESSION_ID, the config file, or a\n\
        fresh UUID.")]
    pub session_id: Option<String>,

    /// Project path stamped on project-scoped items
    #[arg(long, value_name = "PATH")]
    #[arg(long_help = "Path recorded on items added with project scope.\n\
        Use '.' for the current directory.")]
    pub project_path: Option<String>,
}

impl Args {
    /// The project path with '.' expanded to the current directory.
    pub fn resolved_project_path(&self) -> Option<String> {
        self.project_path.as_ref().map(|p| {
            if p == "." {
                std::env::current_dir()
                    .map(|d| d.to_string_lossy().to_string())
                    .unwrap_or_else(|_| p.clone())
            } else {
                p.clone()
            }
        })
    }
}

/// Executes the serve command.
///
/// The store is opened before the first request is read; failing to open
/// it is fatal.
pub fn run(settings: &Settings) -> Result<()> {
    let db = open_database(settings)?;
    let ctx = ToolContext {
        session_id: settings.session_id.clone(),
        project_path: settings.project_path.clone(),
    };

    let rt = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    rt.block_on(mcp::run_server(db, ctx))
}
