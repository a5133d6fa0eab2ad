//! Command-line interface for Recall.
//!
//! Besides running the MCP server, the CLI offers read-only views of the
//! knowledge store for humans: search and the flight recorder.

/// Individual CLI command implementations.
pub mod commands;

/// Output format shared by the read-only commands.
pub mod format;

pub use format::OutputFormat;

use anyhow::{Context, Result};
use recall::config::Settings;
use recall::storage::Database;

/// Opens the configured store, creating its directory when needed.
pub fn open_database(settings: &Settings) -> Result<Database> {
    if let Some(parent) = settings.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
    }
    Database::open(&settings.db_path)
}
