//! CLI commands for Recall.
//!
//! Each submodule implements a single CLI command with its argument
//! parsing and execution logic.

/// Generate shell completion scripts.
pub mod completions;

/// Print a session's flight recorder entries.
pub mod flight_log;

/// Search the knowledge store from the terminal.
pub mod search;

/// Run the MCP server on stdio.
pub mod serve;
