//! Output format selection for CLI commands.

use clap::ValueEnum;

/// Output format options for CLI commands.
///
/// - `Text` for colored terminal output (default)
/// - `Json` for scripting
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output (default).
    #[default]
    Text,
    /// Machine-readable JSON output.
    Json,
}
