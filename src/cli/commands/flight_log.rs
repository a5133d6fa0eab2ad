//! Flight-log command - print a session's flight recorder.

use anyhow::Result;
use colored::Colorize;

use recall::config::Settings;
use recall::storage::{FlightEntryType, FlightRecorderEntry};

use crate::cli::{open_database, OutputFormat};

/// Arguments for the flight-log command.
#[derive(clap::Args)]
#[command(after_help = "EXAMPLES:\n    \
    recall flight-log --session 3f2a...       Entries for one session\n    \
    recall flight-log --session ci-42 -f json Output as JSON")]
pub struct Args {
    /// Session whose entries to print
    #[arg(long, value_name = "ID")]
    pub session: String,

    /// Output format: text (default), json
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Executes the flight-log command.
pub fn run(args: Args, settings: &Settings) -> Result<()> {
    let db = open_database(settings)?;
    let entries = db.flight_log(&args.session)?;
    db.close()?;

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            if entries.is_empty() {
                println!(
                    "{}",
                    format!("No flight recorder entries for session {}.", args.session).dimmed()
                );
                return Ok(());
            }
            for entry in &entries {
                print_entry(entry);
            }
        }
    }

    Ok(())
}

fn print_entry(entry: &FlightRecorderEntry) {
    let kind = format!("{:<16}", entry.entry_type.as_str());
    let kind = match entry.entry_type {
        FlightEntryType::Error => kind.red(),
        FlightEntryType::Milestone | FlightEntryType::TaskComplete => kind.green(),
        FlightEntryType::Decision => kind.yellow(),
        FlightEntryType::Observation | FlightEntryType::TaskAnnotation => kind.cyan(),
    };

    println!(
        "{}  {}  {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        kind,
        entry.content
    );
    if let Some(rationale) = &entry.rationale {
        println!("{}  {}", " ".repeat(37), format!("why: {rationale}").dimmed());
    }
    if let Some(metadata) = &entry.metadata {
        println!("{}  {}", " ".repeat(37), metadata.to_string().dimmed());
    }
}
