//! Search command - query the knowledge store.
//!
//! Runs the same ranked full-text search the MCP `search` tool uses and
//! prints the matches for a human.

use anyhow::Result;
use colored::Colorize;

use recall::config::Settings;
use recall::storage::{KnowledgeItem, Scope, SearchOptions, DEFAULT_SEARCH_LIMIT};

use crate::cli::{open_database, OutputFormat};

/// Arguments for the search command.
#[derive(clap::Args)]
#[command(after_help = "EXAMPLES:\n    \
    recall search \"error handling\"            Ranked matches\n    \
    recall search retry --type pattern        Only patterns\n    \
    recall search deploy --scope global -l 3  Top three global items\n    \
    recall search cache --format json         Output as JSON")]
pub struct Args {
    /// Full-text query
    pub query: String,

    /// Restrict to an item type (repeatable)
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub types: Vec<String>,

    /// Restrict to global or project items
    #[arg(short, long, value_name = "SCOPE")]
    pub scope: Option<Scope>,

    /// Maximum number of results
    #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT, value_name = "N")]
    pub limit: i64,

    /// Output format: text (default), json
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Executes the search command.
pub fn run(args: Args, settings: &Settings) -> Result<()> {
    let db = open_database(settings)?;

    let options = SearchOptions {
        query: args.query,
        types: args.types,
        scope: args.scope,
        limit: args.limit,
    };
    let items = db.search(&options)?;
    db.close()?;

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => print_items(&options.query, &items),
    }

    Ok(())
}

fn print_items(query: &str, items: &[KnowledgeItem]) {
    if items.is_empty() {
        println!("{}", format!("No knowledge matches '{query}'.").dimmed());
        return;
    }

    println!(
        "{}",
        format!("{} result(s) for '{}'", items.len(), query).bold()
    );
    println!();

    for item in items {
        println!(
            "{}  {}  {}",
            item.id.cyan(),
            format!("[{}]", item.item_type).yellow(),
            item.title.bold()
        );

        let mut meta = vec![
            format!("scope: {}", item.scope),
            format!("score: {:.1}", item.usefulness_score),
            format!("uses: {}", item.use_count),
        ];
        if !item.tags.is_empty() {
            meta.push(format!("tags: {}", item.tags.join(", ")));
        }
        println!("    {}", meta.join("  ").dimmed());
        println!("    {}", first_line(&item.content, 100));
        println!();
    }
}

/// First line of `s`, truncated at a character boundary.
fn first_line(s: &str, max_chars: usize) -> String {
    let line = s.lines().next().unwrap_or_default();
    if line.chars().count() <= max_chars {
        line.to_string()
    } else {
        let truncated: String = line.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_line_short() {
        assert_eq!(first_line("one\ntwo", 100), "one");
        assert_eq!(first_line("", 10), "");
    }

    #[test]
    fn test_first_line_truncates_on_char_boundary() {
        assert_eq!(first_line("héllo wörld", 5), "héllo...");
    }
}
