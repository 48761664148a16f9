//! Verse CLI
//!
//! Command-line interface for Verse - an offline-first poem and note journal.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use verse_core::{EntryType, Journal, StorageError};

mod commands;
mod editor;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "verse")]
#[command(about = "Verse - Offline-first poems and notes")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log sync activity to stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a new entry
    #[command(alias = "add")]
    New {
        /// poem or note
        #[arg(short = 't', long = "type", default_value = "poem")]
        entry_type: EntryType,
        /// Entry title
        #[arg(short = 'T', long)]
        title: Option<String>,
        /// Entry body (opens editor if neither title nor body is given)
        #[arg(short, long)]
        body: Option<String>,
        /// Rating from 1 to 5
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: Option<u8>,
    },
    /// List entries, newest first
    #[command(alias = "ls")]
    List {
        /// Only entries of this type
        #[arg(short = 't', long = "type")]
        entry_type: Option<EntryType>,
    },
    /// Search entry titles and previews
    Search {
        /// Search query
        query: String,
    },
    /// Show an entry
    Show {
        /// Entry ID (full or prefix)
        id: String,
    },
    /// Edit an entry
    Edit {
        /// Entry ID (full or prefix)
        id: String,
        /// New title
        #[arg(short = 'T', long)]
        title: Option<String>,
        /// New body (opens editor if neither title nor body is given)
        #[arg(short, long)]
        body: Option<String>,
    },
    /// Delete an entry
    #[command(alias = "rm")]
    Delete {
        /// Entry ID (full or prefix)
        id: String,
    },
    /// Manage books
    Book {
        #[command(subcommand)]
        command: BookCommands,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show status (counts, pending uploads, last sync)
    Status,
    /// Sync with the remote store
    Sync {
        /// Scan every remote document instead of changes since the last sync
        #[arg(long)]
        full: bool,
    },
    /// Keep syncing in the foreground until interrupted
    Watch,
    /// Purge deleted records whose deletion has been synced
    Gc,
}

#[derive(Subcommand)]
enum BookCommands {
    /// Create a new book
    #[command(alias = "add")]
    New {
        /// Book title
        title: String,
    },
    /// List books
    #[command(alias = "ls")]
    List,
    /// Show the entries of a book
    Show {
        /// Book ID (full or prefix)
        id: String,
    },
    /// Append an entry to a book
    Append {
        /// Book ID (full or prefix)
        book_id: String,
        /// Entry ID (full or prefix)
        entry_id: String,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, sync_enabled, project_id, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Commands that don't need the journal
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), &output);
    }

    let journal = Journal::open()?;

    let is_write = matches!(
        &cli.command,
        Commands::New { .. }
            | Commands::Edit { .. }
            | Commands::Delete { .. }
            | Commands::Book {
                command: BookCommands::New { .. } | BookCommands::Append { .. }
            }
    );
    let is_sync = matches!(
        &cli.command,
        Commands::Sync { .. } | Commands::Watch | Commands::Gc
    );

    // Sync before read commands (to get latest data)
    if !is_write && !is_sync {
        auto_sync(&journal, &output).await;
    }

    let result = match cli.command {
        Commands::New {
            entry_type,
            title,
            body,
            rating,
        } => commands::entry::create(&journal, entry_type, title, body, rating, &output),
        Commands::List { entry_type } => commands::entry::list(&journal, entry_type, &output),
        Commands::Search { query } => commands::entry::search(&journal, query, &output),
        Commands::Show { id } => commands::entry::show(&journal, id, &output).await,
        Commands::Edit { id, title, body } => {
            commands::entry::edit(&journal, id, title, body, &output).await
        }
        Commands::Delete { id } => commands::entry::delete(&journal, id, &output),
        Commands::Book { command } => handle_book_command(command, &journal, &output),
        Commands::Config { .. } => unreachable!(), // Handled above
        Commands::Status => commands::status::show(&journal, &output),
        Commands::Sync { full } => commands::sync::sync(&journal, full, &output).await,
        Commands::Watch => commands::sync::watch(&journal, &output).await,
        Commands::Gc => commands::sync::gc(&journal, &output),
    };

    // Sync after write commands (to push changes)
    if is_write && result.is_ok() {
        auto_sync(&journal, &output).await;
    }

    if let Some(hint) = result.as_ref().err().and_then(recovery_hint) {
        eprintln!("Hint: {}", hint);
    }
    result
}

/// Suggestion attached to a storage failure anywhere in the error chain
fn recovery_hint(error: &anyhow::Error) -> Option<&'static str> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<StorageError>())
        .and_then(StorageError::recovery_suggestion)
}

fn handle_book_command(command: BookCommands, journal: &Journal, output: &Output) -> Result<()> {
    match command {
        BookCommands::New { title } => commands::book::create(journal, title, output),
        BookCommands::List => commands::book::list(journal, output),
        BookCommands::Show { id } => commands::book::show(journal, id, output),
        BookCommands::Append { book_id, entry_id } => {
            commands::book::add(journal, book_id, entry_id, output)
        }
    }
}

fn handle_config_command(command: Option<ConfigCommands>, output: &Output) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(output),
        Some(ConfigCommands::Set { key, value }) => commands::config::set(key, value, output),
    }
}

/// Log to stderr; RUST_LOG wins over -v
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,verse_core={},verse_cli={}", level, level))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Auto-sync if sync is enabled, silently handles errors
async fn auto_sync(journal: &Journal, output: &Output) {
    if let Err(e) = commands::sync::sync_quiet(journal).await {
        if output.is_quiet() {
            debug!(error = %e, "auto-sync failed");
        } else {
            eprintln!("⚠ Auto-sync failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_recovery_hint_found_through_context() {
        let err = Err::<(), _>(StorageError::Unavailable)
            .context("Failed to save entry")
            .unwrap_err();
        assert!(recovery_hint(&err).is_some());

        let err = anyhow::anyhow!("Entry not found: abc");
        assert!(recovery_hint(&err).is_none());
    }
}
