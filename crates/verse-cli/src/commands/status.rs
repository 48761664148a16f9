//! Status command handler

use anyhow::Result;

use verse_core::Journal;

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(journal: &Journal, output: &Output) -> Result<()> {
    let config = journal.config();
    let entries = journal.entries();
    let books = journal.books();

    let listing = entries.active();
    let cached_ids = entries.cached_body_ids();
    let active = listing.len();
    let cached = listing.iter().filter(|meta| cached_ids.contains(&meta.id)).count();
    let pending = entries.unsynced().len() + books.unsynced().len();
    let book_count = books.active().len();
    let last_sync = entries.last_sync_time();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "sync_enabled": config.sync_enabled,
                    "project_id": config.remote.project_id,
                    "last_sync": last_sync,
                    "data_dir": config.data_dir,
                    "counts": {
                        "entries": active,
                        "books": book_count,
                        "cached_bodies": cached,
                        "pending_upload": pending
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", pending);
        }
        OutputFormat::Human => {
            println!("Verse Status");
            println!("============");
            println!();
            println!("Sync:");
            println!(
                "  Status:    {}",
                if config.sync_enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            if let Some(ref project) = config.remote.project_id {
                println!("  Project:   {}", project);
            }
            println!(
                "  Last sync: {}",
                last_sync
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string())
            );
            println!("  Pending:   {}", pending);
            println!();
            println!("Storage:");
            println!("  Location: {}", config.database_path().display());
            println!();
            println!("Contents:");
            println!("  Entries: {} ({} available offline)", active, cached);
            println!("  Books:   {}", book_count);
        }
    }

    Ok(())
}
