//! Entry command handlers

use anyhow::{bail, Context, Result};

use verse_core::preview::editable_text;
use verse_core::storage::Availability;
use verse_core::sync::SyncError;
use verse_core::{Entry, EntryType, Journal, SaveOutcome};

use super::resolve_id;
use super::sync::{connect, is_configured};
use crate::editor::{confirm, edit_text, text_to_html};
use crate::output::Output;

/// Create a new entry
pub fn create(
    journal: &Journal,
    entry_type: EntryType,
    title: Option<String>,
    body: Option<String>,
    rating: Option<u8>,
    output: &Output,
) -> Result<()> {
    let mut entry = journal.create_entry(entry_type);
    if let Some(rating) = rating {
        entry = entry.with_rating(rating);
    }

    let body = match body {
        Some(body) => body,
        None if title.is_none() => edit_text("")?,
        None => String::new(),
    };
    entry.title = title.unwrap_or_default();
    entry.body = text_to_html(&body);

    match journal.save(&mut entry).context("Failed to save entry")? {
        SaveOutcome::Persisted => {
            output.success(&format!("Created {:?}: {}", entry_type, entry.id));
            output.print_entry(&entry);
        }
        SaveOutcome::Drafted => {
            journal.discard::<Entry>(&entry.id);
            output.message("Nothing written, entry discarded.");
        }
    }
    Ok(())
}

/// List active entries, newest first
pub fn list(journal: &Journal, entry_type: Option<EntryType>, output: &Output) -> Result<()> {
    let entries: Vec<_> = journal
        .entries()
        .active()
        .into_iter()
        .filter(|meta| entry_type.map_or(true, |t| meta.entry_type == t))
        .collect();

    output.print_entries(&entries);
    Ok(())
}

/// Search titles and previews
pub fn search(journal: &Journal, query: String, output: &Output) -> Result<()> {
    output.print_entries(&journal.entries().search(&query));
    Ok(())
}

/// Show a single entry, downloading its body if needed
pub async fn show(journal: &Journal, id: String, output: &Output) -> Result<()> {
    let id = parse_entry_id(&id, journal)?;
    let entry = load_entry(journal, &id).await?;
    output.print_entry(&entry);
    Ok(())
}

/// Edit an entry's title and body
pub async fn edit(
    journal: &Journal,
    id: String,
    title: Option<String>,
    body: Option<String>,
    output: &Output,
) -> Result<()> {
    let id = parse_entry_id(&id, journal)?;
    let mut entry = load_entry(journal, &id).await?;

    let body = match (&title, body) {
        (_, Some(body)) => Some(body),
        (None, None) => Some(edit_text(&editable_text(&entry.body))?),
        (Some(_), None) => None,
    };
    if let Some(title) = title {
        entry.title = title;
    }
    if let Some(body) = body {
        entry.body = text_to_html(&body);
    }

    journal.save(&mut entry).context("Failed to update entry")?;

    output.success("Entry updated");
    output.print_entry(&entry);
    Ok(())
}

/// Delete an entry
pub fn delete(journal: &Journal, id: String, output: &Output) -> Result<()> {
    let id = parse_entry_id(&id, journal)?;

    if output.should_prompt() {
        let title = journal
            .entries()
            .get_meta(&id)
            .map(|meta| meta.title)
            .unwrap_or_default();
        println!("Delete entry: {} - {}", crate::output::short_id(&id), title);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    if !journal.delete::<Entry>(&id).context("Failed to delete entry")? {
        bail!("Entry already deleted: {}", id);
    }

    output.success(&format!("Deleted entry: {}", id));
    Ok(())
}

/// Resolve a full id or unique prefix among active entries
pub fn parse_entry_id(id: &str, journal: &Journal) -> Result<String> {
    resolve_id(id, &journal.entries().active(), "entry")
}

/// Full entry from the local store, or from the remote store when only its
/// metadata has been downloaded
async fn load_entry(journal: &Journal, id: &str) -> Result<Entry> {
    match journal.entries().lookup(id) {
        Availability::Cached(entry) => Ok(entry),
        Availability::Missing => bail!("Entry not found: {}", id),
        Availability::MetadataOnly(_) => {
            if !is_configured(journal.config()) {
                bail!("{}", SyncError::Offline);
            }
            let (engine, _events) = connect(journal)?;
            engine.set_online(true);
            engine
                .fetch_entry(id)
                .await
                .context("Failed to download entry")?
                .ok_or_else(|| anyhow::anyhow!("Entry not found: {}", id))
        }
    }
}
