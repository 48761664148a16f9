//! Book command handlers

use anyhow::{bail, Context, Result};

use verse_core::{Book, Journal, SaveOutcome};

use super::entry::parse_entry_id;
use super::resolve_id;
use crate::output::Output;

/// Create a new book
pub fn create(journal: &Journal, title: String, output: &Output) -> Result<()> {
    let mut book = journal.create_book(title);

    match journal.save(&mut book).context("Failed to save book")? {
        SaveOutcome::Persisted => {
            output.success(&format!("Created book: {}", book.id));
            output.print_book(&book, &[]);
        }
        SaveOutcome::Drafted => {
            journal.discard::<Book>(&book.id);
            bail!("A book needs a title");
        }
    }
    Ok(())
}

/// List active books
pub fn list(journal: &Journal, output: &Output) -> Result<()> {
    output.print_books(&journal.books().active());
    Ok(())
}

/// Show a book's entries in order
pub fn show(journal: &Journal, id: String, output: &Output) -> Result<()> {
    let id = parse_book_id(&id, journal)?;
    let book = journal
        .books()
        .full_record(&id)
        .ok_or_else(|| anyhow::anyhow!("Book not found: {}", id))?;

    output.print_book(&book, &journal.book_entries(&id));
    Ok(())
}

/// Append an entry to a book
pub fn add(journal: &Journal, book_id: String, entry_id: String, output: &Output) -> Result<()> {
    let book_id = parse_book_id(&book_id, journal)?;
    let entry_id = parse_entry_id(&entry_id, journal)?;

    if !journal
        .add_to_book(&book_id, &entry_id)
        .context("Failed to update book")?
    {
        output.message("Entry is already in this book.");
        return Ok(());
    }

    output.success("Entry added to book");
    Ok(())
}

fn parse_book_id(id: &str, journal: &Journal) -> Result<String> {
    resolve_id(id, &journal.books().active(), "book")
}
