//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use verse_core::{Book, BookMeta, Entry, EntryMeta, SyncEvent};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a full entry
    pub fn print_entry(&self, entry: &Entry) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", entry.id);
                println!("Type:     {:?}", entry.entry_type());
                println!("Title:    {}", entry.title);
                if let Some(rating) = entry.rating() {
                    println!("Rating:   {}", "★".repeat(usize::from(rating)));
                }
                println!("Created:  {}", entry.stamp.created_at.format("%Y-%m-%d %H:%M"));
                println!("Updated:  {}", entry.stamp.updated_at.format("%Y-%m-%d %H:%M"));
                println!("Synced:   {}", if entry.stamp.is_synced { "yes" } else { "no" });
                println!();
                println!("{}", verse_core::preview::plain_text(&entry.body));
                if !entry.footer.is_empty() {
                    println!();
                    println!("── {}", entry.footer);
                }
            }
            OutputFormat::Json => print_json(entry),
            OutputFormat::Quiet => println!("{}", entry.id),
        }
    }

    /// Print a list of entries
    pub fn print_entries(&self, entries: &[EntryMeta]) {
        match self.format {
            OutputFormat::Human => {
                if entries.is_empty() {
                    println!("No entries found.");
                    return;
                }
                for meta in entries {
                    let pending = if meta.stamp.is_synced { ' ' } else { '*' };
                    println!(
                        "{}{} | {} | {}",
                        short_id(&meta.id),
                        pending,
                        truncate(&meta.title, 30),
                        truncate(&meta.preview, 45)
                    );
                }
                println!("\n{} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
            }
            OutputFormat::Json => print_json(&entries),
            OutputFormat::Quiet => {
                for meta in entries {
                    println!("{}", meta.id);
                }
            }
        }
    }

    /// Print a book with its entries in order
    pub fn print_book(&self, book: &Book, entries: &[EntryMeta]) {
        match self.format {
            OutputFormat::Human => {
                println!("Book: {} - {}", short_id(&book.id), book.title);
                println!();
                if entries.is_empty() {
                    println!("This book is empty.");
                    return;
                }
                for (position, meta) in entries.iter().enumerate() {
                    println!("{:>3}. {} {}", position + 1, short_id(&meta.id), meta.title);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({ "book": book, "entries": entries })
                );
            }
            OutputFormat::Quiet => {
                for meta in entries {
                    println!("{}", meta.id);
                }
            }
        }
    }

    /// Print a list of books
    pub fn print_books(&self, books: &[BookMeta]) {
        match self.format {
            OutputFormat::Human => {
                if books.is_empty() {
                    println!("No books found.");
                    return;
                }
                for book in books {
                    println!(
                        "{} | {} ({})",
                        short_id(&book.id),
                        truncate(&book.title, 40),
                        book.member_ids.len()
                    );
                }
                println!("\n{} book(s)", books.len());
            }
            OutputFormat::Json => print_json(&books),
            OutputFormat::Quiet => {
                for book in books {
                    println!("{}", book.id);
                }
            }
        }
    }

    /// Print a sync event as it happens
    pub fn print_event(&self, event: &SyncEvent) {
        let line = match event {
            SyncEvent::Uploaded { kind, id } => format!("↑ {kind} {}", short_id(id)),
            SyncEvent::RemoteApplied { kind, count } => format!("↓ {count} {kind}(s) from remote"),
            SyncEvent::TombstonesCollected { kind, count } => {
                format!("✗ purged {count} deleted {kind}(s)")
            }
            SyncEvent::Error(message) => format!("⚠ {message}"),
        };
        self.message(&line);
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode JSON: {}", e),
    }
}

/// First eight characters of an id
pub fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(end, _)| &id[..end])
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("çığ ışığı düşüş", 8), "çığ ı...");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0192f3a4-7b1c-7def"), "0192f3a4");
        assert_eq!(short_id("abc"), "abc");
    }
}
