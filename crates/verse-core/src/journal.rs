//! Unified storage interface
//!
//! The `Journal` owns the record database and one [`Collection`] plus one
//! [`Drafts`] set per record kind. It is the entry point for everything that
//! reads or writes local records; the sync engine shares its collections.
//!
//! ## Usage
//!
//! ```ignore
//! let journal = Journal::open()?;
//!
//! let mut entry = journal.create_entry(EntryType::Poem);
//! entry.title = "Deneme".to_string();
//! journal.save(&mut entry)?; // persisted: it has a title
//!
//! let listing = journal.entries().active();
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::drafts::{Drafts, SaveOutcome};
use crate::models::{Book, Entry, EntryMeta, EntryType, Metadata, Record};
use crate::storage::{Collection, Database, StorageResult};

/// Record kinds the journal stores, with access to their collection and drafts
pub trait Stored: Record {
    fn collection(journal: &Journal) -> &Arc<Collection<Self>>;
    fn drafts(journal: &Journal) -> &Drafts<Self>;
}

impl Stored for Entry {
    fn collection(journal: &Journal) -> &Arc<Collection<Self>> {
        &journal.entries
    }

    fn drafts(journal: &Journal) -> &Drafts<Self> {
        &journal.entry_drafts
    }
}

impl Stored for Book {
    fn collection(journal: &Journal) -> &Arc<Collection<Self>> {
        &journal.books
    }

    fn drafts(journal: &Journal) -> &Drafts<Self> {
        &journal.book_drafts
    }
}

/// Local journal store
pub struct Journal {
    db: Arc<Database>,
    entries: Arc<Collection<Entry>>,
    books: Arc<Collection<Book>>,
    entry_drafts: Drafts<Entry>,
    book_drafts: Drafts<Book>,
    config: Config,
}

impl Journal {
    /// Open the journal using the default configuration
    pub fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config)
    }

    /// Open the journal with a specific configuration
    pub fn open_with_config(config: Config) -> Result<Self> {
        let db = Database::open(config.database_path())
            .with_context(|| format!("Failed to open database: {:?}", config.database_path()))?;
        Ok(Self::with_database(Arc::new(db), config))
    }

    /// Create the journal without opening the database
    ///
    /// Reads return empty results and writes are rejected until
    /// [`Journal::initialize`] succeeds.
    pub fn deferred(config: Config) -> Self {
        let db = Database::deferred(config.database_path());
        Self::with_database(Arc::new(db), config)
    }

    /// Open an in-memory journal (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::with_database(Arc::new(db), Config::default()))
    }

    fn with_database(db: Arc<Database>, config: Config) -> Self {
        let entries = Arc::new(Collection::new(db.clone()));
        let books = Arc::new(Collection::new(db.clone()));
        Self {
            entry_drafts: Drafts::new(entries.clone()),
            book_drafts: Drafts::new(books.clone()),
            db,
            entries,
            books,
            config,
        }
    }

    /// Open a deferred database
    pub fn initialize(&self) -> StorageResult<()> {
        self.db.initialize()
    }

    pub fn is_available(&self) -> bool {
        self.db.is_available()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn entries(&self) -> &Arc<Collection<Entry>> {
        &self.entries
    }

    pub fn books(&self) -> &Arc<Collection<Book>> {
        &self.books
    }

    /// Collection for any stored kind
    pub fn collection<R: Stored>(&self) -> &Arc<Collection<R>> {
        R::collection(self)
    }

    // ==================== Drafts ====================

    /// Start a new entry; it is not persisted until it has content
    pub fn create_entry(&self, entry_type: EntryType) -> Entry {
        self.entry_drafts.create(Entry::new(entry_type))
    }

    /// Start a new book; it is not persisted until it has a title or members
    pub fn create_book(&self, title: impl Into<String>) -> Book {
        self.book_drafts.create(Book::new(title))
    }

    /// Save a record (drafts without content stay in memory)
    pub fn save<R: Stored>(&self, record: &mut R) -> StorageResult<SaveOutcome> {
        R::drafts(self).save(record)
    }

    /// Drop a draft without touching storage
    pub fn discard<R: Stored>(&self, id: &str) -> bool {
        R::drafts(self).discard(id)
    }

    pub fn is_pending<R: Stored>(&self, id: &str) -> bool {
        R::drafts(self).is_pending(id)
    }

    /// In-memory copy of a pending draft
    pub fn draft<R: Stored>(&self, id: &str) -> Option<R> {
        R::drafts(self).get(id)
    }

    /// Delete a record: drafts are discarded, stored records become tombstones
    pub fn delete<R: Stored>(&self, id: &str) -> StorageResult<bool> {
        if R::drafts(self).discard(id) {
            return Ok(true);
        }
        R::collection(self).soft_delete(id)
    }

    // ==================== Books ====================

    /// Entries of a book in book order, skipping unknown and deleted ones
    pub fn book_entries(&self, book_id: &str) -> Vec<EntryMeta> {
        let Some(book) = self.books.get_meta(book_id) else {
            return Vec::new();
        };
        let index = self.entries.metadata_index();
        book.member_ids
            .iter()
            .filter_map(|id| index.get(id))
            .filter(|meta| !meta.stamp().is_deleted())
            .cloned()
            .collect()
    }

    /// Append an entry to a stored book; false if the book is unknown or the
    /// entry is already a member
    pub fn add_to_book(&self, book_id: &str, entry_id: &str) -> StorageResult<bool> {
        let Some(mut book) = self.books.full_record(book_id) else {
            return Ok(false);
        };
        if book.stamp.is_deleted() || !book.add_member(entry_id) {
            return Ok(false);
        }
        self.save(&mut book)?;
        Ok(true)
    }
}
