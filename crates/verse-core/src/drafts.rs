//! Pending drafts
//!
//! A freshly created record lives only in memory until it has content.
//! Saving an empty draft updates the in-memory copy; discarding it leaves no
//! trace in the record store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::models::{Record, RecordId};
use crate::storage::{Collection, StorageResult};

/// What `save` did with a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Still a draft; nothing was written to storage
    Drafted,
    /// Written to the record store
    Persisted,
}

/// Records of one kind that were created but never persisted
pub struct Drafts<R: Record> {
    collection: Arc<Collection<R>>,
    pending: Mutex<HashMap<RecordId, R>>,
}

impl<R: Record> Drafts<R> {
    pub fn new(collection: Arc<Collection<R>>) -> Self {
        Self {
            collection,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new record as a draft and hand it back to the caller
    pub fn create(&self, record: R) -> R {
        debug!(kind = %R::KIND, id = record.id(), "draft created");
        self.lock()
            .insert(record.id().to_string(), record.clone());
        record
    }

    /// Save a record, persisting it once it has content
    ///
    /// Records that are not drafts are always persisted. On success `record`
    /// carries the stamps written to storage. If the store rejects the write
    /// a draft stays pending with the latest content.
    pub fn save(&self, record: &mut R) -> StorageResult<SaveOutcome> {
        {
            let mut pending = self.lock();
            if let Some(draft) = pending.get_mut(record.id()) {
                // kept up to date so a rejected write loses nothing
                *draft = record.clone();
                if !record.has_content() {
                    return Ok(SaveOutcome::Drafted);
                }
            }
        }

        self.collection.save_record(record)?;
        if self.lock().remove(record.id()).is_some() {
            debug!(kind = %R::KIND, id = record.id(), "draft persisted");
        }
        Ok(SaveOutcome::Persisted)
    }

    /// Drop a draft without writing anything; false if `id` is not a draft
    pub fn discard(&self, id: &str) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            debug!(kind = %R::KIND, id, "draft discarded");
        }
        removed
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Latest in-memory copy of a draft
    pub fn get(&self, id: &str) -> Option<R> {
        self.lock().get(id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RecordId, R>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Book, Entry, EntryType};
    use crate::storage::Database;

    fn drafts<R: Record>() -> (Arc<Collection<R>>, Drafts<R>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let collection = Arc::new(Collection::new(db));
        let drafts = Drafts::new(collection.clone());
        (collection, drafts)
    }

    #[test]
    fn test_empty_draft_stays_in_memory() {
        let (entries, drafts) = drafts::<Entry>();
        let mut entry = drafts.create(Entry::new(EntryType::Poem));
        entry.footer = "footer only".to_string();

        assert_eq!(drafts.save(&mut entry).unwrap(), SaveOutcome::Drafted);
        assert!(drafts.is_pending(&entry.id));
        assert_eq!(drafts.get(&entry.id).unwrap().footer, "footer only");
        assert!(entries.active().is_empty());
        assert!(entries.get_meta(&entry.id).is_none());
    }

    #[test]
    fn test_whitespace_body_is_not_content() {
        let (entries, drafts) = drafts::<Entry>();
        let mut entry = drafts.create(Entry::new(EntryType::Note));
        entry.title = "   ".to_string();
        entry.body = "<p> </p><br>".to_string();

        assert_eq!(drafts.save(&mut entry).unwrap(), SaveOutcome::Drafted);
        assert!(entries.active().is_empty());
    }

    #[test]
    fn test_draft_with_title_is_persisted() {
        let (entries, drafts) = drafts::<Entry>();
        let mut entry = drafts.create(Entry::new(EntryType::Poem));
        entry.title = "Deneme".to_string();

        assert_eq!(drafts.save(&mut entry).unwrap(), SaveOutcome::Persisted);
        assert!(!drafts.is_pending(&entry.id));
        assert!(drafts.get(&entry.id).is_none());

        let listed = entries.active();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].stamp.is_synced);
    }

    #[test]
    fn test_discard_leaves_no_trace() {
        let (entries, drafts) = drafts::<Entry>();
        let entry = drafts.create(Entry::new(EntryType::Poem));

        assert!(drafts.discard(&entry.id));
        assert!(!drafts.discard(&entry.id));
        assert!(!drafts.is_pending(&entry.id));
        assert!(entries.get_meta(&entry.id).is_none());
        assert!(entries.full_record(&entry.id).is_none());
        assert!(entries.metadata_index().is_empty());
    }

    #[test]
    fn test_persisted_record_saves_even_when_emptied() {
        let (entries, drafts) = drafts::<Entry>();
        let mut entry = drafts.create(Entry::new(EntryType::Poem));
        entry.title = "to be cleared".to_string();
        drafts.save(&mut entry).unwrap();

        entry.title.clear();
        assert_eq!(drafts.save(&mut entry).unwrap(), SaveOutcome::Persisted);
        assert_eq!(entries.full_record(&entry.id).unwrap().title, "");
    }

    #[test]
    fn test_rejected_write_keeps_draft() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db = Arc::new(Database::deferred(temp_dir.path().join("verse.db")));
        let drafts = Drafts::new(Arc::new(Collection::<Book>::new(db)));

        let mut book = drafts.create(Book::new(""));
        book.title = "Şiirler".to_string();
        assert!(drafts.save(&mut book).is_err());
        assert!(drafts.is_pending(&book.id));
    }
}
