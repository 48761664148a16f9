//! Per-kind record collection
//!
//! A [`Collection`] pairs the `records` rows of one kind with its index
//! document and keeps an in-memory snapshot of that index. Every write runs
//! in a single SQLite transaction that updates the body row(s) and the index
//! document together; the snapshot is swapped only after commit, so readers
//! see either the state before a write or after it.
//!
//! When the database is not available yet, reads degrade to empty results
//! (logged) and writes fail with [`StorageError::Unavailable`].

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use super::database::{
    all_records, delete_record, load_index_doc, load_record, record_ids, upsert_record,
    write_index_doc, Database,
};
use super::error::{StorageError, StorageResult};
use super::index::Index;
use super::schema::INDEX_VERSION;
use crate::models::{Metadata, Record, RecordId, RecordKind};

/// What is known locally about a record
#[derive(Debug, Clone)]
pub enum Availability<R: Record> {
    /// The full record is stored locally
    Cached(R),
    /// Only the index entry is known; the body has never been downloaded
    MetadataOnly(R::Meta),
    /// Nothing is known (or the record is a tombstone)
    Missing,
}

/// Local storage for one record kind
pub struct Collection<R: Record> {
    db: Arc<Database>,
    cache: RwLock<Option<Arc<Index<R::Meta>>>>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Collection<R> {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            cache: RwLock::new(None),
            _record: PhantomData,
        }
    }

    pub fn kind(&self) -> RecordKind {
        R::KIND
    }

    // ==================== Reads ====================

    /// The current index snapshot, loading or rebuilding it if needed
    pub fn metadata_index(&self) -> Arc<Index<R::Meta>> {
        if let Some(index) = self.cached() {
            return index;
        }
        match self.db.with_conn(|conn| self.load_index(conn)) {
            Ok(index) => index,
            Err(e) => {
                warn!(kind = %R::KIND, error = %e, "index unavailable, serving empty listing");
                Arc::new(Index::empty())
            }
        }
    }

    /// Index entry for `id`, tombstones included
    pub fn get_meta(&self, id: &str) -> Option<R::Meta> {
        self.metadata_index().get(id).cloned()
    }

    /// Non-deleted entries, most recently updated first
    pub fn active(&self) -> Vec<R::Meta> {
        let index = self.metadata_index();
        let mut entries: Vec<R::Meta> = index.active().cloned().collect();
        entries.sort_by(|a, b| b.stamp().updated_at.cmp(&a.stamp().updated_at));
        entries
    }

    /// Case-insensitive match against title and preview
    pub fn search(&self, query: &str) -> Vec<R::Meta> {
        let needle = query.trim().to_lowercase();
        let mut entries = self.active();
        if !needle.is_empty() {
            entries.retain(|m| {
                m.title().to_lowercase().contains(&needle)
                    || m.preview().to_lowercase().contains(&needle)
            });
        }
        entries
    }

    /// Entries (tombstones included) that still need to be uploaded
    pub fn unsynced(&self) -> Vec<R::Meta> {
        self.metadata_index().unsynced().cloned().collect()
    }

    /// Watermark of the last completed sync
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.metadata_index().last_sync_time
    }

    /// The full record, if its body is stored locally
    pub fn full_record(&self, id: &str) -> Option<R> {
        match self.db.with_conn(|conn| read_body::<R>(conn, id)) {
            Ok(record) => record,
            Err(e) => {
                warn!(kind = %R::KIND, id, error = %e, "failed to read record body");
                None
            }
        }
    }

    /// Distinguish a cached body from a metadata-only entry and an unknown id
    pub fn lookup(&self, id: &str) -> Availability<R> {
        let Some(meta) = self.get_meta(id) else {
            return Availability::Missing;
        };
        if meta.stamp().is_deleted() {
            return Availability::Missing;
        }
        match self.full_record(id) {
            Some(record) => Availability::Cached(record),
            None => Availability::MetadataOnly(meta),
        }
    }

    /// Ids whose bodies are available offline
    pub fn cached_body_ids(&self) -> HashSet<RecordId> {
        match self.db.with_conn(|conn| record_ids(conn, R::KIND.as_str())) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(kind = %R::KIND, error = %e, "failed to list cached bodies");
                HashSet::new()
            }
        }
    }

    // ==================== Writes ====================

    /// Persist a local mutation
    ///
    /// Stamps `updated_at` (never earlier than the stored value) and clears
    /// `is_synced` on `record` before writing the body and its index entry.
    pub fn save_record(&self, record: &mut R) -> StorageResult<()> {
        self.mutate(|conn, index| {
            let previous = index.get(record.id()).map(|m| m.stamp().updated_at);
            record.stamp_mut().touch(previous);
            write_body(conn, &*record)?;
            index.upsert(record.to_meta());
            Ok(())
        })?;
        debug!(kind = %R::KIND, id = record.id(), "record saved");
        Ok(())
    }

    /// Store a record that came from the remote store
    pub fn put_synced(&self, record: R) -> StorageResult<bool> {
        Ok(self.batch_put_synced(vec![record])? == 1)
    }

    /// Store remote-sourced full records in one transaction
    ///
    /// Records whose local copy has unsynced changes are left alone.
    pub fn batch_put_synced(&self, records: Vec<R>) -> StorageResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        self.mutate(|conn, index| {
            let mut applied = 0;
            for mut record in records {
                if has_local_changes(index, record.id()) {
                    debug!(kind = %R::KIND, id = record.id(), "keeping unsynced local copy");
                    continue;
                }
                record.stamp_mut().is_synced = true;
                write_body(conn, &record)?;
                index.upsert(record.to_meta());
                applied += 1;
            }
            Ok(applied)
        })
    }

    /// Replace index entries by id in one transaction
    ///
    /// A cached body older than its incoming entry is evicted, so the next
    /// fetch downloads the new body and the preview is derived from it.
    /// Entries whose local copy has unsynced changes are left alone.
    pub fn batch_update_metadata(&self, metas: Vec<R::Meta>) -> StorageResult<usize> {
        if metas.is_empty() {
            return Ok(0);
        }
        self.mutate(|conn, index| {
            let mut applied = 0;
            for meta in metas {
                if has_local_changes(index, meta.id()) {
                    debug!(kind = %R::KIND, id = meta.id(), "keeping unsynced local copy");
                    continue;
                }
                if body_is_stale::<R>(conn, &meta) {
                    delete_record(conn, R::KIND.as_str(), meta.id())?;
                    debug!(kind = %R::KIND, id = meta.id(), "evicted stale body");
                }
                index.upsert(meta);
                applied += 1;
            }
            Ok(applied)
        })
    }

    /// Mark a record as uploaded
    ///
    /// Only succeeds if the stored `updated_at` still equals the uploaded
    /// one; a record edited while its upload was in flight stays unsynced.
    pub fn mark_synced(&self, id: &str, uploaded: DateTime<Utc>) -> StorageResult<bool> {
        let current = self.get_meta(id);
        if current.map(|m| m.stamp().updated_at) != Some(uploaded) {
            return Ok(false);
        }
        self.mutate(|conn, index| {
            let Some(meta) = index.get(id) else {
                return Ok(false);
            };
            if meta.stamp().updated_at != uploaded {
                return Ok(false);
            }
            let mut meta = meta.clone();
            meta.stamp_mut().is_synced = true;
            index.upsert(meta);

            if let Some(mut body) = read_body::<R>(conn, id)? {
                if body.stamp().updated_at == uploaded {
                    body.stamp_mut().is_synced = true;
                    write_body(conn, &body)?;
                }
            }
            Ok(true)
        })
    }

    /// Turn a record into a tombstone
    ///
    /// Works for metadata-only entries too; returns false if the id is
    /// unknown or already deleted.
    pub fn soft_delete(&self, id: &str) -> StorageResult<bool> {
        let deleted = self.mutate(|conn, index| {
            let Some(meta) = index.get(id).cloned() else {
                return Ok(false);
            };
            if meta.stamp().is_deleted() {
                return Ok(false);
            }
            let previous = Some(meta.stamp().updated_at);

            match read_body::<R>(conn, id)? {
                Some(mut body) => {
                    let stamp = body.stamp_mut();
                    stamp.touch(previous);
                    stamp.deleted_at = Some(stamp.updated_at);
                    write_body(conn, &body)?;
                    index.upsert(body.to_meta());
                }
                None => {
                    let mut meta = meta;
                    let stamp = meta.stamp_mut();
                    stamp.touch(previous);
                    stamp.deleted_at = Some(stamp.updated_at);
                    index.upsert(meta);
                }
            }
            Ok(true)
        })?;
        if deleted {
            debug!(kind = %R::KIND, id, "record soft-deleted");
        }
        Ok(deleted)
    }

    /// Remove a record and its index entry permanently
    pub fn hard_delete(&self, id: &str) -> StorageResult<bool> {
        Ok(self.hard_delete_many(&[id.to_string()])? == 1)
    }

    /// Remove several records and their index entries in one transaction
    pub fn hard_delete_many(&self, ids: &[RecordId]) -> StorageResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.mutate(|conn, index| {
            let mut removed = 0;
            for id in ids {
                let had_body = load_record(conn, R::KIND.as_str(), id)?.is_some();
                delete_record(conn, R::KIND.as_str(), id)?;
                if index.remove(id).is_some() || had_body {
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    /// Record the start time of a completed sync
    pub fn set_last_sync_time(&self, at: DateTime<Utc>) -> StorageResult<()> {
        self.mutate(|_, index| {
            index.last_sync_time = Some(at);
            Ok(())
        })
    }

    /// Force a rebuild of the index from stored bodies
    pub fn rebuild_index(&self) -> StorageResult<usize> {
        self.db.with_conn(|conn| {
            let previous = self.load_index(conn)?;
            let index = rebuild_from_bodies::<R>(conn, Some(&previous))?;
            write_index::<R>(conn, &index)?;
            let len = index.len();
            self.store_cache(index);
            Ok(len)
        })
    }

    // ==================== Internals ====================

    fn cached(&self) -> Option<Arc<Index<R::Meta>>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store_cache(&self, index: Index<R::Meta>) -> Arc<Index<R::Meta>> {
        let index = Arc::new(index);
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(index.clone());
        index
    }

    /// Snapshot from cache, or load it (caller holds the connection)
    fn load_index(&self, conn: &Connection) -> StorageResult<Arc<Index<R::Meta>>> {
        if let Some(index) = self.cached() {
            return Ok(index);
        }
        let index = load_or_rebuild::<R>(conn)?;
        Ok(self.store_cache(index))
    }

    /// Apply `f` to a copy of the index inside a transaction, then commit
    /// and publish the new snapshot
    fn mutate<T>(
        &self,
        f: impl FnOnce(&Connection, &mut Index<R::Meta>) -> StorageResult<T>,
    ) -> StorageResult<T> {
        self.db.with_conn(|conn| {
            let mut index = (*self.load_index(conn)?).clone();
            let tx = conn.transaction()?;
            let out = f(&tx, &mut index)?;
            write_index::<R>(&tx, &index)?;
            tx.commit()?;
            self.store_cache(index);
            Ok(out)
        })
    }
}

fn has_local_changes<M: Metadata>(index: &Index<M>, id: &str) -> bool {
    index.get(id).is_some_and(|local| !local.stamp().is_synced)
}

fn read_body<R: Record>(conn: &Connection, id: &str) -> StorageResult<Option<R>> {
    let Some(json) = load_record(conn, R::KIND.as_str(), id)? else {
        return Ok(None);
    };
    serde_json::from_str(&json)
        .map(Some)
        .map_err(|source| StorageError::InvalidRecord {
            kind: R::KIND.as_str(),
            id: id.to_string(),
            source,
        })
}

fn write_body<R: Record>(conn: &Connection, record: &R) -> StorageResult<()> {
    let json = serde_json::to_string(record).map_err(|source| StorageError::InvalidRecord {
        kind: R::KIND.as_str(),
        id: record.id().to_string(),
        source,
    })?;
    upsert_record(conn, R::KIND.as_str(), record.id(), &json)
}

/// Whether a cached body exists that is older than `meta` (or unreadable)
fn body_is_stale<R: Record>(conn: &Connection, meta: &R::Meta) -> bool {
    match load_record(conn, R::KIND.as_str(), meta.id()) {
        Ok(Some(json)) => match serde_json::from_str::<R>(&json) {
            Ok(body) => body.stamp().updated_at < meta.stamp().updated_at,
            Err(_) => true,
        },
        _ => false,
    }
}

fn write_index<R: Record>(conn: &Connection, index: &Index<R::Meta>) -> StorageResult<()> {
    let json = serde_json::to_string(index).map_err(|source| StorageError::IndexEncode {
        kind: R::KIND.as_str(),
        source,
    })?;
    write_index_doc(conn, R::KIND.as_str(), &json)
}

fn load_or_rebuild<R: Record>(conn: &Connection) -> StorageResult<Index<R::Meta>> {
    let kind = R::KIND.as_str();
    let mut previous = None;
    match load_index_doc(conn, kind)? {
        Some(doc) => match serde_json::from_str::<Index<R::Meta>>(&doc) {
            Ok(index) if index.is_current() => return Ok(index),
            Ok(index) => {
                info!(
                    kind,
                    found = index.version,
                    expected = INDEX_VERSION,
                    "index version is stale, rebuilding"
                );
                previous = Some(index);
            }
            Err(e) => warn!(kind, error = %e, "index is unreadable, rebuilding"),
        },
        None => debug!(kind, "no index yet, building from stored records"),
    }

    let index = rebuild_from_bodies::<R>(conn, previous.as_ref())?;
    write_index::<R>(conn, &index)?;
    info!(kind, entries = index.len(), "index rebuilt");
    Ok(index)
}

/// Re-derive the index from the `records` rows
///
/// Unsynced entries of `previous` that have no body row (local edits of
/// metadata-only records, usually tombstones) exist nowhere else, so they
/// are carried over.
fn rebuild_from_bodies<R: Record>(
    conn: &Connection,
    previous: Option<&Index<R::Meta>>,
) -> StorageResult<Index<R::Meta>> {
    let rows = all_records(conn, R::KIND.as_str())?;
    let mut records = Vec::with_capacity(rows.len());
    for (id, json) in rows {
        match serde_json::from_str::<R>(&json) {
            Ok(record) => records.push(record),
            Err(e) => warn!(kind = %R::KIND, id, error = %e, "skipping unreadable record"),
        }
    }
    let mut index = Index::rebuild(&records);
    if let Some(previous) = previous {
        let carried = carry_unsynced(&mut index, previous);
        if carried > 0 {
            info!(kind = %R::KIND, carried, "kept unsynced metadata-only entries");
        }
    }
    Ok(index)
}

fn carry_unsynced<M: Metadata>(index: &mut Index<M>, previous: &Index<M>) -> usize {
    let mut carried = 0;
    for meta in previous.unsynced() {
        if index.get(meta.id()).is_none() {
            index.upsert(meta.clone());
            carried += 1;
        }
    }
    carried
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Book, Entry, EntryMeta, EntryType};
    use crate::timestamp;

    fn collection() -> Collection<Entry> {
        Collection::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    fn poem(title: &str, body: &str) -> Entry {
        let mut entry = Entry::new(EntryType::Poem);
        entry.title = title.to_string();
        entry.body = body.to_string();
        entry
    }

    fn remote_meta(entry: &Entry) -> EntryMeta {
        let mut meta = entry.to_meta();
        meta.stamp.is_synced = true;
        meta
    }

    #[test]
    fn test_save_and_read_back() {
        let entries = collection();
        let mut entry = poem("Deneme", "<p>ilk dize</p>");
        entries.save_record(&mut entry).unwrap();

        assert!(!entry.stamp.is_synced);
        let stored = entries.full_record(&entry.id).unwrap();
        assert_eq!(stored, entry);

        let meta = entries.get_meta(&entry.id).unwrap();
        assert_eq!(meta.preview, "ilk dize");
        assert_eq!(entries.active().len(), 1);
        assert!(entries.cached_body_ids().contains(&entry.id));
    }

    #[test]
    fn test_save_never_moves_updated_at_backwards() {
        let entries = collection();
        let mut entry = poem("a", "");
        entries.save_record(&mut entry).unwrap();
        let first = entry.stamp.updated_at;

        let mut stale_copy = entry.clone();
        stale_copy.stamp.updated_at = first - chrono::Duration::days(1);
        entries.save_record(&mut stale_copy).unwrap();
        assert!(stale_copy.stamp.updated_at >= first);
    }

    #[test]
    fn test_soft_delete_hides_from_listings() {
        let entries = collection();
        let mut keep = poem("keep", "");
        let mut gone = poem("gone", "");
        entries.save_record(&mut keep).unwrap();
        entries.save_record(&mut gone).unwrap();

        assert!(entries.soft_delete(&gone.id).unwrap());
        assert!(!entries.soft_delete(&gone.id).unwrap());

        let active: Vec<_> = entries.active().into_iter().map(|m| m.id).collect();
        assert_eq!(active, vec![keep.id.clone()]);
        assert!(entries.search("gone").is_empty());
        assert!(matches!(entries.lookup(&gone.id), Availability::Missing));

        let tombstone = entries.get_meta(&gone.id).unwrap();
        assert!(tombstone.stamp.is_deleted());
        assert!(!tombstone.stamp.is_synced);
    }

    #[test]
    fn test_metadata_only_entry() {
        let entries = collection();
        let remote = poem("remote", "<p>never downloaded</p>");
        entries
            .batch_update_metadata(vec![remote_meta(&remote)])
            .unwrap();

        assert!(entries.full_record(&remote.id).is_none());
        assert!(matches!(
            entries.lookup(&remote.id),
            Availability::MetadataOnly(_)
        ));
        assert!(matches!(entries.lookup("unknown"), Availability::Missing));
        assert!(!entries.cached_body_ids().contains(&remote.id));
    }

    #[test]
    fn test_soft_delete_metadata_only_entry() {
        let entries = collection();
        let remote = poem("remote", "body");
        entries
            .batch_update_metadata(vec![remote_meta(&remote)])
            .unwrap();

        assert!(entries.soft_delete(&remote.id).unwrap());
        let meta = entries.get_meta(&remote.id).unwrap();
        assert!(meta.stamp.is_deleted());
        assert!(!meta.stamp.is_synced);
        assert!(meta.stamp.updated_at >= remote.stamp.updated_at);
    }

    #[test]
    fn test_batch_update_evicts_stale_body() {
        let entries = collection();
        let mut local = poem("old", "<p>old body</p>");
        entries.put_synced(local.clone()).unwrap();

        local.title = "new".to_string();
        local.body = "<p>new body</p>".to_string();
        local.stamp.updated_at = local.stamp.updated_at + chrono::Duration::seconds(5);
        let applied = entries
            .batch_update_metadata(vec![remote_meta(&local)])
            .unwrap();

        assert_eq!(applied, 1);
        assert!(entries.full_record(&local.id).is_none());
        assert_eq!(entries.get_meta(&local.id).unwrap().title, "new");
    }

    #[test]
    fn test_remote_writes_skip_unsynced_local() {
        let entries = collection();
        let mut local = poem("mine", "");
        entries.save_record(&mut local).unwrap();

        let mut remote = local.clone();
        remote.title = "theirs".to_string();
        remote.stamp.updated_at = remote.stamp.updated_at + chrono::Duration::hours(1);

        assert_eq!(entries.batch_update_metadata(vec![remote_meta(&remote)]).unwrap(), 0);
        assert!(!entries.put_synced(remote).unwrap());
        assert_eq!(entries.full_record(&local.id).unwrap().title, "mine");
    }

    #[test]
    fn test_mark_synced_requires_matching_timestamp() {
        let entries = collection();
        let mut entry = poem("a", "");
        entries.save_record(&mut entry).unwrap();
        let uploaded = entry.stamp.updated_at;

        // edited again while the upload was in flight
        std::thread::sleep(std::time::Duration::from_millis(2));
        entry.title = "b".to_string();
        entries.save_record(&mut entry).unwrap();

        assert!(!entries.mark_synced(&entry.id, uploaded).unwrap());
        assert_eq!(entries.unsynced().len(), 1);

        assert!(entries
            .mark_synced(&entry.id, entry.stamp.updated_at)
            .unwrap());
        assert!(entries.unsynced().is_empty());
        assert!(entries.full_record(&entry.id).unwrap().stamp.is_synced);
    }

    #[test]
    fn test_hard_delete_removes_everything() {
        let entries = collection();
        let mut entry = poem("a", "b");
        entries.save_record(&mut entry).unwrap();

        assert!(entries.hard_delete(&entry.id).unwrap());
        assert!(entries.get_meta(&entry.id).is_none());
        assert!(entries.full_record(&entry.id).is_none());
        assert!(!entries.hard_delete(&entry.id).unwrap());
    }

    #[test]
    fn test_rebuild_counts_all_records() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let entries: Collection<Entry> = Collection::new(db.clone());
        for i in 0..6 {
            let mut entry = poem(&format!("p{i}"), "");
            entries.save_record(&mut entry).unwrap();
            if i % 3 == 0 {
                entries.soft_delete(&entry.id).unwrap();
            }
        }

        // drop the index document and start from a cold cache
        db.with_conn(|conn| {
            conn.execute("DELETE FROM indexes", [])?;
            Ok(())
        })
        .unwrap();
        let cold: Collection<Entry> = Collection::new(db);
        let index = cold.metadata_index();
        assert_eq!(index.len(), 6);
        assert_eq!(cold.active().len(), 4);
    }

    #[test]
    fn test_stale_index_version_forces_rebuild() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let entries: Collection<Entry> = Collection::new(db.clone());
        let mut entry = poem("kept", "");
        entries.save_record(&mut entry).unwrap();
        entries.set_last_sync_time(timestamp::now()).unwrap();

        db.with_conn(|conn| {
            write_index_doc(
                conn,
                "entry",
                r#"{"version":1,"lastSyncTime":"2020-01-01T00:00:00.000Z","entries":[]}"#,
            )
        })
        .unwrap();

        let cold: Collection<Entry> = Collection::new(db);
        let index = cold.metadata_index();
        assert!(index.is_current());
        assert_eq!(index.len(), 1);
        assert!(index.last_sync_time.is_none());
    }

    #[test]
    fn test_rebuild_keeps_unsynced_metadata_only_tombstone() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let entries: Collection<Entry> = Collection::new(db.clone());
        let remote = poem("remote", "<p>never downloaded</p>");
        entries
            .batch_update_metadata(vec![remote_meta(&remote)])
            .unwrap();
        entries.soft_delete(&remote.id).unwrap();
        assert_eq!(entries.unsynced().len(), 1);

        // rewrite the stored index as an older version
        let mut stale: Index<EntryMeta> = (*entries.metadata_index()).clone();
        stale.version = 1;
        let doc = serde_json::to_string(&stale).unwrap();
        db.with_conn(|conn| write_index_doc(conn, "entry", &doc))
            .unwrap();

        let cold: Collection<Entry> = Collection::new(db);
        let unsynced = cold.unsynced();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].id, remote.id);
        assert!(unsynced[0].stamp.is_deleted());
        assert!(cold.metadata_index().is_current());

        // a forced rebuild keeps it as well
        assert_eq!(cold.rebuild_index().unwrap(), 1);
        assert!(cold.get_meta(&remote.id).unwrap().stamp.is_deleted());
    }

    #[test]
    fn test_corrupt_index_forces_rebuild() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let entries: Collection<Entry> = Collection::new(db.clone());
        let mut entry = poem("kept", "");
        entries.save_record(&mut entry).unwrap();

        db.with_conn(|conn| write_index_doc(conn, "entry", "not json"))
            .unwrap();
        let cold: Collection<Entry> = Collection::new(db);
        assert_eq!(cold.active().len(), 1);
    }

    #[test]
    fn test_kinds_are_isolated() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let entries: Collection<Entry> = Collection::new(db.clone());
        let books: Collection<Book> = Collection::new(db);

        let mut entry = poem("e", "");
        entries.save_record(&mut entry).unwrap();
        let mut book = Book::new("b");
        books.save_record(&mut book).unwrap();

        assert_eq!(entries.active().len(), 1);
        assert_eq!(books.active().len(), 1);
        assert!(books.get_meta(&entry.id).is_none());
    }

    #[test]
    fn test_unavailable_store_degrades() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db = Arc::new(Database::deferred(temp_dir.path().join("verse.db")));
        let entries: Collection<Entry> = Collection::new(db.clone());

        assert!(entries.active().is_empty());
        assert!(entries.full_record("x").is_none());
        assert!(entries.cached_body_ids().is_empty());

        let mut entry = poem("queued?", "");
        let err = entries.save_record(&mut entry).unwrap_err();
        assert!(matches!(err, StorageError::Unavailable));

        db.initialize().unwrap();
        entries.save_record(&mut entry).unwrap();
        assert_eq!(entries.active().len(), 1);
    }

    #[test]
    fn test_search_matches_title_and_preview() {
        let entries = collection();
        let mut a = poem("Sonbahar", "<p>yapraklar</p>");
        let mut b = poem("Kış", "<p>kar ve SONBAHAR sonrası</p>");
        let mut c = poem("Yaz", "");
        for e in [&mut a, &mut b, &mut c] {
            entries.save_record(e).unwrap();
        }

        let hits: HashSet<_> = entries
            .search("sonbahar")
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(hits.len(), 2);
        assert!(hits.contains(&a.id) && hits.contains(&b.id));
        assert_eq!(entries.search("  ").len(), 3);
    }
}
