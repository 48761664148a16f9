//! Versioned metadata index
//!
//! One index document per record kind holds the metadata projection of every
//! known record plus the sync watermark. Entries are kept sorted by id so
//! lookups are binary searches and rebuilds are deterministic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::schema::INDEX_VERSION;
use crate::models::{Metadata, Record};
use crate::timestamp::iso_millis_opt;

/// Index document for one record kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "M: Metadata"))]
pub struct Index<M> {
    pub version: u32,
    /// Start time of the last completed sync (the incremental watermark)
    #[serde(default, with = "iso_millis_opt")]
    pub last_sync_time: Option<DateTime<Utc>>,
    entries: Vec<M>,
}

impl<M: Metadata> Index<M> {
    /// An empty index at the current version
    pub fn empty() -> Self {
        Self {
            version: INDEX_VERSION,
            last_sync_time: None,
            entries: Vec::new(),
        }
    }

    /// Re-derive the index from full records
    ///
    /// The watermark is cleared, so the next sync is a full one.
    pub fn rebuild<R: Record<Meta = M>>(records: &[R]) -> Self {
        let mut entries: Vec<M> = records.iter().map(Record::to_meta).collect();
        entries.sort_by(|a, b| a.id().cmp(b.id()));
        entries.dedup_by(|a, b| a.id() == b.id());
        Self {
            version: INDEX_VERSION,
            last_sync_time: None,
            entries,
        }
    }

    /// Whether this index was written by the current schema
    pub fn is_current(&self) -> bool {
        self.version == INDEX_VERSION
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&M> {
        self.position(id).ok().map(|pos| &self.entries[pos])
    }

    /// Insert or replace the entry with the same id
    pub fn upsert(&mut self, meta: M) {
        match self.position(meta.id()) {
            Ok(pos) => self.entries[pos] = meta,
            Err(pos) => self.entries.insert(pos, meta),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<M> {
        self.position(id).ok().map(|pos| self.entries.remove(pos))
    }

    /// Every entry, tombstones included, ordered by id
    pub fn entries(&self) -> &[M] {
        &self.entries
    }

    /// Entries that are not soft-deleted
    pub fn active(&self) -> impl Iterator<Item = &M> {
        self.entries.iter().filter(|m| !m.stamp().is_deleted())
    }

    /// Entries with local changes that have not reached the remote store
    pub fn unsynced(&self) -> impl Iterator<Item = &M> {
        self.entries.iter().filter(|m| !m.stamp().is_synced)
    }

    fn position(&self, id: &str) -> Result<usize, usize> {
        self.entries.binary_search_by(|m| m.id().cmp(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entry, EntryMeta, EntryType};

    fn entry(title: &str) -> Entry {
        let mut entry = Entry::new(EntryType::Poem);
        entry.title = title.to_string();
        entry
    }

    #[test]
    fn test_rebuild_counts_tombstones_but_hides_them() {
        let mut records: Vec<Entry> = (0..5).map(|i| entry(&format!("e{i}"))).collect();
        records[1].stamp.deleted_at = Some(records[1].stamp.updated_at);
        records[3].stamp.deleted_at = Some(records[3].stamp.updated_at);

        let index = Index::rebuild(&records);
        assert_eq!(index.len(), 5);
        assert_eq!(index.active().count(), 3);
        assert!(index.is_current());
        assert!(index.last_sync_time.is_none());
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let records: Vec<Entry> = (0..4).map(|i| entry(&format!("e{i}"))).collect();
        let mut reversed = records.clone();
        reversed.reverse();

        let a = Index::rebuild(&records);
        let b = Index::rebuild(&reversed);
        let ids_a: Vec<_> = a.entries().iter().map(|m| m.id.clone()).collect();
        let ids_b: Vec<_> = b.entries().iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_upsert_and_remove() {
        let mut index: Index<EntryMeta> = Index::empty();
        let first = entry("one");
        let mut second = entry("two");

        index.upsert(second.to_meta());
        index.upsert(first.to_meta());
        assert_eq!(index.len(), 2);
        let smallest = first.id.clone().min(second.id.clone());
        assert_eq!(index.entries()[0].id, smallest);

        second.title = "two, revised".to_string();
        index.upsert(second.to_meta());
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&second.id).unwrap().title, "two, revised");

        assert!(index.remove(&first.id).is_some());
        assert!(index.remove(&first.id).is_none());
        assert!(index.get(&first.id).is_none());
    }

    #[test]
    fn test_unsynced_filter() {
        let mut index: Index<EntryMeta> = Index::empty();
        let mut synced = entry("synced").to_meta();
        synced.stamp.is_synced = true;
        index.upsert(synced);
        index.upsert(entry("local").to_meta());

        let unsynced: Vec<_> = index.unsynced().map(|m| m.title.as_str()).collect();
        assert_eq!(unsynced, ["local"]);
    }

    #[test]
    fn test_serialized_shape() {
        let mut index: Index<EntryMeta> = Index::empty();
        index.upsert(entry("x").to_meta());

        let value = serde_json::to_value(&index).unwrap();
        assert_eq!(value["version"], INDEX_VERSION);
        assert!(value["lastSyncTime"].is_null());
        assert_eq!(value["entries"].as_array().unwrap().len(), 1);

        let back: Index<EntryMeta> = serde_json::from_value(value).unwrap();
        assert_eq!(back.len(), 1);
    }
}
