//! Tombstone collection
//!
//! Soft-deleted records are kept until the deletion has reached the remote
//! store and the retention window has passed; then they are purged locally.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::models::{Metadata, Record, RecordId, SyncStamp};
use crate::storage::{Collection, StorageResult};

/// Whether a tombstone may be hard-deleted
///
/// Unsynced tombstones are never collected: the deletion would never
/// propagate.
pub fn is_collectable(stamp: &SyncStamp, cutoff: DateTime<Utc>) -> bool {
    stamp.is_synced && stamp.deleted_at.is_some_and(|deleted| deleted < cutoff)
}

/// Hard-delete every synced tombstone older than `retention`
pub fn collect_tombstones<R: Record>(
    collection: &Collection<R>,
    retention: Duration,
    now: DateTime<Utc>,
) -> StorageResult<Vec<RecordId>> {
    let cutoff = now - retention;
    let expired: Vec<RecordId> = collection
        .metadata_index()
        .entries()
        .iter()
        .filter(|meta| is_collectable(meta.stamp(), cutoff))
        .map(|meta| meta.id().to_string())
        .collect();

    if !expired.is_empty() {
        collection.hard_delete_many(&expired)?;
        info!(kind = %R::KIND, count = expired.len(), "collected tombstones");
    }
    Ok(expired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entry, EntryType};
    use crate::storage::Database;
    use crate::timestamp;
    use std::sync::Arc;

    fn tombstone(age_days: i64, synced: bool) -> Entry {
        let mut entry = Entry::new(EntryType::Note);
        entry.title = format!("{age_days} days old");
        let deleted = timestamp::now() - Duration::days(age_days);
        entry.stamp.updated_at = deleted;
        entry.stamp.deleted_at = Some(deleted);
        entry.stamp.is_synced = synced;
        entry
    }

    #[test]
    fn test_collectable_predicate() {
        let cutoff = timestamp::now();
        let mut stamp = SyncStamp::new();
        stamp.is_synced = true;
        assert!(!is_collectable(&stamp, cutoff));

        stamp.deleted_at = Some(cutoff - Duration::seconds(1));
        assert!(is_collectable(&stamp, cutoff));

        stamp.is_synced = false;
        assert!(!is_collectable(&stamp, cutoff));
    }

    #[test]
    fn test_collects_only_old_synced_tombstones() {
        let entries: Collection<Entry> =
            Collection::new(Arc::new(Database::open_in_memory().unwrap()));

        let old_synced = tombstone(10, true);
        let recent_synced = tombstone(2, true);
        entries
            .batch_put_synced(vec![old_synced.clone(), recent_synced.clone()])
            .unwrap();

        // local deletion that never reached the remote store
        let mut old_unsynced = Entry::new(EntryType::Poem);
        old_unsynced.title = "unsynced".to_string();
        entries.save_record(&mut old_unsynced).unwrap();
        entries.soft_delete(&old_unsynced.id).unwrap();

        let mut alive = Entry::new(EntryType::Poem);
        alive.title = "alive".to_string();
        entries.save_record(&mut alive).unwrap();

        let now = timestamp::now() + Duration::days(8);
        let collected = collect_tombstones(&entries, Duration::days(7), now).unwrap();

        // the unsynced tombstone is 8 days old by `now` but must stay
        assert_eq!(collected.len(), 2);
        assert!(collected.contains(&old_synced.id));
        assert!(collected.contains(&recent_synced.id));
        assert!(entries.get_meta(&old_unsynced.id).is_some());
        assert!(entries.get_meta(&alive.id).is_some());
        assert!(entries.full_record(&old_synced.id).is_none());
    }

    #[test]
    fn test_retention_window_is_respected() {
        let entries: Collection<Entry> =
            Collection::new(Arc::new(Database::open_in_memory().unwrap()));
        let recent = tombstone(3, true);
        entries.put_synced(recent.clone()).unwrap();

        let collected =
            collect_tombstones(&entries, Duration::days(7), timestamp::now()).unwrap();
        assert!(collected.is_empty());
        assert!(entries.get_meta(&recent.id).is_some());
    }
}
