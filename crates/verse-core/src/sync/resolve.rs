//! Last-write-wins conflict resolution
//!
//! Decides, for one remote metadata entry, whether it replaces the local
//! copy. Whole records win or lose; there is no field-level merge.

use crate::models::Metadata;

/// What to do with an incoming remote entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Write the remote version locally
    InsertRemote,
    /// The local copy has unsynced edits; its upload will supersede the remote
    KeepLocal,
    /// Nothing to do
    Skip,
}

/// Resolve a remote entry against the local one (if any)
pub fn resolve<M: Metadata>(local: Option<&M>, remote: &M) -> Resolution {
    match local {
        None if remote.stamp().is_deleted() => Resolution::Skip,
        None => Resolution::InsertRemote,
        Some(local) if !local.stamp().is_synced => Resolution::KeepLocal,
        Some(local) if remote.stamp().updated_at > local.stamp().updated_at => {
            Resolution::InsertRemote
        }
        Some(_) => Resolution::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryMeta, EntryType, Entry, Record};
    use chrono::Duration;

    fn meta(synced: bool) -> EntryMeta {
        let mut meta = Entry::new(EntryType::Poem).to_meta();
        meta.stamp.is_synced = synced;
        meta
    }

    fn later(meta: &EntryMeta, seconds: i64) -> EntryMeta {
        let mut other = meta.clone();
        other.stamp.updated_at = meta.stamp.updated_at + Duration::seconds(seconds);
        other
    }

    #[test]
    fn test_new_remote_entry_is_inserted() {
        assert_eq!(resolve(None, &meta(true)), Resolution::InsertRemote);
    }

    #[test]
    fn test_unknown_remote_tombstone_is_skipped() {
        let mut remote = meta(true);
        remote.stamp.deleted_at = Some(remote.stamp.updated_at);
        assert_eq!(resolve(None, &remote), Resolution::Skip);
    }

    #[test]
    fn test_unsynced_local_wins() {
        let local = meta(false);
        let remote = later(&local, 60);
        assert_eq!(resolve(Some(&local), &remote), Resolution::KeepLocal);
    }

    #[test]
    fn test_strictly_newer_remote_wins() {
        let local = meta(true);
        assert_eq!(
            resolve(Some(&local), &later(&local, 1)),
            Resolution::InsertRemote
        );
        assert_eq!(resolve(Some(&local), &later(&local, -1)), Resolution::Skip);
    }

    #[test]
    fn test_equal_timestamps_skip() {
        let local = meta(true);
        let mut remote = local.clone();
        remote.title = "different, same instant".to_string();
        assert_eq!(resolve(Some(&local), &remote), Resolution::Skip);
    }

    #[test]
    fn test_newer_remote_tombstone_replaces_synced_local() {
        let local = meta(true);
        let mut remote = later(&local, 5);
        remote.stamp.deleted_at = Some(remote.stamp.updated_at);
        assert_eq!(resolve(Some(&local), &remote), Resolution::InsertRemote);
    }

    #[test]
    fn test_winner_is_the_greater_timestamp_either_way() {
        let a = meta(true);
        let b = later(&a, 3);
        assert_eq!(resolve(Some(&a), &b), Resolution::InsertRemote);
        assert_eq!(resolve(Some(&b), &a), Resolution::Skip);
    }
}
