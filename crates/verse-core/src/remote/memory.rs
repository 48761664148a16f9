//! In-process remote store
//!
//! Keeps collections in memory and publishes every write on a broadcast
//! channel, so several engines sharing one `MemoryRemote` behave like
//! devices sharing a hosted store. It can be switched offline to exercise
//! connectivity failures.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::warn;

use super::{
    next_cursor, Change, ChangeBatch, ChangeKind, ChangeStream, Page, PageCursor, RemoteDoc,
    RemoteError, RemoteResult, RemoteStore,
};
use crate::models::RecordId;

const FEED_CAPACITY: usize = 256;

type Documents = BTreeMap<RecordId, Map<String, Value>>;

/// Remote store held in memory
pub struct MemoryRemote {
    collections: Mutex<HashMap<String, Documents>>,
    feeds: Mutex<HashMap<String, broadcast::Sender<ChangeBatch>>>,
    online: AtomicBool,
    writes: AtomicUsize,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            feeds: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    /// Simulate losing or regaining connectivity
    ///
    /// Going offline cuts every open change feed.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        if !online {
            self.feeds
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Number of successful `set`, `merge` and `delete` calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of a collection, ordered by id
    pub fn documents(&self, collection: &str) -> Vec<RemoteDoc> {
        self.lock_collections()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| RemoteDoc::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check_online(&self) -> RemoteResult<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(RemoteError::Unreachable("memory remote is offline".to_string()))
        }
    }

    fn lock_collections(&self) -> MutexGuard<'_, HashMap<String, Documents>> {
        self.collections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn feed(&self, collection: &str) -> broadcast::Sender<ChangeBatch> {
        self.feeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(collection.to_string())
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .clone()
    }

    fn publish(&self, collection: &str, change: Change) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        // no subscribers is fine
        let _ = self.feed(collection).send(vec![change]);
    }

    fn write(
        &self,
        collection: &str,
        doc: &RemoteDoc,
        apply: impl FnOnce(&mut Map<String, Value>),
    ) -> RemoteResult<()> {
        self.check_online()?;
        let change = {
            let mut collections = self.lock_collections();
            let docs = collections.entry(collection.to_string()).or_default();
            let kind = if docs.contains_key(&doc.id) {
                ChangeKind::Modified
            } else {
                ChangeKind::Added
            };
            let fields = docs.entry(doc.id.clone()).or_default();
            apply(fields);
            Change {
                kind,
                doc: RemoteDoc::new(doc.id.clone(), fields.clone()),
            }
        };
        self.publish(collection, change);
        Ok(())
    }

    fn matching(&self, collection: &str, after: Option<DateTime<Utc>>) -> Vec<RemoteDoc> {
        let mut docs: Vec<RemoteDoc> = self
            .documents(collection)
            .into_iter()
            .filter(|doc| match (after, doc.updated_at()) {
                (None, _) => true,
                (Some(after), Some(updated)) => updated > after,
                (Some(_), None) => false,
            })
            .collect();
        docs.sort_by(|a, b| {
            a.updated_at()
                .cmp(&b.updated_at())
                .then_with(|| a.id.cmp(&b.id))
        });
        docs
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn get(&self, collection: &str, id: &str) -> RemoteResult<Option<RemoteDoc>> {
        self.check_online()?;
        Ok(self
            .lock_collections()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| RemoteDoc::new(id, fields.clone())))
    }

    async fn set(&self, collection: &str, doc: &RemoteDoc) -> RemoteResult<()> {
        self.write(collection, doc, |fields| *fields = doc.fields.clone())
    }

    async fn merge(&self, collection: &str, doc: &RemoteDoc) -> RemoteResult<()> {
        self.write(collection, doc, |fields| {
            fields.extend(doc.fields.iter().map(|(k, v)| (k.clone(), v.clone())))
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> RemoteResult<()> {
        self.check_online()?;
        let removed = self
            .lock_collections()
            .get_mut(collection)
            .and_then(|docs| docs.remove(id));
        if let Some(fields) = removed {
            self.publish(
                collection,
                Change {
                    kind: ChangeKind::Removed,
                    doc: RemoteDoc::new(id, fields),
                },
            );
        }
        Ok(())
    }

    async fn count_updated_after(
        &self,
        collection: &str,
        after: Option<DateTime<Utc>>,
    ) -> RemoteResult<u64> {
        self.check_online()?;
        Ok(self.matching(collection, after).len() as u64)
    }

    async fn query_updated_after(
        &self,
        collection: &str,
        after: Option<DateTime<Utc>>,
        start: Option<&PageCursor>,
        limit: usize,
    ) -> RemoteResult<Page> {
        self.check_online()?;
        let docs: Vec<RemoteDoc> = self
            .matching(collection, after)
            .into_iter()
            .filter(|doc| match start {
                None => true,
                Some(cursor) => {
                    (doc.updated_at(), doc.id.as_str())
                        > (Some(cursor.updated_at), cursor.id.as_str())
                }
            })
            .take(limit)
            .collect();
        let next = next_cursor(&docs, limit);
        Ok(Page { docs, next })
    }

    async fn subscribe(&self, collection: &str) -> RemoteResult<ChangeStream> {
        self.check_online()?;
        let rx = self.feed(collection).subscribe();
        let initial: ChangeBatch = self
            .documents(collection)
            .into_iter()
            .map(|doc| Change {
                kind: ChangeKind::Added,
                doc,
            })
            .collect();

        let updates = stream::unfold(Some(rx), |state| async move {
            let mut rx = state?;
            loop {
                match rx.recv().await {
                    Ok(batch) => return Some((Ok(batch), Some(rx))),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "change feed lagged, batches dropped");
                    }
                    // report the cut once, then end the stream
                    Err(broadcast::error::RecvError::Closed) => {
                        return Some((Err(RemoteError::FeedClosed), None))
                    }
                }
            }
        });

        Ok(stream::once(async move { Ok(initial) })
            .chain(updates)
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp;

    fn doc(id: &str, updated: DateTime<Utc>) -> RemoteDoc {
        let mut fields = Map::new();
        fields.insert(
            "updatedAt".to_string(),
            Value::String(timestamp::format(&updated)),
        );
        fields.insert("title".to_string(), Value::String(id.to_string()));
        RemoteDoc::new(id, fields)
    }

    #[tokio::test]
    async fn test_set_get_merge() {
        let remote = MemoryRemote::new();
        let now = timestamp::now();
        remote.set("records", &doc("a", now)).await.unwrap();

        let mut patch = Map::new();
        patch.insert("deletedAt".to_string(), Value::String("x".to_string()));
        remote
            .merge("records", &RemoteDoc::new("a", patch))
            .await
            .unwrap();

        let stored = remote.get("records", "a").await.unwrap().unwrap();
        assert_eq!(stored.fields["title"], "a");
        assert_eq!(stored.fields["deletedAt"], "x");
        assert!(remote.get("records", "b").await.unwrap().is_none());
        assert_eq!(remote.write_count(), 2);
    }

    #[tokio::test]
    async fn test_offline_rejects_calls() {
        let remote = MemoryRemote::new();
        remote.set_online(false);

        let err = remote.set("records", &doc("a", timestamp::now())).await;
        assert!(matches!(err, Err(RemoteError::Unreachable(_))));
        assert!(remote.get("records", "a").await.is_err());
        assert_eq!(remote.write_count(), 0);

        remote.set_online(true);
        remote.set("records", &doc("a", timestamp::now())).await.unwrap();
    }

    #[tokio::test]
    async fn test_paged_query_after_watermark() {
        let remote = MemoryRemote::new();
        let base = timestamp::now();
        for i in 0..5 {
            let at = base + chrono::Duration::seconds(i);
            remote.set("m", &doc(&format!("d{i}"), at)).await.unwrap();
        }

        assert_eq!(remote.count_updated_after("m", None).await.unwrap(), 5);
        assert_eq!(remote.count_updated_after("m", Some(base)).await.unwrap(), 4);

        let first = remote.query_updated_after("m", Some(base), None, 3).await.unwrap();
        assert_eq!(first.docs.len(), 3);
        let cursor = first.next.unwrap();
        let second = remote
            .query_updated_after("m", Some(base), Some(&cursor), 3)
            .await
            .unwrap();
        let ids: Vec<_> = second.docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["d4"]);
        assert!(second.next.is_none());
    }

    #[tokio::test]
    async fn test_subscription_delivers_initial_state_then_changes() {
        let remote = MemoryRemote::new();
        remote.set("m", &doc("a", timestamp::now())).await.unwrap();

        let mut feed = remote.subscribe("m").await.unwrap();
        let initial = feed.next().await.unwrap().unwrap();
        assert_eq!(initial.len(), 1);

        remote.set("m", &doc("b", timestamp::now())).await.unwrap();
        remote.delete("m", "a").await.unwrap();

        let added = feed.next().await.unwrap().unwrap();
        assert_eq!(added[0].kind, ChangeKind::Added);
        assert_eq!(added[0].doc.id, "b");

        let removed = feed.next().await.unwrap().unwrap();
        assert_eq!(removed[0].kind, ChangeKind::Removed);
        assert_eq!(removed[0].doc.id, "a");
    }

    #[tokio::test]
    async fn test_going_offline_closes_feeds() {
        let remote = MemoryRemote::new();
        let mut feed = remote.subscribe("m").await.unwrap();
        assert!(feed.next().await.unwrap().unwrap().is_empty());

        remote.set_online(false);
        let err = feed.next().await.unwrap().unwrap_err();
        assert!(matches!(err, RemoteError::FeedClosed));
        assert!(err.is_connectivity());
        assert!(feed.next().await.is_none());

        // a fresh subscription works once back online
        remote.set_online(true);
        let mut feed = remote.subscribe("m").await.unwrap();
        feed.next().await.unwrap().unwrap();
        remote.set("m", &doc("a", timestamp::now())).await.unwrap();
        assert_eq!(feed.next().await.unwrap().unwrap()[0].doc.id, "a");
    }
}
