//! Remote document store
//!
//! The sync engine talks to the hosted store through the [`RemoteStore`]
//! trait. Documents are plain field maps keyed by record id; the local-only
//! `isSynced` flag never leaves the device.
//!
//! ## Collections
//!
//! - `records_meta`: entry metadata, queryable by `updatedAt`
//! - `records`: full entry bodies
//! - `collections`: books (metadata and body are the same document)
//!
//! Two adapters are provided: [`MemoryRemote`], an in-process store with a
//! broadcast change feed, and [`FirestoreRemote`], which speaks the Cloud
//! Firestore REST API.

mod error;
mod firestore;
mod memory;
mod value;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

pub use error::{RemoteError, RemoteResult};
pub use firestore::FirestoreRemote;
pub use memory::MemoryRemote;

use crate::models::{RecordId, SyncStamp};
use crate::timestamp;

/// Local-only fields stripped before upload
const LOCAL_FIELDS: &[&str] = &["id", "isSynced"];

/// A document in a remote collection
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDoc {
    pub id: RecordId,
    pub fields: Map<String, Value>,
}

impl RemoteDoc {
    pub fn new(id: impl Into<RecordId>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Encode a record or metadata value as a remote document
    pub fn from_record<T: Serialize>(id: &str, value: &T) -> RemoteResult<Self> {
        let invalid = |reason: String| RemoteError::InvalidDocument {
            id: id.to_string(),
            reason,
        };
        let mut fields = match serde_json::to_value(value).map_err(|e| invalid(e.to_string()))? {
            Value::Object(fields) => fields,
            other => return Err(invalid(format!("expected an object, got {other}"))),
        };
        for name in LOCAL_FIELDS {
            fields.remove(*name);
        }
        Ok(Self::new(id, fields))
    }

    /// Decode into a local value
    ///
    /// Anything read from the remote store is by definition synced.
    pub fn decode<T: DeserializeOwned>(&self) -> RemoteResult<T> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        fields.insert("isSynced".to_string(), Value::Bool(true));
        serde_json::from_value(Value::Object(fields)).map_err(|e| RemoteError::InvalidDocument {
            id: self.id.clone(),
            reason: e.to_string(),
        })
    }

    /// Patch that turns an existing document into a tombstone
    pub fn tombstone(id: &str, stamp: &SyncStamp) -> Self {
        let mut fields = Map::new();
        fields.insert(
            "updatedAt".to_string(),
            Value::String(timestamp::format(&stamp.updated_at)),
        );
        fields.insert(
            "deletedAt".to_string(),
            stamp
                .deleted_at
                .as_ref()
                .map_or(Value::Null, |at| Value::String(timestamp::format(at))),
        );
        Self::new(id, fields)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.fields
            .get("updatedAt")
            .and_then(Value::as_str)
            .and_then(timestamp::parse)
    }
}

/// What happened to a document in a change batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One document change from a live subscription
#[derive(Debug, Clone)]
pub struct Change {
    pub kind: ChangeKind,
    pub doc: RemoteDoc,
}

/// Changes delivered together; the first batch of a subscription is the
/// state at subscription time
pub type ChangeBatch = Vec<Change>;

/// Live change feed for one collection
pub type ChangeStream = BoxStream<'static, RemoteResult<ChangeBatch>>;

/// Position after the last document of a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub updated_at: DateTime<Utc>,
    pub id: RecordId,
}

/// One page of a query ordered by `updatedAt`, then id
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub docs: Vec<RemoteDoc>,
    /// Where the next page starts; `None` when this was the last page
    pub next: Option<PageCursor>,
}

/// A hosted document store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch one document
    async fn get(&self, collection: &str, id: &str) -> RemoteResult<Option<RemoteDoc>>;

    /// Create or fully replace a document
    async fn set(&self, collection: &str, doc: &RemoteDoc) -> RemoteResult<()>;

    /// Create a document or overwrite only the given fields
    async fn merge(&self, collection: &str, doc: &RemoteDoc) -> RemoteResult<()>;

    /// Remove a document
    async fn delete(&self, collection: &str, id: &str) -> RemoteResult<()>;

    /// Number of documents with `updatedAt` strictly after `after` (all if `None`)
    async fn count_updated_after(
        &self,
        collection: &str,
        after: Option<DateTime<Utc>>,
    ) -> RemoteResult<u64>;

    /// One page of documents with `updatedAt` strictly after `after`
    async fn query_updated_after(
        &self,
        collection: &str,
        after: Option<DateTime<Utc>>,
        start: Option<&PageCursor>,
        limit: usize,
    ) -> RemoteResult<Page>;

    /// Live change feed for a collection
    async fn subscribe(&self, collection: &str) -> RemoteResult<ChangeStream>;
}

/// Build the cursor that follows `docs`, if the page was full
fn next_cursor(docs: &[RemoteDoc], limit: usize) -> Option<PageCursor> {
    if docs.len() < limit {
        return None;
    }
    let last = docs.last()?;
    Some(PageCursor {
        updated_at: last.updated_at()?,
        id: last.id.clone(),
    })
}
