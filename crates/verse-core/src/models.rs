//! Data models for Verse
//!
//! Two record kinds are stored and synced: journal [`Entry`] values (poems and
//! notes) and [`Book`] collections that reference entries by id. Every record
//! has a compact metadata projection that lives in the local index and in the
//! remote metadata collection.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::preview;
use crate::timestamp::{self, iso_millis, iso_millis_opt};

/// Opaque, time-ordered record identifier
pub type RecordId = String;

/// Allocate a new identifier (UUIDv7, so ids sort by creation time)
pub fn new_id() -> RecordId {
    Uuid::now_v7().to_string()
}

/// The record kinds known to the store and the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Entry,
    Book,
}

impl RecordKind {
    /// Key used for this kind in the local database
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Entry => "entry",
            RecordKind::Book => "book",
        }
    }

    /// Remote collection holding the metadata documents
    pub fn meta_collection(&self) -> &'static str {
        match self {
            RecordKind::Entry => "records_meta",
            RecordKind::Book => "collections",
        }
    }

    /// Remote collection holding the full documents
    pub fn body_collection(&self) -> &'static str {
        match self {
            RecordKind::Entry => "records",
            RecordKind::Book => "collections",
        }
    }

    /// Whether metadata and full documents share one remote collection
    pub fn meta_is_body(&self) -> bool {
        self.meta_collection() == self.body_collection()
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync bookkeeping shared by every record and metadata entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStamp {
    #[serde(with = "iso_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "iso_millis_opt")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_synced: bool,
}

impl SyncStamp {
    /// Stamp for a record created right now
    pub fn new() -> Self {
        let now = timestamp::now();
        Self {
            created_at: now,
            updated_at: now,
            deleted_at: None,
            is_synced: false,
        }
    }

    /// Whether this record is a tombstone
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Record a local mutation
    ///
    /// `updated_at` never moves backwards relative to `previous`, even if the
    /// wall clock does.
    pub fn touch(&mut self, previous: Option<DateTime<Utc>>) {
        let now = timestamp::now();
        let floor = previous.into_iter().chain([self.updated_at]).max();
        self.updated_at = floor.map_or(now, |floor| floor.max(now));
        self.is_synced = false;
    }
}

impl Default for SyncStamp {
    fn default() -> Self {
        Self::new()
    }
}

/// A metadata projection stored in the index
pub trait Metadata: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn stamp(&self) -> &SyncStamp;
    fn stamp_mut(&mut self) -> &mut SyncStamp;
    fn title(&self) -> &str;

    /// Searchable excerpt of the body, if the kind has one
    fn preview(&self) -> &str {
        ""
    }
}

/// A full record with a body that may or may not be cached locally
pub trait Record: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Meta: Metadata;

    const KIND: RecordKind;

    fn id(&self) -> &str;
    fn stamp(&self) -> &SyncStamp;
    fn stamp_mut(&mut self) -> &mut SyncStamp;

    /// Project this record to its index entry
    fn to_meta(&self) -> Self::Meta;

    /// Save-validity predicate: drafts without content are never persisted
    fn has_content(&self) -> bool;
}

// ==================== Entries ====================

/// Classification of a journal entry, fixed at creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    #[default]
    Poem,
    Note,
}

impl std::str::FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "poem" => Ok(EntryType::Poem),
            "note" => Ok(EntryType::Note),
            other => Err(format!("unknown entry type '{other}' (expected poem or note)")),
        }
    }
}

/// Presentation flags carried with an entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleFlags {
    #[serde(default)]
    pub centered: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub bold: bool,
}

/// A journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: RecordId,
    #[serde(default)]
    pub title: String,
    /// Rich-text body (HTML)
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub footer: String,
    #[serde(default, rename = "styleFlags")]
    pub style: StyleFlags,
    #[serde(default, rename = "type")]
    entry_type: EntryType,
    #[serde(default)]
    rating: Option<u8>,
    #[serde(flatten)]
    pub stamp: SyncStamp,
}

impl Entry {
    /// Create an empty entry of the given type
    pub fn new(entry_type: EntryType) -> Self {
        Self {
            id: new_id(),
            title: String::new(),
            body: String::new(),
            footer: String::new(),
            style: StyleFlags::default(),
            entry_type,
            rating: None,
            stamp: SyncStamp::new(),
        }
    }

    /// Attach a rating (clamped to 1..=5); only meaningful before first save
    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating.clamp(1, 5));
        self
    }

    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    pub fn rating(&self) -> Option<u8> {
        self.rating
    }
}

/// Index entry for a journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMeta {
    pub id: RecordId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub preview: String,
    #[serde(default, rename = "type")]
    pub entry_type: EntryType,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(flatten)]
    pub stamp: SyncStamp,
}

impl Metadata for EntryMeta {
    fn id(&self) -> &str {
        &self.id
    }

    fn stamp(&self) -> &SyncStamp {
        &self.stamp
    }

    fn stamp_mut(&mut self) -> &mut SyncStamp {
        &mut self.stamp
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn preview(&self) -> &str {
        &self.preview
    }
}

impl Record for Entry {
    type Meta = EntryMeta;

    const KIND: RecordKind = RecordKind::Entry;

    fn id(&self) -> &str {
        &self.id
    }

    fn stamp(&self) -> &SyncStamp {
        &self.stamp
    }

    fn stamp_mut(&mut self) -> &mut SyncStamp {
        &mut self.stamp
    }

    fn to_meta(&self) -> EntryMeta {
        EntryMeta {
            id: self.id.clone(),
            title: self.title.clone(),
            preview: preview::excerpt(&self.body),
            entry_type: self.entry_type,
            rating: self.rating,
            stamp: self.stamp.clone(),
        }
    }

    fn has_content(&self) -> bool {
        !self.title.trim().is_empty() || !preview::plain_text(&self.body).is_empty()
    }
}

// ==================== Books ====================

/// An ordered collection of entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: RecordId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    member_ids: Vec<RecordId>,
    #[serde(flatten)]
    pub stamp: SyncStamp,
}

impl Book {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            member_ids: Vec::new(),
            stamp: SyncStamp::new(),
        }
    }

    /// Entry ids in book order
    pub fn members(&self) -> &[RecordId] {
        &self.member_ids
    }

    /// Append an entry; returns false if it is already a member
    pub fn add_member(&mut self, entry_id: impl Into<RecordId>) -> bool {
        let entry_id = entry_id.into();
        if self.member_ids.contains(&entry_id) {
            return false;
        }
        self.member_ids.push(entry_id);
        true
    }

    pub fn remove_member(&mut self, entry_id: &str) -> bool {
        match self.member_ids.iter().position(|id| id == entry_id) {
            Some(pos) => {
                self.member_ids.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Move a member to a new position (clamped to the end)
    pub fn move_member(&mut self, entry_id: &str, to: usize) -> bool {
        let Some(from) = self.member_ids.iter().position(|id| id == entry_id) else {
            return false;
        };
        let id = self.member_ids.remove(from);
        let to = to.min(self.member_ids.len());
        self.member_ids.insert(to, id);
        true
    }
}

/// Index entry for a book
///
/// Books carry no bulky body, so their metadata keeps the member list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMeta {
    pub id: RecordId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub member_ids: Vec<RecordId>,
    #[serde(flatten)]
    pub stamp: SyncStamp,
}

impl Metadata for BookMeta {
    fn id(&self) -> &str {
        &self.id
    }

    fn stamp(&self) -> &SyncStamp {
        &self.stamp
    }

    fn stamp_mut(&mut self) -> &mut SyncStamp {
        &mut self.stamp
    }

    fn title(&self) -> &str {
        &self.title
    }
}

impl Record for Book {
    type Meta = BookMeta;

    const KIND: RecordKind = RecordKind::Book;

    fn id(&self) -> &str {
        &self.id
    }

    fn stamp(&self) -> &SyncStamp {
        &self.stamp
    }

    fn stamp_mut(&mut self) -> &mut SyncStamp {
        &mut self.stamp
    }

    fn to_meta(&self) -> BookMeta {
        BookMeta {
            id: self.id.clone(),
            title: self.title.clone(),
            member_ids: self.member_ids.clone(),
            stamp: self.stamp.clone(),
        }
    }

    fn has_content(&self) -> bool {
        !self.title.trim().is_empty() || !self.member_ids.is_empty()
    }
}
