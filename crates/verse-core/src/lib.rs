//! Verse Core Library
//!
//! This crate provides the core functionality for Verse, an offline-first
//! journal for poems and notes that syncs with a hosted document store.
//!
//! # Architecture
//!
//! - **SQLite**: every record body and a per-kind metadata index live in one
//!   local database; listings never touch record bodies
//! - **Sync engine**: uploads local changes and pulls remote ones,
//!   resolving conflicts last-write-wins
//!
//! Reads and writes always go to the local store; the network is optional.
//!
//! # Quick Start
//!
//! ```text
//! let journal = Journal::open()?;
//!
//! // Drafts stay in memory until they have content
//! let mut poem = journal.create_entry(EntryType::Poem);
//! poem.title = "Deneme".to_string();
//! journal.save(&mut poem)?;
//!
//! // Query the index
//! let recent = journal.entries().active();
//! ```
//!
//! # Modules
//!
//! - `journal`: Unified storage interface (main entry point)
//! - `models`: Entries, books and their metadata projections
//! - `storage`: SQLite record store and metadata index
//! - `drafts`: Unsaved records held in memory
//! - `remote`: Remote document store trait and adapters
//! - `sync`: Sync engine and background task
//! - `config`: Application configuration

pub mod config;
pub mod drafts;
pub mod journal;
pub mod models;
pub mod preview;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod timestamp;

pub use config::{Config, RemoteConfig};
pub use drafts::{Drafts, SaveOutcome};
pub use journal::{Journal, Stored};
pub use models::{
    Book, BookMeta, Entry, EntryMeta, EntryType, Metadata, Record, RecordId, RecordKind,
    StyleFlags, SyncStamp,
};
pub use remote::{FirestoreRemote, MemoryRemote, RemoteError, RemoteStore};
pub use storage::{Availability, Collection, Database, StorageError};
pub use sync::{SyncCommand, SyncEngine, SyncError, SyncEvent, SyncHandle, SyncPhase, SyncStatus};
