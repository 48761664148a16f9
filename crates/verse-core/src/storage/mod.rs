//! Storage layer
//!
//! Local record store backed by SQLite.
//!
//! ## Architecture
//!
//! - **records**: full record bodies as JSON, one row per record
//! - **indexes**: one index document per record kind, holding the metadata
//!   projection of every known record and the sync watermark
//!
//! A record may be known only through its index entry (metadata-only): its
//! body has never been downloaded, so it is listed but cannot be opened
//! offline.

mod collection;
mod database;
mod error;
mod index;
pub mod schema;

pub use collection::{Availability, Collection};
pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use index::Index;
pub use schema::{INDEX_VERSION, SCHEMA_VERSION};
