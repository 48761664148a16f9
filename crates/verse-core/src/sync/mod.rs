//! Sync engine for the remote document store
//!
//! Local writes land in SQLite first and are pushed in the background; remote
//! changes are pulled by watermark and applied last-write-wins on
//! `updatedAt`. There is no field-level merge: a record with unsynced local
//! changes always wins until it has been uploaded.
//!
//! ## Flow
//!
//! 1. Connectivity comes back: upload, then a full or incremental pull
//! 2. Live subscription: remote changes are applied as they arrive
//! 3. Periodic tick: upload pending changes
//! 4. After a full pull: expired tombstones are purged
//!
//! ## Usage
//!
//! ```ignore
//! let (engine, events) = SyncEngine::new(&journal, remote, SyncSettings::from_config(&config));
//! let handle = spawn_sync_task(Arc::new(engine), events, config.sync_interval());
//! handle.command_tx.send(SyncCommand::SetOnline(true)).await?;
//! ```

mod engine;
mod error;
mod resolve;
mod status;
mod task;
mod tombstone;

pub use engine::{LiveFeed, SyncEngine, SyncEvents, SyncSettings};
pub use error::{SyncError, SyncResult};
pub use resolve::{resolve, Resolution};
pub use status::{SyncEvent, SyncMode, SyncOutcome, SyncPhase, SyncReport, SyncStatus};
pub use task::{spawn_sync_task, SyncCommand, SyncHandle};
pub use tombstone::{collect_tombstones, is_collectable};
