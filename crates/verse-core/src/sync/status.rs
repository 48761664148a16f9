//! Observable sync state

use chrono::{DateTime, Utc};

use crate::models::{RecordId, RecordKind};

use super::SyncError;

/// Where the engine is in its connectivity state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No connectivity; local reads and writes only
    Offline,
    /// First sync since start-up
    Initializing,
    /// Scanning the whole remote metadata collection
    FullSync,
    /// Scanning documents changed since the watermark
    IncrementalSync,
    /// Pushing unsynced local records
    Uploading,
    /// Idle and subscribed to remote changes
    Steady,
    /// Catching up after connectivity came back
    Reinitializing,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::Offline => "offline",
            SyncPhase::Initializing => "initializing",
            SyncPhase::FullSync => "full sync",
            SyncPhase::IncrementalSync => "incremental sync",
            SyncPhase::Uploading => "uploading",
            SyncPhase::Steady => "steady",
            SyncPhase::Reinitializing => "reinitializing",
        };
        f.write_str(name)
    }
}

/// Snapshot published on the status watch channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    /// Percentage of remote documents scanned by the current run
    pub progress: Option<u8>,
    pub online: bool,
    /// Start time of the last completed sync run
    pub last_sync: Option<DateTime<Utc>>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Offline,
            progress: None,
            online: false,
            last_sync: None,
        }
    }
}

/// Discrete things that happened during sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A local record reached the remote store
    Uploaded { kind: RecordKind, id: RecordId },
    /// Remote changes were written locally
    RemoteApplied { kind: RecordKind, count: usize },
    /// Expired tombstones were purged
    TombstonesCollected { kind: RecordKind, count: usize },
    /// A failure that was logged and absorbed
    Error(String),
}

/// How much work a run does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Full,
    Incremental,
    UploadOnly,
}

/// Counters for one completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub uploaded: usize,
    pub upload_failures: usize,
    pub scanned: usize,
    pub applied: usize,
    pub kept_local: usize,
    pub skipped: usize,
    pub collected: usize,
}

impl SyncReport {
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            uploaded: 0,
            upload_failures: 0,
            scanned: 0,
            applied: 0,
            kept_local: 0,
            skipped: 0,
            collected: 0,
        }
    }
}

/// Result of asking the engine to sync
#[derive(Debug)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another run was in progress; nothing was done
    Busy,
    /// The engine is offline; nothing was attempted
    Offline,
    /// The run was aborted; the watermark is unchanged
    Failed(SyncError),
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }
}
