//! Sync engine
//!
//! Keeps the local collections consistent with the remote store:
//!
//! 1. Upload every unsynced record (body first, then metadata, then mark
//!    synced), so local edits are never clobbered by a stale remote copy
//! 2. Page through remote metadata (all of it, or only what changed since
//!    the watermark) and resolve each entry last-write-wins
//! 3. Apply the accepted entries in one batch per kind and advance the
//!    watermark to the start time of the run
//! 4. After a full sync, purge expired tombstones
//!
//! Only one run is active at a time; overlapping requests return
//! [`SyncOutcome::Busy`]. Failures are logged and reported as
//! [`SyncEvent::Error`], never propagated to the caller as panics or
//! partial state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::error::{SyncError, SyncResult};
use super::resolve::{resolve, Resolution};
use super::status::{SyncEvent, SyncMode, SyncOutcome, SyncPhase, SyncReport, SyncStatus};
use super::tombstone::collect_tombstones;
use crate::config::Config;
use crate::journal::Journal;
use crate::models::{Book, Entry, Metadata, Record, RecordKind};
use crate::remote::{ChangeBatch, ChangeKind, RemoteDoc, RemoteResult, RemoteStore};
use crate::storage::{Availability, Collection};
use crate::timestamp;

/// Receiver for [`SyncEvent`]s
pub type SyncEvents = mpsc::UnboundedReceiver<SyncEvent>;

/// Remote change batches from every synced collection, initial state skipped
pub type LiveFeed = BoxStream<'static, (RecordKind, RemoteResult<ChangeBatch>)>;

/// Tunables for the engine
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub page_size: usize,
    pub tombstone_retention: Duration,
    pub full_sync_after: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.page_size.max(1),
            tombstone_retention: config.tombstone_retention(),
            full_sync_after: config.full_sync_after(),
        }
    }
}

/// Scan progress across every kind in one run
struct Progress {
    total: u64,
    scanned: u64,
}

/// Resets the running flag when a run ends
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Synchronizes a [`Journal`] with a [`RemoteStore`]
pub struct SyncEngine {
    remote: Arc<dyn RemoteStore>,
    entries: Arc<Collection<Entry>>,
    books: Arc<Collection<Book>>,
    settings: SyncSettings,
    running: AtomicBool,
    online: AtomicBool,
    initialized: AtomicBool,
    status: watch::Sender<SyncStatus>,
    events: mpsc::UnboundedSender<SyncEvent>,
}

impl SyncEngine {
    /// Create an engine for `journal`; it starts offline
    pub fn new(
        journal: &Journal,
        remote: Arc<dyn RemoteStore>,
        settings: SyncSettings,
    ) -> (Self, SyncEvents) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(SyncStatus {
            last_sync: journal.entries().last_sync_time(),
            ..SyncStatus::default()
        });
        let engine = Self {
            remote,
            entries: journal.entries().clone(),
            books: journal.books().clone(),
            settings,
            running: AtomicBool::new(false),
            online: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            status,
            events,
        };
        (engine, event_rx)
    }

    /// Watch phase and progress
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Whether a sync run has completed since start-up
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    // ==================== Connectivity ====================

    /// Connectivity came back: initialize or catch up incrementally
    pub async fn handle_online(&self) -> SyncOutcome {
        self.set_online(true);
        info!("sync engine online");

        if self.is_initialized() {
            self.run(SyncMode::Incremental, SyncPhase::Reinitializing).await
        } else {
            self.initialize().await
        }
    }

    /// Connectivity lost; in-flight calls are left to fail on their own
    pub fn handle_offline(&self) {
        self.set_online(false);
        info!("sync engine offline");
    }

    /// Record connectivity without starting a run
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        self.status.send_modify(|s| {
            s.online = online;
            if !online {
                s.phase = SyncPhase::Offline;
                s.progress = None;
            }
        });
    }

    /// Periodic tick: upload pending changes while online
    pub async fn tick(&self) -> SyncOutcome {
        if !self.is_online() {
            return SyncOutcome::Offline;
        }
        if !self.is_initialized() {
            return self.initialize().await;
        }
        self.run(SyncMode::UploadOnly, SyncPhase::Uploading).await
    }

    async fn initialize(&self) -> SyncOutcome {
        self.run(SyncMode::Incremental, SyncPhase::Initializing).await
    }

    // ==================== Runs ====================

    /// Upload, then scan every remote document
    pub async fn full_sync(&self) -> SyncOutcome {
        self.run(SyncMode::Full, SyncPhase::FullSync).await
    }

    /// Upload, then scan documents changed since the watermark
    ///
    /// Runs as a full sync for a kind with no watermark or a watermark older
    /// than `full_sync_after`.
    pub async fn incremental_sync(&self) -> SyncOutcome {
        self.run(SyncMode::Incremental, SyncPhase::IncrementalSync)
            .await
    }

    /// Push unsynced local records only
    pub async fn upload(&self) -> SyncOutcome {
        self.run(SyncMode::UploadOnly, SyncPhase::Uploading).await
    }

    async fn run(&self, mode: SyncMode, phase: SyncPhase) -> SyncOutcome {
        if !self.is_online() {
            return SyncOutcome::Offline;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(?mode, "sync already running");
            return SyncOutcome::Busy;
        }
        let _guard = RunGuard(&self.running);

        self.set_phase(phase, Some(0));
        let result = match mode {
            SyncMode::UploadOnly => self.upload_all().await,
            SyncMode::Full | SyncMode::Incremental => self.sync_all(mode, phase).await,
        };

        match result {
            Ok(report) => {
                if mode != SyncMode::UploadOnly {
                    self.initialized.store(true, Ordering::SeqCst);
                }
                info!(
                    mode = ?report.mode,
                    uploaded = report.uploaded,
                    scanned = report.scanned,
                    applied = report.applied,
                    collected = report.collected,
                    "sync run completed"
                );
                self.finish_run();
                SyncOutcome::Completed(report)
            }
            Err(e) => {
                warn!(?mode, error = %e, "sync run aborted");
                self.emit(SyncEvent::Error(e.to_string()));
                self.finish_run();
                SyncOutcome::Failed(e)
            }
        }
    }

    async fn upload_all(&self) -> SyncResult<SyncReport> {
        let mut report = SyncReport::new(SyncMode::UploadOnly);
        self.upload_kind(&self.books, &mut report).await?;
        self.upload_kind(&self.entries, &mut report).await?;
        Ok(report)
    }

    async fn sync_all(&self, requested: SyncMode, phase: SyncPhase) -> SyncResult<SyncReport> {
        let started = timestamp::now();

        let mut report = self.upload_all().await?;
        let book_mode = self.mode_for(&self.books, requested, started);
        let entry_mode = self.mode_for(&self.entries, requested, started);
        report.mode = if book_mode == SyncMode::Full || entry_mode == SyncMode::Full {
            SyncMode::Full
        } else {
            SyncMode::Incremental
        };

        if phase != SyncPhase::Initializing && phase != SyncPhase::Reinitializing {
            let scan_phase = match report.mode {
                SyncMode::Full => SyncPhase::FullSync,
                _ => SyncPhase::IncrementalSync,
            };
            self.set_phase(scan_phase, Some(0));
        }

        let mut progress = Progress {
            total: self.count_remote(&self.books, book_mode).await?
                + self.count_remote(&self.entries, entry_mode).await?,
            scanned: 0,
        };

        self.pull(&self.books, book_mode, started, &mut progress, &mut report)
            .await?;
        self.pull(&self.entries, entry_mode, started, &mut progress, &mut report)
            .await?;

        self.status.send_modify(|s| s.last_sync = Some(started));
        Ok(report)
    }

    /// Full when asked for, when there is no watermark, or when it is too old
    fn mode_for<R: Record>(
        &self,
        collection: &Collection<R>,
        requested: SyncMode,
        now: DateTime<Utc>,
    ) -> SyncMode {
        if requested == SyncMode::Full {
            return SyncMode::Full;
        }
        match collection.last_sync_time() {
            Some(watermark) if now - watermark <= self.settings.full_sync_after => {
                SyncMode::Incremental
            }
            Some(watermark) => {
                info!(kind = %R::KIND, %watermark, "watermark is stale, running full sync");
                SyncMode::Full
            }
            None => SyncMode::Full,
        }
    }

    fn watermark_for<R: Record>(
        &self,
        collection: &Collection<R>,
        mode: SyncMode,
    ) -> Option<DateTime<Utc>> {
        match mode {
            SyncMode::Full => None,
            _ => collection.last_sync_time(),
        }
    }

    async fn count_remote<R: Record>(
        &self,
        collection: &Collection<R>,
        mode: SyncMode,
    ) -> SyncResult<u64> {
        let after = self.watermark_for(collection, mode);
        Ok(self
            .remote
            .count_updated_after(R::KIND.meta_collection(), after)
            .await?)
    }

    // ==================== Download ====================

    async fn pull<R: Record>(
        &self,
        collection: &Collection<R>,
        mode: SyncMode,
        started: DateTime<Utc>,
        progress: &mut Progress,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let kind = R::KIND;
        let after = self.watermark_for(collection, mode);
        let index = collection.metadata_index();
        let mut staged: Vec<RemoteDoc> = Vec::new();
        let mut cursor = None;

        loop {
            let page = self
                .remote
                .query_updated_after(
                    kind.meta_collection(),
                    after,
                    cursor.as_ref(),
                    self.settings.page_size,
                )
                .await?;

            for doc in page.docs {
                progress.scanned += 1;
                report.scanned += 1;
                let Some(remote) = decode_logged::<R::Meta>(&doc) else {
                    continue;
                };
                match resolve(index.get(&doc.id), &remote) {
                    Resolution::InsertRemote => staged.push(doc),
                    Resolution::KeepLocal => {
                        debug!(%kind, id = %doc.id, "keeping unsynced local copy");
                        report.kept_local += 1;
                    }
                    Resolution::Skip => report.skipped += 1,
                }
            }
            self.publish_progress(progress);

            cursor = page.next;
            if cursor.is_none() {
                break;
            }
        }

        let applied = self.apply_staged(collection, staged)?;
        if applied > 0 {
            self.emit(SyncEvent::RemoteApplied {
                kind,
                count: applied,
            });
        }
        report.applied += applied;

        // only after the batch is in place
        collection.set_last_sync_time(started)?;

        if mode == SyncMode::Full {
            let collected =
                collect_tombstones(collection, self.settings.tombstone_retention, started)?;
            if !collected.is_empty() {
                self.emit(SyncEvent::TombstonesCollected {
                    kind,
                    count: collected.len(),
                });
            }
            report.collected += collected.len();
        }

        debug!(%kind, ?mode, applied, "pull finished");
        Ok(())
    }

    /// Write accepted remote documents in one batch
    ///
    /// Kinds whose metadata document is the full document are stored whole;
    /// others only update the index and evict stale bodies.
    fn apply_staged<R: Record>(
        &self,
        collection: &Collection<R>,
        docs: Vec<RemoteDoc>,
    ) -> SyncResult<usize> {
        if docs.is_empty() {
            return Ok(0);
        }
        let applied = if R::KIND.meta_is_body() {
            let records: Vec<R> = docs.iter().filter_map(decode_logged).collect();
            collection.batch_put_synced(records)?
        } else {
            let metas: Vec<R::Meta> = docs.iter().filter_map(decode_logged).collect();
            collection.batch_update_metadata(metas)?
        };
        Ok(applied)
    }

    // ==================== Upload ====================

    async fn upload_kind<R: Record>(
        &self,
        collection: &Collection<R>,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        for meta in collection.unsynced() {
            match self.upload_one(collection, &meta).await {
                Ok(true) => {
                    report.uploaded += 1;
                    self.emit(SyncEvent::Uploaded {
                        kind: R::KIND,
                        id: meta.id().to_string(),
                    });
                }
                Ok(false) => {
                    debug!(kind = %R::KIND, id = meta.id(), "edited during upload, stays unsynced");
                }
                Err(e) if e.is_connectivity() => return Err(e),
                Err(e) => {
                    warn!(kind = %R::KIND, id = meta.id(), error = %e, "upload failed");
                    report.upload_failures += 1;
                    self.emit(SyncEvent::Error(e.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Push one record; returns whether it could be marked synced
    async fn upload_one<R: Record>(
        &self,
        collection: &Collection<R>,
        meta: &R::Meta,
    ) -> SyncResult<bool> {
        let kind = R::KIND;
        let uploaded_at = match collection.full_record(meta.id()) {
            Some(record) => {
                let body = RemoteDoc::from_record(record.id(), &record)?;
                self.remote.set(kind.body_collection(), &body).await?;
                if !kind.meta_is_body() {
                    let projection = RemoteDoc::from_record(record.id(), &record.to_meta())?;
                    self.remote.set(kind.meta_collection(), &projection).await?;
                }
                record.stamp().updated_at
            }
            None => {
                // metadata-only: the body was never downloaded
                if !kind.meta_is_body() && meta.stamp().is_deleted() {
                    let patch = RemoteDoc::tombstone(meta.id(), meta.stamp());
                    self.remote.merge(kind.body_collection(), &patch).await?;
                }
                let projection = RemoteDoc::from_record(meta.id(), meta)?;
                self.remote.set(kind.meta_collection(), &projection).await?;
                meta.stamp().updated_at
            }
        };
        Ok(collection.mark_synced(meta.id(), uploaded_at)?)
    }

    // ==================== Live changes ====================

    /// Subscribe to remote changes for every synced kind
    ///
    /// The first batch of each subscription (the state at subscription time)
    /// is dropped; the sync run already covered it.
    pub async fn subscribe(&self) -> SyncResult<LiveFeed> {
        let books = self
            .remote
            .subscribe(RecordKind::Book.meta_collection())
            .await?
            .skip(1)
            .map(|batch| (RecordKind::Book, batch));
        let entries = self
            .remote
            .subscribe(RecordKind::Entry.meta_collection())
            .await?
            .skip(1)
            .map(|batch| (RecordKind::Entry, batch));
        Ok(stream::select(books, entries).boxed())
    }

    /// Apply one batch from the live feed
    pub fn apply_live(&self, kind: RecordKind, batch: ChangeBatch) -> SyncResult<usize> {
        match kind {
            RecordKind::Entry => self.apply_changes(&self.entries, batch),
            RecordKind::Book => self.apply_changes(&self.books, batch),
        }
    }

    fn apply_changes<R: Record>(
        &self,
        collection: &Collection<R>,
        batch: ChangeBatch,
    ) -> SyncResult<usize> {
        let index = collection.metadata_index();
        let mut staged = Vec::new();
        let mut removed = Vec::new();

        for change in batch {
            let id = change.doc.id.clone();
            match change.kind {
                ChangeKind::Removed => match index.get(&id) {
                    Some(local) if local.stamp().is_synced => removed.push(id),
                    Some(_) => {
                        debug!(kind = %R::KIND, %id, "removed remotely, keeping unsynced local copy")
                    }
                    None => {}
                },
                ChangeKind::Added | ChangeKind::Modified => {
                    let Some(remote) = decode_logged::<R::Meta>(&change.doc) else {
                        continue;
                    };
                    if resolve(index.get(&id), &remote) == Resolution::InsertRemote {
                        staged.push(change.doc);
                    }
                }
            }
        }

        let applied = self.apply_staged(collection, staged)? + collection.hard_delete_many(&removed)?;
        if applied > 0 {
            self.emit(SyncEvent::RemoteApplied {
                kind: R::KIND,
                count: applied,
            });
        }
        Ok(applied)
    }

    // ==================== On-demand bodies ====================

    /// Full entry, downloading its body if only metadata is cached
    ///
    /// Returns `Ok(None)` for unknown or deleted ids and
    /// [`SyncError::Offline`] when the body was never downloaded and the
    /// engine is offline.
    pub async fn fetch_entry(&self, id: &str) -> SyncResult<Option<Entry>> {
        self.fetch(&self.entries, id).await
    }

    async fn fetch<R: Record>(&self, collection: &Collection<R>, id: &str) -> SyncResult<Option<R>> {
        let meta = match collection.lookup(id) {
            Availability::Cached(record) => return Ok(Some(record)),
            Availability::Missing => return Ok(None),
            Availability::MetadataOnly(meta) => meta,
        };
        if !self.is_online() {
            return Err(SyncError::Offline);
        }

        let Some(doc) = self.remote.get(R::KIND.body_collection(), id).await? else {
            warn!(kind = %R::KIND, id, "body missing from remote store");
            return Ok(None);
        };
        let record: R = doc.decode()?;
        if record.stamp().updated_at < meta.stamp().updated_at {
            debug!(kind = %R::KIND, id, "remote body older than index entry");
        }
        collection.put_synced(record.clone())?;
        Ok(Some(record))
    }

    // ==================== Reporting ====================

    pub(super) fn emit(&self, event: SyncEvent) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }

    fn set_phase(&self, phase: SyncPhase, progress: Option<u8>) {
        self.status.send_modify(|s| {
            s.phase = phase;
            s.progress = progress;
        });
    }

    fn publish_progress(&self, progress: &Progress) {
        let percent = if progress.total == 0 {
            100
        } else {
            (progress.scanned.min(progress.total) * 100 / progress.total) as u8
        };
        self.status.send_modify(|s| s.progress = Some(percent));
    }

    fn finish_run(&self) {
        let phase = if self.is_online() {
            SyncPhase::Steady
        } else {
            SyncPhase::Offline
        };
        self.set_phase(phase, None);
    }
}

fn decode_logged<T: serde::de::DeserializeOwned>(doc: &RemoteDoc) -> Option<T> {
    match doc.decode() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(id = %doc.id, error = %e, "ignoring malformed remote document");
            None
        }
    }
}
