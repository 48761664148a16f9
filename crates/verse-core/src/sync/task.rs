//! Background sync task
//!
//! Runs a [`SyncEngine`] on its own tokio task. The embedding application
//! drives it with [`SyncCommand`]s and observes it through the status watch
//! channel and the event receiver on the returned [`SyncHandle`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::engine::{LiveFeed, SyncEngine, SyncEvents};
use super::status::{SyncEvent, SyncOutcome, SyncStatus};
use crate::models::RecordKind;
use crate::remote::{ChangeBatch, RemoteResult};

/// Commands sent to the sync task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// Connectivity changed
    SetOnline(bool),
    /// Run a sync now instead of waiting for the next tick
    SyncNow { full: bool },
    /// Stop the task
    Shutdown,
}

/// Handle to control the sync task
pub struct SyncHandle {
    /// Send commands to the sync task
    pub command_tx: mpsc::Sender<SyncCommand>,
    /// Receive events from the sync engine
    pub event_rx: SyncEvents,
    /// Watch phase and progress
    pub status_rx: watch::Receiver<SyncStatus>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Ask the task to stop and wait for it
    pub async fn shutdown(self) {
        let _ = self.command_tx.send(SyncCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "sync task ended abnormally");
        }
    }
}

/// Spawn the sync task
///
/// The engine starts offline; send `SetOnline(true)` once connectivity is
/// known. While online the engine uploads every `interval` and applies live
/// remote changes as they arrive.
pub fn spawn_sync_task(engine: Arc<SyncEngine>, events: SyncEvents, interval: Duration) -> SyncHandle {
    let (command_tx, command_rx) = mpsc::channel(16);
    let status_rx = engine.status();

    let task = tokio::spawn(sync_task_loop(engine, command_rx, interval));

    SyncHandle {
        command_tx,
        event_rx: events,
        status_rx,
        task,
    }
}

async fn sync_task_loop(
    engine: Arc<SyncEngine>,
    mut command_rx: mpsc::Receiver<SyncCommand>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick fires immediately
    ticker.tick().await;

    let mut feed: Option<LiveFeed> = None;

    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(SyncCommand::SetOnline(true)) => {
                        log_outcome(engine.handle_online().await);
                        feed = open_feed(&engine).await;
                    }
                    Some(SyncCommand::SetOnline(false)) => {
                        engine.handle_offline();
                        feed = None;
                    }
                    Some(SyncCommand::SyncNow { full }) => {
                        let outcome = if full {
                            engine.full_sync().await
                        } else {
                            engine.incremental_sync().await
                        };
                        log_outcome(outcome);
                    }
                    Some(SyncCommand::Shutdown) | None => break,
                }
            }
            _ = ticker.tick() => {
                log_outcome(engine.tick().await);
                if feed.is_none() && engine.is_online() {
                    feed = open_feed(&engine).await;
                }
            }
            change = next_change(&mut feed) => {
                match change {
                    Some((kind, Ok(batch))) => apply(&engine, kind, batch),
                    Some((kind, Err(e))) => {
                        warn!(%kind, error = %e, "live feed failed, resubscribing on next tick");
                        feed = None;
                    }
                    None => {
                        debug!("live feed ended");
                        feed = None;
                    }
                }
            }
        }
    }

    engine.handle_offline();
    info!("sync task stopped");
}

/// Next live change, or never when there is no feed
async fn next_change(
    feed: &mut Option<LiveFeed>,
) -> Option<(RecordKind, RemoteResult<ChangeBatch>)> {
    match feed {
        Some(feed) => feed.next().await,
        None => std::future::pending().await,
    }
}

async fn open_feed(engine: &SyncEngine) -> Option<LiveFeed> {
    if !engine.is_online() {
        return None;
    }
    match engine.subscribe().await {
        Ok(feed) => Some(feed),
        Err(e) => {
            warn!(error = %e, "failed to subscribe to remote changes");
            None
        }
    }
}

fn apply(engine: &SyncEngine, kind: RecordKind, batch: ChangeBatch) {
    if batch.is_empty() {
        return;
    }
    if let Err(e) = engine.apply_live(kind, batch) {
        warn!(%kind, error = %e, "failed to apply live changes");
        engine.emit(SyncEvent::Error(e.to_string()));
    }
}

fn log_outcome(outcome: SyncOutcome) {
    match outcome {
        SyncOutcome::Completed(report) => debug!(?report, "sync finished"),
        SyncOutcome::Busy => debug!("sync skipped, already running"),
        SyncOutcome::Offline => debug!("sync skipped, offline"),
        // already logged and reported by the engine
        SyncOutcome::Failed(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::Journal;
    use crate::models::{Entry, EntryType, Record};
    use crate::remote::{MemoryRemote, RemoteDoc, RemoteStore};
    use crate::sync::{SyncPhase, SyncSettings};

    async fn wait_for<F: Fn(&SyncStatus) -> bool>(rx: &mut watch::Receiver<SyncStatus>, f: F) {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| f(s)))
            .await
            .expect("status timed out")
            .expect("status channel closed");
    }

    #[tokio::test]
    async fn test_task_syncs_when_online_and_stops() {
        let journal = Journal::open_in_memory().unwrap();
        let mut entry = journal.create_entry(EntryType::Poem);
        entry.title = "from the task".to_string();
        journal.save(&mut entry).unwrap();

        let remote = Arc::new(MemoryRemote::new());
        let (engine, events) = SyncEngine::new(&journal, remote.clone(), SyncSettings::default());
        let mut handle = spawn_sync_task(Arc::new(engine), events, Duration::from_secs(3600));

        handle.command_tx.send(SyncCommand::SetOnline(true)).await.unwrap();
        wait_for(&mut handle.status_rx, |s| s.phase == SyncPhase::Steady).await;

        assert_eq!(remote.documents("records").len(), 1);
        assert!(journal.entries().unsynced().is_empty());
        assert_eq!(
            handle.event_rx.recv().await.unwrap(),
            SyncEvent::Uploaded {
                kind: RecordKind::Entry,
                id: entry.id.clone()
            }
        );

        handle.command_tx.send(SyncCommand::SetOnline(false)).await.unwrap();
        wait_for(&mut handle.status_rx, |s| !s.online).await;

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_task_applies_live_changes() {
        let journal = Journal::open_in_memory().unwrap();
        let remote = Arc::new(MemoryRemote::new());
        let (engine, events) = SyncEngine::new(&journal, remote.clone(), SyncSettings::default());
        let mut handle = spawn_sync_task(Arc::new(engine), events, Duration::from_secs(3600));

        handle.command_tx.send(SyncCommand::SetOnline(true)).await.unwrap();
        wait_for(&mut handle.status_rx, |s| s.phase == SyncPhase::Steady).await;

        // commands run in order, so the feed is open once this sync is done
        let first_sync = handle.status_rx.borrow().last_sync;
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle
            .command_tx
            .send(SyncCommand::SyncNow { full: true })
            .await
            .unwrap();
        wait_for(&mut handle.status_rx, |s| {
            s.phase == SyncPhase::Steady && s.last_sync != first_sync
        })
        .await;

        let mut incoming = Entry::new(EntryType::Note);
        incoming.title = "written elsewhere".to_string();
        let meta = RemoteDoc::from_record(incoming.id(), &incoming.to_meta()).unwrap();
        remote.set("records_meta", &meta).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), handle.event_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            SyncEvent::RemoteApplied {
                kind: RecordKind::Entry,
                count: 1
            }
        );
        assert!(journal.entries().get_meta(&incoming.id).is_some());

        handle.shutdown().await;
    }
}
