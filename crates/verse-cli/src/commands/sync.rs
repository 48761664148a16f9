//! Sync command handlers

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use verse_core::sync::{
    collect_tombstones, spawn_sync_task, SyncCommand, SyncEngine, SyncEvents, SyncOutcome,
    SyncPhase, SyncSettings, SyncStatus,
};
use verse_core::{Config, FirestoreRemote, Journal};

use crate::output::Output;

/// Whether sync can run with this configuration
pub fn is_configured(config: &Config) -> bool {
    config.sync_enabled && config.remote.is_configured()
}

/// Build a sync engine for the configured remote store
pub fn connect(journal: &Journal) -> Result<(SyncEngine, SyncEvents)> {
    let config = journal.config();

    if !config.sync_enabled {
        bail!(
            "Sync is not enabled. Enable it with:\n  \
             verse config set sync_enabled true\n  \
             verse config set project_id your-firebase-project"
        );
    }
    if !config.remote.is_configured() {
        bail!(
            "Remote store not configured. Set it with:\n  \
             verse config set project_id your-firebase-project"
        );
    }

    let remote =
        FirestoreRemote::from_config(&config.remote).context("Failed to set up remote store")?;
    Ok(SyncEngine::new(
        journal,
        Arc::new(remote),
        SyncSettings::from_config(config),
    ))
}

/// Run one sync pass
pub async fn sync(journal: &Journal, full: bool, output: &Output) -> Result<()> {
    let (engine, mut events) = connect(journal)?;

    output.message(if full {
        "Running full sync..."
    } else {
        "Syncing..."
    });

    engine.set_online(true);
    let outcome = if full {
        engine.full_sync().await
    } else {
        engine.incremental_sync().await
    };

    while let Ok(event) = events.try_recv() {
        output.print_event(&event);
    }

    match outcome {
        SyncOutcome::Completed(report) => {
            if output.is_json() {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "success",
                        "mode": format!("{:?}", report.mode),
                        "uploaded": report.uploaded,
                        "upload_failures": report.upload_failures,
                        "scanned": report.scanned,
                        "applied": report.applied,
                        "kept_local": report.kept_local,
                        "collected": report.collected
                    })
                );
            } else {
                output.success(&format!(
                    "Sync complete - {} uploaded, {} downloaded",
                    report.uploaded, report.applied
                ));
                if report.kept_local > 0 {
                    output.message(&format!(
                        "  {} local edit(s) kept over remote versions",
                        report.kept_local
                    ));
                }
                if report.upload_failures > 0 {
                    output.message(&format!(
                        "  {} record(s) failed to upload and stay pending",
                        report.upload_failures
                    ));
                }
            }
            Ok(())
        }
        SyncOutcome::Failed(e) => Err(e).context("Sync failed"),
        SyncOutcome::Busy => bail!("Another sync is already running"),
        SyncOutcome::Offline => bail!("Sync engine is offline"),
    }
}

/// Sync quietly (for auto-sync) - no output on success
pub async fn sync_quiet(journal: &Journal) -> Result<()> {
    if !is_configured(journal.config()) {
        return Ok(());
    }

    let (engine, _events) = connect(journal)?;
    engine.set_online(true);
    match engine.incremental_sync().await {
        SyncOutcome::Failed(e) => Err(e.into()),
        _ => Ok(()),
    }
}

/// Purge synced tombstones past the retention window
pub fn gc(journal: &Journal, output: &Output) -> Result<()> {
    let config = journal.config();
    let now = verse_core::timestamp::now();

    let entries = collect_tombstones(journal.entries(), config.tombstone_retention(), now)
        .context("Failed to purge deleted entries")?;
    let books = collect_tombstones(journal.books(), config.tombstone_retention(), now)
        .context("Failed to purge deleted books")?;

    if output.is_json() {
        println!(
            "{}",
            serde_json::json!({ "entries": entries, "books": books })
        );
    } else {
        output.success(&format!(
            "Purged {} entr{} and {} book(s)",
            entries.len(),
            if entries.len() == 1 { "y" } else { "ies" },
            books.len()
        ));
    }
    Ok(())
}

/// Keep syncing in the foreground until interrupted
pub async fn watch(journal: &Journal, output: &Output) -> Result<()> {
    let (engine, events) = connect(journal)?;
    let interval = journal.config().sync_interval();
    let mut handle = spawn_sync_task(Arc::new(engine), events, interval);

    handle
        .command_tx
        .send(SyncCommand::SetOnline(true))
        .await
        .context("Sync task stopped unexpectedly")?;
    output.message("Watching for changes (Ctrl-C to stop)...");

    let mut shown = {
        let status = handle.status_rx.borrow();
        (status.phase, status.progress)
    };
    loop {
        tokio::select! {
            event = handle.event_rx.recv() => {
                match event {
                    Some(event) => output.print_event(&event),
                    None => break,
                }
            }
            changed = handle.status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = handle.status_rx.borrow_and_update().clone();
                if let Some(line) = status_update(&mut shown, &status) {
                    output.message(&line);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await;
    output.message("Stopped.");
    Ok(())
}

/// Status line for `watch`, when the phase or the progress has moved
fn status_update(shown: &mut (SyncPhase, Option<u8>), status: &SyncStatus) -> Option<String> {
    let current = (status.phase, status.progress);
    if *shown == current {
        return None;
    }
    *shown = current;
    Some(match status.progress {
        Some(percent) => format!("[{}] {}%", status.phase, percent),
        None => format!("[{}]", status.phase),
    })
}
