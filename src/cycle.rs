//! Cycle loop — one acquisition + dispatch pass at a fixed interval.
//!
//! A new cycle is armed only after the previous one completes, so cycles
//! never overlap and no lock discipline is needed anywhere else. Within a
//! cycle, bulletins are processed strictly sequentially and each bulletin's
//! terminal state is persisted before the next one starts: a crash leaves at
//! most the in-flight bulletin unresolved, and it is simply reprocessed next
//! cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatch::{DispatchEngine, ExecutorAssigner};
use crate::error::{DatabaseError, Error};
use crate::feed::RegistryFeed;
use crate::feed::acquire::acquire_once;
use crate::parser::parse_bulletin;
use crate::resolver::SubjectResolver;
use crate::settings::SettingsCatalog;
use crate::store::Database;

/// Per-cycle dispatch counters, for the completion log line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub closed: usize,
    pub failed: usize,
    pub deleted: usize,
    pub skipped: usize,
}

/// Dispatch every open bulletin and persist its terminal state.
///
/// Store errors on an individual bulletin are logged and leave that bulletin
/// open for the next cycle; they never abort the pass.
pub async fn dispatch_pending(
    db: &dyn Database,
    assigner: &ExecutorAssigner,
) -> Result<DispatchStats, Error> {
    let catalog = SettingsCatalog::load(db).await?;
    let tracking_disabled = db.tracking_disabled_cases().await?;
    let bulletins = db.open_bulletins().await?;
    let today = Utc::now().date_naive();

    let resolver = SubjectResolver::new(db);
    let engine = DispatchEngine::new(db, assigner);

    let mut stats = DispatchStats::default();
    for bulletin in bulletins {
        let Some(content) = bulletin.content.as_deref() else {
            continue; // open_bulletins filters these out already
        };

        let parsed = match parse_bulletin(content) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                // No payload: not terminal, revisited next cycle.
                debug!(external_id = %bulletin.external_id, "Bulletin has no payload yet");
                stats.skipped += 1;
                continue;
            }
            Err(e) => {
                warn!(external_id = %bulletin.external_id, error = %e, "Unparseable bulletin");
                persist_or_log(db.mark_bulletin_failed(&bulletin.id, &e.0).await, &bulletin.id);
                stats.failed += 1;
                continue;
            }
        };

        let parties = match resolver.resolve(&parsed.subject).await {
            Ok(parties) => parties,
            Err(e) => {
                error!(external_id = %bulletin.external_id, error = %e, "Resolution failed, will retry");
                stats.skipped += 1;
                continue;
            }
        };

        if parties.is_empty() {
            // Explicit data-discarding policy: unmatched bulletins are
            // removed from the inbox and never retried.
            warn!(external_id = %bulletin.external_id, "No matching party, discarding bulletin");
            persist_or_log(db.delete_bulletin(&bulletin.id).await, &bulletin.id);
            stats.deleted += 1;
            continue;
        }

        let outcome = match engine
            .dispatch(&parsed, &parties, &catalog, &tracking_disabled, today)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(external_id = %bulletin.external_id, error = %e, "Dispatch failed, will retry");
                stats.skipped += 1;
                continue;
            }
        };

        if outcome.succeeded() {
            persist_or_log(db.mark_bulletin_closed(&bulletin.id).await, &bulletin.id);
            stats.closed += 1;
        } else {
            let errors = outcome.joined_errors();
            warn!(external_id = %bulletin.external_id, errors = %errors, "Bulletin dispatch failed");
            persist_or_log(db.mark_bulletin_failed(&bulletin.id, &errors).await, &bulletin.id);
            persist_or_log(db.insert_broken_bulletin(&bulletin.id, &errors).await, &bulletin.id);
            stats.failed += 1;
        }
    }

    Ok(stats)
}

fn persist_or_log(result: Result<(), DatabaseError>, bulletin_id: &str) {
    if let Err(e) = result {
        error!(bulletin_id, error = %e, "Failed to persist bulletin state");
    }
}

/// Run one full cycle: acquisition (when a feed is configured) then dispatch.
pub async fn run_cycle(
    db: &dyn Database,
    feed: Option<&dyn RegistryFeed>,
    assigner: &ExecutorAssigner,
    initial_lookback: Duration,
) {
    if let Some(feed) = feed {
        // Acquisition failures abort only the acquisition step; dispatch
        // still runs over whatever is already pending.
        if let Err(e) = acquire_once(feed, db, initial_lookback).await {
            error!(error = %e, "Acquisition aborted for this cycle");
        }
    }

    match dispatch_pending(db, assigner).await {
        Ok(stats) => info!(
            closed = stats.closed,
            failed = stats.failed,
            deleted = stats.deleted,
            skipped = stats.skipped,
            "Cycle complete"
        ),
        Err(e) => error!(error = %e, "Dispatch pass aborted"),
    }
}

/// Spawn the cycle loop.
///
/// Returns the join handle and a shutdown signal. The signal is honored
/// between cycles only — an in-flight cycle always runs to completion.
pub fn spawn_cycle_loop(
    db: Arc<dyn Database>,
    feed: Option<Arc<dyn RegistryFeed>>,
    assigner: ExecutorAssigner,
    cycle_interval: Duration,
    initial_lookback: Duration,
) -> (JoinHandle<()>, Arc<Notify>) {
    let shutdown = Arc::new(Notify::new());
    let shutdown_signal = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            interval_secs = cycle_interval.as_secs(),
            "Cycle loop started"
        );

        loop {
            run_cycle(
                db.as_ref(),
                feed.as_deref(),
                &assigner,
                initial_lookback,
            )
            .await;

            // Rearm only after completion; wake early on shutdown.
            tokio::select! {
                _ = tokio::time::sleep(cycle_interval) => {}
                _ = shutdown.notified() => {
                    info!("Cycle loop shutting down");
                    return;
                }
            }
        }
    });

    (handle, shutdown_signal)
}
