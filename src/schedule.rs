//! The cooperative scheduling loop.
//!
//! One logical task runs synchronously per tick; the only suspension points
//! are the scheduler sleep and the append pauses inside a tick. An
//! interrupt stops the loop cleanly.

use std::time::Duration;

use tokio::signal;
use tracing::{error, info, warn};

use crate::config::TICK_FAILURE_BACKOFF;
use crate::error::SyncError;
use crate::sync::Syncer;

/// Run sync ticks forever at a fixed interval.
///
/// A tick failure is logged and never terminates the loop; unexpected
/// failures additionally back off before polling resumes.
pub async fn run_scheduled(
    syncer: &Syncer,
    interval: Duration,
    immediate: bool,
) -> anyhow::Result<()> {
    let start = if immediate {
        tokio::time::Instant::now()
    } else {
        tokio::time::Instant::now() + interval
    };
    let mut ticker = tokio::time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        interval_secs = interval.as_secs(),
        immediate, "scheduler started"
    );

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("interrupt received, stopping");
                return Ok(());
            }
            _ = ticker.tick() => {
                if let Some(backoff) = run_tick(syncer).await {
                    tokio::select! {
                        _ = signal::ctrl_c() => {
                            info!("interrupt received, stopping");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }
}

/// Execute one tick. Returns the extra backoff to apply before polling
/// resumes, if any.
async fn run_tick(syncer: &Syncer) -> Option<Duration> {
    match syncer.run_once().await {
        Ok(outcome) => {
            info!(
                job_id = %outcome.job_id,
                team = %outcome.team,
                project = %outcome.project,
                tab = %outcome.tab,
                rows = outcome.stats.rows_appended,
                "sync succeeded"
            );
            None
        }
        Err(err) => {
            let backoff = backoff_for(&err);
            match backoff {
                Some(delay) => error!(
                    delay_secs = delay.as_secs(),
                    "unexpected sync failure, backing off: {err:#}"
                ),
                None => warn!("sync failed, will retry at next interval: {err:#}"),
            }
            backoff
        }
    }
}

/// Known failure classes wait for the next interval; anything unexpected
/// gets the extended backoff.
fn backoff_for(err: &SyncError) -> Option<Duration> {
    match err {
        SyncError::Config(_) | SyncError::Sheet(_) | SyncError::Tracking(_) => None,
        SyncError::Other(_) => Some(TICK_FAILURE_BACKOFF),
    }
}
