//! High-level runner API for the sync job.
//!
//! This module provides a simplified public interface that encapsulates all
//! the internal complexity of loading configuration, constructing the two
//! service clients and wiring up the syncer.
//!
//! This is the primary API for external users and for the CLI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::schedule;
use crate::sheets::auth::ServiceAccountKey;
use crate::sheets::client::HttpSheetStore;
use crate::sync::{SyncMode, SyncOptionsBuilder, Syncer};
use crate::tracking::client::HttpTrackingClient;

/// Arguments for running the sync job
#[derive(Debug, Clone)]
pub struct SyncArgs {
    /// Path to the JSON configuration file
    pub config_path: PathBuf,

    /// Spreadsheet name; falls back to SPREADSHEET_NAME from the config
    pub spreadsheet: Option<String>,

    /// Base name for generated destination tabs
    pub tab_base: String,

    /// Only sync runs owned by this user
    pub user: Option<String>,

    /// Runs extracted per batch
    pub batch_size: usize,

    /// Time between scheduled sync ticks
    pub interval: Duration,

    /// Clear the tab and rewrite the merged history instead of appending
    pub rewrite: bool,

    /// Run a single sync and exit instead of scheduling
    pub once: bool,

    /// Run the first scheduled sync immediately
    pub immediate: bool,

    /// Quiet mode - minimal output, no progress bars
    pub quiet: bool,
}

/// Run the sync job with the specified arguments
///
/// With `once` set this performs a single sync tick and returns its result;
/// otherwise it keeps syncing at the configured interval until interrupted.
///
/// # Example
///
/// ```no_run
/// use std::path::PathBuf;
/// use std::time::Duration;
/// use runsheet_sync::runner::{SyncArgs, run};
///
/// # async fn example() -> anyhow::Result<()> {
/// let args = SyncArgs {
///     config_path: PathBuf::from("config.json"),
///     spreadsheet: Some("experiments".to_string()),
///     tab_base: "sync".to_string(),
///     user: Some("alice-ml".to_string()),
///     batch_size: 100,
///     interval: Duration::from_secs(30 * 60),
///     rewrite: false,
///     once: true,
///     immediate: false,
///     quiet: true,
/// };
///
/// run(args).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run(args: SyncArgs) -> Result<()> {
    if !args.once && args.interval.is_zero() {
        return Err(SyncError::Config("interval must be at least one minute".to_string()).into());
    }

    let syncer = build_syncer(&args)?;

    if args.once {
        let outcome = syncer.run_once().await?;
        info!(
            tab = %outcome.tab,
            rows = outcome.stats.rows_appended,
            "sync complete"
        );
        return Ok(());
    }

    schedule::run_scheduled(&syncer, args.interval, args.immediate).await
}

/// Load configuration and wire up the syncer. Fails before any network call
/// on configuration problems.
fn build_syncer(args: &SyncArgs) -> Result<Syncer> {
    let config = SyncConfig::load(&args.config_path)?;

    let spreadsheet = args
        .spreadsheet
        .clone()
        .or_else(|| config.spreadsheet_name.clone())
        .ok_or_else(|| {
            SyncError::Config(
                "no spreadsheet name: pass --spreadsheet or set SPREADSHEET_NAME".to_string(),
            )
        })?;

    let tracking = HttpTrackingClient::new(config.api_key.clone()).map_err(SyncError::Tracking)?;
    let key = ServiceAccountKey::load(&config.gcp_json).map_err(SyncError::Sheet)?;
    let sheets = HttpSheetStore::new(key, &spreadsheet).map_err(SyncError::Sheet)?;

    let mut options = SyncOptionsBuilder::default();
    options
        .tab_base(args.tab_base.clone())
        .batch_size(args.batch_size)
        .mode(if args.rewrite {
            SyncMode::Rewrite
        } else {
            SyncMode::Append
        })
        .quiet(args.quiet);
    if let Some(user) = &args.user {
        options.user(user.clone());
    }
    let options = options
        .build()
        .map_err(|e| SyncError::Config(e.to_string()))?;

    Ok(Syncer::new(
        Arc::new(tracking),
        Arc::new(sheets),
        config,
        options,
    ))
}
