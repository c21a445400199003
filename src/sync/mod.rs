//! The batch-sync pipeline.
//!
//! One [`Syncer`] owns the two service clients and runs the whole tick:
//! resolve the project, pick the destination tab, diff identifiers, extract
//! rows in batches, then append in rate-limited chunks.

pub mod append;
pub mod diff;
pub mod extract;
pub mod headers;
pub mod rows;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use derive_builder::Builder;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{DEFAULT_BATCH_SIZE, DYNAMIC_HEADER_SAMPLE, SyncConfig};
use crate::error::SyncError;
use crate::sheets::client::SheetStore;
use crate::sheets::tabs::{self, Destination};
use crate::telemetry::{SyncEvent, SyncStats};
use crate::tracking::client::TrackingClient;
use crate::tracking::run::Run;
use self::rows::SheetRow;

/// How extracted rows reach the destination tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Append only newly extracted rows, sorted newest first.
    #[default]
    Append,
    /// Clear the tab and rewrite the header plus the merged, re-sorted
    /// history.
    Rewrite,
}

/// Options controlling one syncer instance.
#[derive(Debug, Clone, Builder)]
pub struct SyncOptions {
    /// Base name for generated destination tabs
    #[builder(setter(into), default = "\"sync\".to_string()")]
    pub tab_base: String,

    /// Only sync runs owned by this user
    #[builder(setter(into, strip_option), default)]
    pub user: Option<String>,

    #[builder(default = "DEFAULT_BATCH_SIZE")]
    pub batch_size: usize,

    #[builder(default)]
    pub mode: SyncMode,

    /// Suppress the extraction progress bar
    #[builder(default = "true")]
    pub quiet: bool,
}

/// Result of one completed sync tick.
#[derive(Debug)]
pub struct SyncOutcome {
    pub job_id: String,
    pub team: String,
    pub project: String,
    pub tab: String,
    pub stats: SyncStats,
    pub duration: Duration,
}

/// Orchestrates one sync tick end to end.
pub struct Syncer {
    tracking: Arc<dyn TrackingClient>,
    sheets: Arc<dyn SheetStore>,
    config: SyncConfig,
    options: SyncOptions,
    /// Destination tab resolved once per process; later ticks keep
    /// appending to the same tab.
    destination: RwLock<Option<Destination>>,
}

impl Syncer {
    pub fn new(
        tracking: Arc<dyn TrackingClient>,
        sheets: Arc<dyn SheetStore>,
        config: SyncConfig,
        options: SyncOptions,
    ) -> Self {
        Self {
            tracking,
            sheets,
            config,
            options,
            destination: RwLock::new(None),
        }
    }

    /// Run one full sync tick.
    ///
    /// Each tick re-reads remote state (existing identifiers, runs) fresh;
    /// nothing but the destination tab and the configuration survives
    /// between ticks.
    pub async fn run_once(&self) -> Result<SyncOutcome, SyncError> {
        let start = Instant::now();
        let job_id = Uuid::new_v4().to_string();
        let mut stats = SyncStats::new();

        let (team, project) = self.resolve_project().await?;
        info!(job_id = %job_id, team = %team, project = %project, "starting sync");

        let destination = self.destination().await?;
        let tab = destination.title().to_string();

        let existing = self.sheets.read_rows(&tab).await?;
        let existing_ids: HashSet<String> = existing
            .iter()
            .skip(1)
            .filter_map(|row| row.first())
            .filter(|id| !id.is_empty())
            .cloned()
            .collect();

        let runs = self.tracking.list_runs(&team, &project).await?;

        // A fresh tab (or one whose header write was lost) gets the
        // reconciled header before any rows; an existing header is the
        // column contract and is used as-is.
        let header = match existing.first() {
            Some(first) if !destination.is_fresh() => first.clone(),
            _ => {
                let sample: Vec<&Run> = runs.iter().take(DYNAMIC_HEADER_SAMPLE).collect();
                let header = headers::reconcile(&self.config.fixed_headers, &sample);
                self.sheets.write_header(&tab, &header).await?;
                self.mark_continuing(&tab).await;
                header
            }
        };

        let filter = diff::RunFilter::new(&existing_ids, self.options.user.as_deref());
        let qualifying = filter.select(&runs);
        stats.update(&SyncEvent::RunsListed {
            total: runs.len(),
            qualifying: qualifying.len(),
        });

        if qualifying.is_empty() {
            info!(job_id = %job_id, "no new finished runs");
            return Ok(SyncOutcome {
                job_id,
                team,
                project,
                tab,
                stats,
                duration: start.elapsed(),
            });
        }

        let bar = self.extraction_bar(qualifying.len());
        let (mut new_rows, extract_stats) = extract::extract_batches(
            &qualifying,
            &header,
            &self.config.name_map,
            self.options.batch_size,
            |batch_rows, batch_errors| {
                stats.update(&SyncEvent::BatchExtracted {
                    rows: batch_rows,
                    field_errors: batch_errors,
                });
                if let Some(bar) = &bar {
                    bar.inc(batch_rows as u64);
                }
            },
        );
        if let Some(bar) = &bar {
            bar.finish_and_clear();
        }
        debug!(
            rows = extract_stats.rows,
            field_errors = extract_stats.field_errors,
            "extraction done"
        );

        match self.options.mode {
            SyncMode::Append => {
                rows::sort_rows_desc(&mut new_rows);
            }
            SyncMode::Rewrite => {
                let previous: Vec<SheetRow> = existing
                    .iter()
                    .skip(1)
                    .map(|cells| SheetRow::new(cells.clone()))
                    .collect();
                new_rows = rows::merge_rows(new_rows, previous);
                self.sheets.clear_tab(&tab).await?;
                self.sheets.write_header(&tab, &header).await?;
            }
        }

        let append_stats = append::append_chunked(
            self.sheets.as_ref(),
            &tab,
            &new_rows,
            |chunk_rows| stats.update(&SyncEvent::ChunkAppended { rows: chunk_rows }),
        )
        .await?;
        debug!(calls = append_stats.calls, rows = append_stats.rows, "append pass done");

        let duration = start.elapsed();
        info!(
            job_id = %job_id,
            listed = stats.runs_listed,
            qualifying = stats.runs_qualifying,
            extracted = stats.rows_extracted,
            rows = stats.rows_appended,
            calls = stats.append_calls,
            field_errors = stats.field_errors,
            duration_secs = duration.as_secs_f64(),
            "sync tick complete"
        );

        Ok(SyncOutcome {
            job_id,
            team,
            project,
            tab,
            stats,
            duration,
        })
    }

    /// Resolve team and project, preferring explicit configuration and
    /// falling back to the active tracking session for the team.
    async fn resolve_project(&self) -> Result<(String, String), SyncError> {
        let project = self.config.project_name.clone().ok_or_else(|| {
            SyncError::Config("no resolvable project: set PROJECT_NAME".to_string())
        })?;

        let team = match &self.config.team_name {
            Some(team) => team.clone(),
            None => {
                let session = self.tracking.active_session().await.map_err(|e| {
                    SyncError::Config(format!("no active tracking session: {e}"))
                })?;
                debug!(user = %session.username, entity = %session.entity, "resolved session");
                session.entity
            }
        };

        Ok((team, project))
    }

    /// Destination tab, resolved on first use and reused afterwards.
    async fn destination(&self) -> Result<Destination, SyncError> {
        if let Some(dest) = self.destination.read().await.as_ref() {
            return Ok(dest.clone());
        }

        let dest = tabs::select_destination(
            self.sheets.as_ref(),
            &self.options.tab_base,
            chrono::Local::now(),
        )
        .await?;
        *self.destination.write().await = Some(dest.clone());
        Ok(dest)
    }

    /// Once the header is written the tab is no longer fresh; later ticks
    /// must leave row 1 alone.
    async fn mark_continuing(&self, title: &str) {
        *self.destination.write().await = Some(Destination::Continuing {
            title: title.to_string(),
        });
    }

    fn extraction_bar(&self, total: usize) -> Option<ProgressBar> {
        if self.options.quiet {
            return None;
        }
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] Runs: [{bar:30.cyan/blue}] {pos}/{len} ({percent}%)")
                .unwrap()
                .progress_chars("=>-"),
        );
        Some(bar)
    }
}
