//! Destination-tab selection and eviction.
//!
//! The destination is resolved once per process: an empty primary tab is
//! used directly, while a primary tab that already holds history is left
//! untouched and a new timestamp-suffixed tab is branched off it, carrying
//! the header row over verbatim.

use chrono::{DateTime, Local, NaiveDateTime};
use tracing::info;

use super::client::{SheetStore, TabInfo};
use crate::config::{MAX_TAB_COUNT, TAB_SUFFIX_FORMAT};
use crate::error::SheetError;

/// Destination tab chosen for this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Empty primary tab; the reconciled header still has to be written.
    Fresh { title: String },
    /// Tab that already carries a header row.
    Continuing { title: String },
}

impl Destination {
    pub fn title(&self) -> &str {
        match self {
            Destination::Fresh { title } | Destination::Continuing { title } => title,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Destination::Fresh { .. })
    }
}

/// Timestamp embedded in a generated tab title, if the title follows the
/// `{base}-YYYYMMDD-HHMMSS` convention.
pub fn embedded_timestamp(base: &str, title: &str) -> Option<NaiveDateTime> {
    let suffix = title.strip_prefix(base)?.strip_prefix('-')?;
    NaiveDateTime::parse_from_str(suffix, TAB_SUFFIX_FORMAT).ok()
}

/// Eviction ordering key: generated tabs compare by their embedded
/// timestamp, all others lexicographically by title.
fn eviction_key(base: &str, tab: &TabInfo) -> String {
    match embedded_timestamp(base, &tab.title) {
        Some(ts) => ts.format(TAB_SUFFIX_FORMAT).to_string(),
        None => tab.title.clone(),
    }
}

/// Choose the tab this process appends to.
pub async fn select_destination(
    store: &dyn SheetStore,
    base: &str,
    now: DateTime<Local>,
) -> Result<Destination, SheetError> {
    let tabs = store.list_tabs().await?;

    let primary = tabs
        .iter()
        .min_by_key(|t| t.index)
        .ok_or_else(|| SheetError::Malformed("spreadsheet has no tabs".to_string()))?;

    let rows = store.read_rows(&primary.title).await?;
    if rows.is_empty() {
        info!(tab = %primary.title, "using empty primary tab");
        return Ok(Destination::Fresh {
            title: primary.title.clone(),
        });
    }

    // The primary tab holds history; branch a new tab and carry its header
    // row over verbatim.
    let header = rows[0].clone();
    evict_if_full(store, base, &tabs, primary.tab_id).await?;

    let title = format!("{base}-{}", now.format(TAB_SUFFIX_FORMAT));
    let tab = store.add_tab(&title).await?;
    store.write_header(&tab.title, &header).await?;

    info!(tab = %tab.title, "created destination tab");
    Ok(Destination::Continuing { title: tab.title })
}

/// Delete the oldest tab when the spreadsheet is at the service's tab
/// ceiling. The primary tab is never evicted.
async fn evict_if_full(
    store: &dyn SheetStore,
    base: &str,
    tabs: &[TabInfo],
    primary_id: i64,
) -> Result<(), SheetError> {
    if tabs.len() < MAX_TAB_COUNT {
        return Ok(());
    }

    let oldest = tabs
        .iter()
        .filter(|t| t.tab_id != primary_id)
        .min_by_key(|t| eviction_key(base, t));

    if let Some(tab) = oldest {
        info!(tab = %tab.title, "tab ceiling reached, deleting oldest tab");
        store.delete_tab(tab.tab_id).await?;
    }
    Ok(())
}
