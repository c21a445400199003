//! In-memory fakes for the two external services, used by tests.

use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::{SheetError, TrackingError};
use crate::sheets::client::{SheetStore, TabInfo};
use crate::sync::rows::SheetRow;
use crate::tracking::client::{SessionInfo, TrackingClient};
use crate::tracking::run::Run;

/// Tracking client returning a canned session and run listing.
pub struct FakeTrackingClient {
    pub entity: String,
    pub runs: Mutex<Vec<Run>>,
}

impl FakeTrackingClient {
    pub fn new(entity: &str, runs: Vec<Run>) -> Self {
        Self {
            entity: entity.to_string(),
            runs: Mutex::new(runs),
        }
    }

    /// Replace the canned listing, as if new runs finished remotely.
    pub fn set_runs(&self, runs: Vec<Run>) {
        *self.runs.lock().unwrap() = runs;
    }
}

#[async_trait]
impl TrackingClient for FakeTrackingClient {
    async fn active_session(&self) -> Result<SessionInfo, TrackingError> {
        Ok(SessionInfo {
            entity: self.entity.clone(),
            username: self.entity.clone(),
        })
    }

    async fn list_runs(&self, _team: &str, _project: &str) -> Result<Vec<Run>, TrackingError> {
        Ok(self.runs.lock().unwrap().clone())
    }
}

/// In-memory spreadsheet honoring the same append-only contract as the live
/// store.
pub struct InMemorySheetStore {
    inner: Mutex<SheetState>,
}

#[derive(Default)]
struct SheetState {
    tabs: Vec<FakeTab>,
    next_id: i64,
    append_sizes: Vec<usize>,
    fail_appends_after: Option<usize>,
}

struct FakeTab {
    id: i64,
    title: String,
    rows: Vec<Vec<String>>,
}

impl InMemorySheetStore {
    /// Store with one empty primary tab, like a brand-new spreadsheet.
    pub fn new() -> Self {
        let state = SheetState {
            tabs: vec![FakeTab {
                id: 0,
                title: "Sheet1".to_string(),
                rows: Vec::new(),
            }],
            next_id: 1,
            ..Default::default()
        };
        Self {
            inner: Mutex::new(state),
        }
    }

    /// Add or replace a tab with canned rows.
    pub fn seed_tab(&self, title: &str, rows: Vec<Vec<String>>) {
        let mut state = self.inner.lock().unwrap();
        if let Some(tab) = state.tabs.iter_mut().find(|t| t.title == title) {
            tab.rows = rows;
        } else {
            let id = state.next_id;
            state.next_id += 1;
            state.tabs.push(FakeTab {
                id,
                title: title.to_string(),
                rows,
            });
        }
    }

    pub fn rows(&self, title: &str) -> Vec<Vec<String>> {
        self.inner
            .lock()
            .unwrap()
            .tabs
            .iter()
            .find(|t| t.title == title)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn tab_titles(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .tabs
            .iter()
            .map(|t| t.title.clone())
            .collect()
    }

    /// Row counts passed to each successful append call, in order.
    pub fn append_sizes(&self) -> Vec<usize> {
        self.inner.lock().unwrap().append_sizes.clone()
    }

    /// Fail every append after the first `n` successful calls.
    pub fn fail_appends_after(&self, n: usize) {
        self.inner.lock().unwrap().fail_appends_after = Some(n);
    }
}

#[async_trait]
impl SheetStore for InMemorySheetStore {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, SheetError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tabs
            .iter()
            .enumerate()
            .map(|(index, t)| TabInfo {
                tab_id: t.id,
                title: t.title.clone(),
                index,
            })
            .collect())
    }

    async fn add_tab(&self, title: &str) -> Result<TabInfo, SheetError> {
        let mut state = self.inner.lock().unwrap();
        if state.tabs.iter().any(|t| t.title == title) {
            return Err(SheetError::Malformed(format!(
                "duplicate tab title: {title}"
            )));
        }
        let id = state.next_id;
        state.next_id += 1;
        let index = state.tabs.len();
        state.tabs.push(FakeTab {
            id,
            title: title.to_string(),
            rows: Vec::new(),
        });
        Ok(TabInfo {
            tab_id: id,
            title: title.to_string(),
            index,
        })
    }

    async fn delete_tab(&self, tab_id: i64) -> Result<(), SheetError> {
        let mut state = self.inner.lock().unwrap();
        let before = state.tabs.len();
        state.tabs.retain(|t| t.id != tab_id);
        if state.tabs.len() == before {
            return Err(SheetError::TabNotFound(format!("sheet id {tab_id}")));
        }
        Ok(())
    }

    async fn read_rows(&self, title: &str) -> Result<Vec<Vec<String>>, SheetError> {
        self.inner
            .lock()
            .unwrap()
            .tabs
            .iter()
            .find(|t| t.title == title)
            .map(|t| t.rows.clone())
            .ok_or_else(|| SheetError::TabNotFound(title.to_string()))
    }

    async fn write_header(&self, title: &str, header: &[String]) -> Result<(), SheetError> {
        let mut state = self.inner.lock().unwrap();
        let tab = state
            .tabs
            .iter_mut()
            .find(|t| t.title == title)
            .ok_or_else(|| SheetError::TabNotFound(title.to_string()))?;
        if tab.rows.is_empty() {
            tab.rows.push(header.to_vec());
        } else {
            tab.rows[0] = header.to_vec();
        }
        Ok(())
    }

    async fn append_rows(&self, title: &str, rows: &[SheetRow]) -> Result<(), SheetError> {
        let mut state = self.inner.lock().unwrap();
        let tab_idx = state
            .tabs
            .iter()
            .position(|t| t.title == title)
            .ok_or_else(|| SheetError::TabNotFound(title.to_string()))?;

        if let Some(limit) = state.fail_appends_after {
            if state.append_sizes.len() >= limit {
                return Err(SheetError::Status {
                    status: StatusCode::TOO_MANY_REQUESTS,
                    body: "rate limited".to_string(),
                });
            }
        }

        state.append_sizes.push(rows.len());
        state.tabs[tab_idx]
            .rows
            .extend(rows.iter().map(|r| r.cells.clone()));
        Ok(())
    }

    async fn clear_tab(&self, title: &str) -> Result<(), SheetError> {
        let mut state = self.inner.lock().unwrap();
        let tab = state
            .tabs
            .iter_mut()
            .find(|t| t.title == title)
            .ok_or_else(|| SheetError::TabNotFound(title.to_string()))?;
        tab.rows.clear();
        Ok(())
    }
}
