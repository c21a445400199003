//! Selecting the runs that need syncing.

use std::collections::HashSet;

use tracing::debug;

use crate::tracking::run::Run;

/// Criteria a run must meet to be synced this tick.
#[derive(Debug)]
pub struct RunFilter<'a> {
    existing_ids: &'a HashSet<String>,
    user: Option<&'a str>,
}

impl<'a> RunFilter<'a> {
    pub fn new(existing_ids: &'a HashSet<String>, user: Option<&'a str>) -> Self {
        Self { existing_ids, user }
    }

    /// A run qualifies iff it is finished, not yet present in the sheet,
    /// and owned by the requested user when a filter is set.
    pub fn qualifies(&self, run: &Run) -> bool {
        if !run.state.is_finished() {
            return false;
        }
        if self.existing_ids.contains(&run.id) {
            return false;
        }
        if let Some(user) = self.user {
            if run.user != user {
                return false;
            }
        }
        true
    }

    /// Filter the listing. Non-qualifying runs are skipped, not errors.
    pub fn select<'r>(&self, runs: &'r [Run]) -> Vec<&'r Run> {
        let selected: Vec<&Run> = runs.iter().filter(|r| self.qualifies(r)).collect();
        debug!(total = runs.len(), selected = selected.len(), "filtered runs");
        selected
    }
}
