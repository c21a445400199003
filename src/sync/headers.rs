//! Header reconciliation.

use crate::tracking::run::Run;

/// Final header row: the configured fixed headers followed by keys
/// discovered from the sampled runs' config and summary payloads, in
/// first-seen order, without duplicates.
pub fn reconcile(fixed: &[String], sample: &[&Run]) -> Vec<String> {
    let mut headers: Vec<String> = fixed.to_vec();

    for run in sample {
        for key in run.config.keys().chain(run.summary.keys()) {
            if !headers.iter().any(|h| h == key) {
                headers.push(key.to_string());
            }
        }
    }

    headers
}
