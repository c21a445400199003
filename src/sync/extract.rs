//! Field extraction: turning qualifying runs into sheet rows.

use std::collections::HashMap;

use chrono::{Local, TimeZone};
use tracing::{debug, warn};

use super::rows::SheetRow;
use crate::config::{FIXED_COLUMN_COUNT, TIMESTAMP_FIELD, TIMESTAMP_FORMAT};
use crate::error::FieldError;
use crate::tracking::run::{FieldValue, Run};

/// Replace path-separator characters so header names can be used as lookup
/// keys into run payloads.
pub fn normalize_header(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

/// Outcome of extracting one run.
#[derive(Debug)]
pub struct RowExtract {
    pub row: SheetRow,
    /// Per-field failures recovered as empty cells
    pub field_errors: Vec<FieldError>,
}

/// Build the row for one run.
///
/// Field lookups that fail are logged and leave an empty cell; extracting a
/// row never fails as a whole.
pub fn extract_row(run: &Run, headers: &[String], names: &HashMap<String, String>) -> RowExtract {
    let mut field_errors = Vec::new();
    let mut cells = Vec::with_capacity(headers.len());

    cells.push(run.id.clone());
    cells.push(completion_timestamp(run, &mut field_errors));
    cells.push(
        names
            .get(&run.user)
            .cloned()
            .unwrap_or_else(|| run.user.clone()),
    );

    for header in headers.iter().skip(FIXED_COLUMN_COUNT) {
        let key = normalize_header(header);
        cells.push(lookup_cell(run, &key, &mut field_errors));
    }

    for err in &field_errors {
        warn!(run_id = %run.id, error = %err, "field extraction failed, leaving cell empty");
    }

    RowExtract {
        row: SheetRow::new(cells),
        field_errors,
    }
}

/// Render the run's completion timestamp; empty when the summary has none.
fn completion_timestamp(run: &Run, errors: &mut Vec<FieldError>) -> String {
    let value = match run.summary.get(TIMESTAMP_FIELD) {
        Ok(value) => value,
        Err(err) => {
            errors.push(err);
            return String::new();
        }
    };

    match value {
        FieldValue::Absent => String::new(),
        FieldValue::Num(epoch) if epoch.is_finite() => format_epoch(epoch),
        _ => {
            errors.push(FieldError::BadTimestamp {
                key: TIMESTAMP_FIELD.to_string(),
            });
            String::new()
        }
    }
}

/// Render epoch seconds in the local timezone.
fn format_epoch(epoch: f64) -> String {
    let secs = epoch.trunc() as i64;
    let nanos = (epoch.fract() * 1e9) as u32;
    match Local.timestamp_opt(secs, nanos) {
        chrono::LocalResult::Single(ts) | chrono::LocalResult::Ambiguous(ts, _) => {
            ts.format(TIMESTAMP_FORMAT).to_string()
        }
        chrono::LocalResult::None => String::new(),
    }
}

/// Config takes precedence over summary for non-fixed columns.
fn lookup_cell(run: &Run, key: &str, errors: &mut Vec<FieldError>) -> String {
    let looked = if run.config.contains(key) {
        run.config.get(key)
    } else {
        run.summary.get(key)
    };

    match looked {
        Ok(value) => value.render(),
        Err(err) => {
            errors.push(err);
            String::new()
        }
    }
}

/// Aggregated counters for one extraction pass.
#[derive(Debug, Default)]
pub struct ExtractStats {
    pub rows: usize,
    pub field_errors: usize,
}

/// Extract rows in fixed-size batches.
///
/// Batching only bounds memory and drives progress reporting; the produced
/// rows are identical for any batch size. `on_batch` receives the batch's
/// row and field-error counts after each batch completes.
pub fn extract_batches(
    runs: &[&Run],
    headers: &[String],
    names: &HashMap<String, String>,
    batch_size: usize,
    mut on_batch: impl FnMut(usize, usize),
) -> (Vec<SheetRow>, ExtractStats) {
    let mut rows = Vec::with_capacity(runs.len());
    let mut stats = ExtractStats::default();
    let batch_size = batch_size.max(1);

    for batch in runs.chunks(batch_size) {
        let mut batch_errors = 0;
        for run in batch {
            let extract = extract_row(run, headers, names);
            batch_errors += extract.field_errors.len();
            rows.push(extract.row);
        }
        stats.rows = rows.len();
        stats.field_errors += batch_errors;
        debug!(
            batch = batch.len(),
            total = rows.len(),
            errors = batch_errors,
            "extracted batch"
        );
        on_batch(batch.len(), batch_errors);
    }

    (rows, stats)
}
