//! Row values, stringification and ordering.

use serde_json::Value;

/// One materialized spreadsheet row.
///
/// cells[0] is the run id, cells[1] the formatted completion timestamp,
/// cells[2] the owner name; the remainder follows the destination header.
/// Rows are never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    pub cells: Vec<String>,
}

impl SheetRow {
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    /// First cell, the run identifier (used by tests to address rows)
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn run_id(&self) -> &str {
        self.cells.first().map(String::as_str).unwrap_or("")
    }

    /// The sort column. Empty when the run had no completion timestamp.
    pub fn timestamp(&self) -> &str {
        self.cells.get(1).map(String::as_str).unwrap_or("")
    }
}

/// Convert one raw cell value to its string form.
///
/// Nulls and NaN-like values become empty strings so re-read rows compare
/// and sort the same way freshly extracted ones do.
pub fn stringify_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.is_nan() => String::new(),
            _ => n.to_string(),
        },
        Value::String(s) if s.eq_ignore_ascii_case("nan") => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Sort rows by timestamp, newest first.
///
/// Plain lexicographic comparison; the fixed-width timestamp format makes it
/// chronological, and rows without a timestamp sort last.
pub fn sort_rows_desc(rows: &mut [SheetRow]) {
    rows.sort_by(|a, b| b.timestamp().cmp(a.timestamp()));
}

/// Combine newly extracted rows with pre-existing rows and order the result
/// newest first.
pub fn merge_rows(new_rows: Vec<SheetRow>, existing: Vec<SheetRow>) -> Vec<SheetRow> {
    let mut merged = new_rows;
    merged.extend(existing);
    sort_rows_desc(&mut merged);
    merged
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(id: &str, timestamp: &str) -> SheetRow {
        SheetRow::new(vec![id.to_string(), timestamp.to_string()])
    }

    #[test]
    fn test_stringify_cell() {
        assert_eq!(stringify_cell(&json!(null)), "");
        assert_eq!(stringify_cell(&json!(true)), "true");
        assert_eq!(stringify_cell(&json!(3.5)), "3.5");
        assert_eq!(stringify_cell(&json!(42)), "42");
        assert_eq!(stringify_cell(&json!("hello")), "hello");
        assert_eq!(stringify_cell(&json!("NaN")), "");
        assert_eq!(stringify_cell(&json!("nan")), "");
    }

    #[test]
    fn test_sort_newest_first() {
        let mut rows = vec![
            row("r1", "2024-01-01 00:00:00"),
            row("r2", "2024-06-01 00:00:00"),
            row("r3", "2024-03-15 12:30:00"),
        ];
        sort_rows_desc(&mut rows);

        let ids: Vec<&str> = rows.iter().map(|r| r.run_id()).collect();
        assert_eq!(ids, vec!["r2", "r3", "r1"]);
    }

    #[test]
    fn test_empty_timestamp_sorts_last() {
        let mut rows = vec![
            row("r1", ""),
            row("r2", "2024-06-01 00:00:00"),
            row("r3", ""),
        ];
        sort_rows_desc(&mut rows);

        assert_eq!(rows[0].run_id(), "r2");
        assert_eq!(rows[1].timestamp(), "");
        assert_eq!(rows[2].timestamp(), "");
    }

    #[test]
    fn test_merge_orders_new_before_old() {
        let existing = vec![row("r1", "2024-01-01 00:00:00")];
        let new_rows = vec![row("r2", "2024-06-01 00:00:00")];

        let merged = merge_rows(new_rows, existing);
        let ids: Vec<&str> = merged.iter().map(|r| r.run_id()).collect();
        assert_eq!(ids, vec!["r2", "r1"]);
    }

    #[test]
    fn test_row_accessors_on_short_rows() {
        let empty = SheetRow::new(vec![]);
        assert_eq!(empty.run_id(), "");
        assert_eq!(empty.timestamp(), "");
    }
}
