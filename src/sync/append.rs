//! Chunked, rate-limited appends.

use tracing::debug;

use super::rows::SheetRow;
use crate::config::{APPEND_CHUNK_PAUSE, APPEND_CHUNK_ROWS};
use crate::error::SheetError;
use crate::sheets::client::SheetStore;

/// Counters for one append pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AppendStats {
    pub calls: usize,
    pub rows: usize,
}

/// Append rows in service-sized chunks, pausing after each call to respect
/// the rate limit.
///
/// Already-appended chunks are not rolled back on failure (at-least-once).
/// `on_chunk` receives each chunk's row count after its append succeeds.
pub async fn append_chunked(
    store: &dyn SheetStore,
    tab: &str,
    rows: &[SheetRow],
    mut on_chunk: impl FnMut(usize),
) -> Result<AppendStats, SheetError> {
    let mut stats = AppendStats::default();

    for chunk in rows.chunks(APPEND_CHUNK_ROWS) {
        store.append_rows(tab, chunk).await?;
        stats.calls += 1;
        stats.rows += chunk.len();
        debug!(rows = chunk.len(), total = stats.rows, "appended chunk");
        on_chunk(chunk.len());
        tokio::time::sleep(APPEND_CHUNK_PAUSE).await;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::InMemorySheetStore;

    fn rows(n: usize) -> Vec<SheetRow> {
        (0..n)
            .map(|i| SheetRow::new(vec![format!("r{i}"), String::new()]))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_250_rows_make_three_chunked_calls() {
        let store = InMemorySheetStore::new();
        let mut chunk_sizes = Vec::new();

        let stats = append_chunked(&store, "Sheet1", &rows(250), |n| chunk_sizes.push(n))
            .await
            .unwrap();

        assert_eq!(stats.calls, 3);
        assert_eq!(stats.rows, 250);
        assert_eq!(chunk_sizes, vec![100, 100, 50]);
        assert_eq!(store.append_sizes(), vec![100, 100, 50]);
        assert_eq!(store.rows("Sheet1").len(), 250);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_chunk_is_followed_by_a_pause() {
        let store = InMemorySheetStore::new();
        let start = tokio::time::Instant::now();

        append_chunked(&store, "Sheet1", &rows(250), |_| {})
            .await
            .unwrap();

        assert_eq!(start.elapsed(), APPEND_CHUNK_PAUSE * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_progress_survives_append_failure() {
        let store = InMemorySheetStore::new();
        store.fail_appends_after(2);

        let err = append_chunked(&store, "Sheet1", &rows(250), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, SheetError::Status { .. }));
        // The first two chunks were appended and stay appended
        assert_eq!(store.rows("Sheet1").len(), 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_rows_no_calls() {
        let store = InMemorySheetStore::new();
        let stats = append_chunked(&store, "Sheet1", &[], |_| {}).await.unwrap();
        assert_eq!(stats, AppendStats::default());
        assert!(store.append_sizes().is_empty());
    }
}
