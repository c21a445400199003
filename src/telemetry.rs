/// Events emitted while a sync tick progresses
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Runs were listed and filtered against the existing identifiers
    RunsListed { total: usize, qualifying: usize },
    /// A batch of runs was extracted into rows
    BatchExtracted { rows: usize, field_errors: usize },
    /// A chunk of rows was appended to the destination tab
    ChunkAppended { rows: usize },
}

/// Statistics aggregated from sync events
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    pub runs_listed: usize,
    pub runs_qualifying: usize,
    pub rows_extracted: usize,
    pub field_errors: usize,
    pub append_calls: usize,
    pub rows_appended: usize,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a sync event
    pub fn update(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::RunsListed { total, qualifying } => {
                self.runs_listed = *total;
                self.runs_qualifying = *qualifying;
            }
            SyncEvent::BatchExtracted { rows, field_errors } => {
                self.rows_extracted += rows;
                self.field_errors += field_errors;
            }
            SyncEvent::ChunkAppended { rows } => {
                self.append_calls += 1;
                self.rows_appended += rows;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_aggregation() {
        let mut stats = SyncStats::new();
        stats.update(&SyncEvent::RunsListed {
            total: 10,
            qualifying: 4,
        });
        stats.update(&SyncEvent::BatchExtracted {
            rows: 3,
            field_errors: 1,
        });
        stats.update(&SyncEvent::BatchExtracted {
            rows: 1,
            field_errors: 0,
        });
        stats.update(&SyncEvent::ChunkAppended { rows: 4 });

        assert_eq!(stats.runs_listed, 10);
        assert_eq!(stats.runs_qualifying, 4);
        assert_eq!(stats.rows_extracted, 4);
        assert_eq!(stats.field_errors, 1);
        assert_eq!(stats.append_calls, 1);
        assert_eq!(stats.rows_appended, 4);
    }
}
