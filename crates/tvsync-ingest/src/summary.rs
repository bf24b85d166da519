//! End-of-run summary

use serde::Serialize;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Documents in the store before the run started
    pub previous_total: u64,
    /// Records fetched during this run, committed or not
    pub new_records: u64,
    pub start_id: i64,
    pub end_id: i64,
    pub ids_attempted: u64,
    pub no_data: u64,
    pub fetch_errors: u64,
    pub batches_committed: u64,
    pub batches_failed: u64,
    /// Records lost to rejected batches (dead-lettered, not retried)
    pub records_dropped: u64,
    /// Filled in once the dedup pass has run
    pub duplicates_removed: Option<u64>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn total(&self) -> u64 {
        self.previous_total + self.new_records
    }

    /// Contents of the `log_<timestamp>.txt` run artifact
    pub fn artifact_text(&self) -> String {
        format!(
            "Total data: {}\nNew data: {}\nTime elapsed: {}\n",
            self.previous_total,
            self.new_records,
            format_elapsed(self.elapsed)
        )
    }

    pub fn log(&self) {
        info!(
            run_id = %self.run_id,
            new_records = self.new_records,
            total = self.total(),
            ids_attempted = self.ids_attempted,
            no_data = self.no_data,
            fetch_errors = self.fetch_errors,
            batches_committed = self.batches_committed,
            batches_failed = self.batches_failed,
            records_dropped = self.records_dropped,
            "Run finished: {} new, {} total, {} elapsed",
            self.new_records,
            self.total(),
            format_elapsed(self.elapsed)
        );
    }
}

/// Render a duration as `1h 2m 3s`, `2m 5s` or `4.21s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{:.2}s", elapsed.as_secs_f64())
    }
}
