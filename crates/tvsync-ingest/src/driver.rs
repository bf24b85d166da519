//! Ingestion driver
//!
//! Scans the id range strictly in order, one fetch and at most one commit in
//! flight at any time:
//!
//! ```text
//! INIT -> SCANNING -> (per id: FETCH -> [ACCUMULATE] -> [FLUSH]) -> FINALIZING -> DONE
//! ```
//!
//! All run state (buffer, counters) is created per run and owned by it, so a
//! driver can be reused for several runs.
//!
//! # Delivery guarantee
//!
//! Commits are at-most-once. A batch the store rejects is reported to the
//! [`RunSink`] (which dead-letters it) and discarded; it is never
//! resubmitted by the run. Only the unflushed buffer is lost if the process
//! dies mid-run.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::batch::{BatchAccumulator, FlushOutcome};
use crate::config::DEFAULT_BATCH_SIZE;
use crate::fetcher::{FetchOutcome, RecordFetcher};
use crate::sink::{BatchFailure, NoopSink, RunSink};
use crate::store::{Deduplicator, RecordStore, StoreResult};
use crate::summary::{format_elapsed, RunSummary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOptions {
    /// Inclusive upper bound of the scan
    pub end_id: i64,
    /// Ids attempted per batch
    pub batch_size: usize,
    /// Pause between consecutive fetches
    pub request_delay: Duration,
    /// Overrides the resumption point when set
    pub start_id: Option<i64>,
}

impl DriverOptions {
    pub fn new(end_id: i64) -> Self {
        Self {
            end_id,
            batch_size: DEFAULT_BATCH_SIZE,
            request_delay: Duration::ZERO,
            start_id: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Where a run picks up, read once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    /// Highest remote id in the store
    pub last_id: Option<i64>,
    /// Documents in the store
    pub count: u64,
}

impl ResumePoint {
    /// The last stored id is fetched again; an empty store starts at 1
    pub fn start_id(&self) -> i64 {
        match self.last_id {
            Some(id) if id > 0 => id,
            _ => 1,
        }
    }
}

/// Counters for a single run
struct RunState {
    run_id: Uuid,
    previous_total: u64,
    start_id: i64,
    end_id: i64,
    new_records: u64,
    ids_attempted: u64,
    no_data: u64,
    fetch_errors: u64,
    batches_committed: u64,
    batches_failed: u64,
    records_dropped: u64,
}

impl RunState {
    fn new(previous_total: u64, start_id: i64, end_id: i64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            previous_total,
            start_id,
            end_id,
            new_records: 0,
            ids_attempted: 0,
            no_data: 0,
            fetch_errors: 0,
            batches_committed: 0,
            batches_failed: 0,
            records_dropped: 0,
        }
    }

    fn finish(self, elapsed: Duration) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            previous_total: self.previous_total,
            new_records: self.new_records,
            start_id: self.start_id,
            end_id: self.end_id,
            ids_attempted: self.ids_attempted,
            no_data: self.no_data,
            fetch_errors: self.fetch_errors,
            batches_committed: self.batches_committed,
            batches_failed: self.batches_failed,
            records_dropped: self.records_dropped,
            duplicates_removed: None,
            elapsed,
        }
    }
}

pub struct IngestionDriver<F, S> {
    fetcher: F,
    store: S,
    sink: Arc<dyn RunSink>,
    deduplicator: Option<Arc<dyn Deduplicator>>,
    options: DriverOptions,
}

impl<F, S> IngestionDriver<F, S>
where
    F: RecordFetcher,
    S: RecordStore,
{
    pub fn new(fetcher: F, store: S, options: DriverOptions) -> Self {
        Self {
            fetcher,
            store,
            sink: Arc::new(NoopSink),
            deduplicator: None,
            options,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn RunSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run `deduplicator` once after every completed scan
    pub fn with_deduplicator(mut self, deduplicator: Arc<dyn Deduplicator>) -> Self {
        self.deduplicator = Some(deduplicator);
        self
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    pub async fn resume_point(&self) -> StoreResult<ResumePoint> {
        let count = self.store.count().await?;
        let last_id = self.store.find_max_id().await?;
        Ok(ResumePoint { last_id, count })
    }

    /// Ingest from the resumption point (or the configured start id) up to
    /// the configured end id
    pub async fn run(&self) -> StoreResult<RunSummary> {
        let started = Instant::now();
        let resume = self.resume_point().await?;

        info!(
            last_id = resume.last_id.unwrap_or(0),
            total = resume.count,
            "Last ID fetched: {}, total data: {}",
            resume.last_id.unwrap_or(0),
            resume.count
        );

        let start_id = self.options.start_id.unwrap_or_else(|| resume.start_id());
        self.scan(start_id, self.options.end_id, resume.count, started)
            .await
    }

    /// Ingest exactly `start_id..=end_id`, ignoring the resumption point
    pub async fn run_range(&self, start_id: i64, end_id: i64) -> StoreResult<RunSummary> {
        let started = Instant::now();
        let previous_total = self.store.count().await?;
        self.scan(start_id, end_id, previous_total, started).await
    }

    async fn scan(
        &self,
        start_id: i64,
        end_id: i64,
        previous_total: u64,
        started: Instant,
    ) -> StoreResult<RunSummary> {
        if start_id < 1 {
            warn!(start_id, "Ids start at 1, skipping non-positive ids");
        }
        let start_id = start_id.max(1);

        let mut state = RunState::new(previous_total, start_id, end_id);
        let span = info_span!("ingest_run", run_id = %state.run_id, start_id, end_id);

        async move {
            if start_id > end_id {
                warn!(start_id, end_id, "Start id is past the end of the range, nothing to fetch");
            }

            let mut batch = BatchAccumulator::new(self.options.batch_size);
            let mut attempts_since_flush = 0usize;

            for id in start_id..=end_id {
                if id > start_id && !self.options.request_delay.is_zero() {
                    tokio::time::sleep(self.options.request_delay).await;
                }

                match self.fetcher.fetch(id).await {
                    FetchOutcome::Found(record) => {
                        batch.add(record);
                        state.new_records += 1;
                    },
                    FetchOutcome::NoData => state.no_data += 1,
                    FetchOutcome::Failed(_) => state.fetch_errors += 1,
                }
                state.ids_attempted += 1;
                attempts_since_flush += 1;

                if batch.should_flush(attempts_since_flush, id == end_id) {
                    self.flush(&mut batch, &mut state).await;
                    attempts_since_flush = 0;
                }
            }

            let mut summary = state.finish(started.elapsed());
            summary.log();
            self.sink.run_completed(&summary).await;

            if let Some(deduplicator) = &self.deduplicator {
                match deduplicator.remove_duplicates().await {
                    Ok(removed) => {
                        info!(removed, "Removed {} duplicate documents", removed);
                        summary.duplicates_removed = Some(removed);
                    },
                    Err(e) => warn!(error = %e, "Duplicate removal failed"),
                }
            }

            info!(elapsed = %format_elapsed(started.elapsed()), "Ingestion run complete");
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    async fn flush(&self, batch: &mut BatchAccumulator, state: &mut RunState) {
        match batch.flush(&self.store).await {
            FlushOutcome::Empty => {},
            FlushOutcome::Committed { .. } => state.batches_committed += 1,
            FlushOutcome::Failed {
                batch_number,
                records,
                error,
            } => {
                state.batches_failed += 1;
                state.records_dropped += records.len() as u64;

                let failure = BatchFailure::new(state.run_id, batch_number, records, error.to_string());
                self.sink.batch_failed(&failure).await;
            },
        }
    }
}
