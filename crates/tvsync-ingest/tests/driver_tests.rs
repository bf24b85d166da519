//! Ingestion driver tests
//!
//! Drive the full scan loop against a scripted fetcher and the in-memory
//! store, so batching, resumption and failure handling can be checked
//! without a network or a database.

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use serde_json::{json, Map};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tvsync_ingest::sink::RecordingSink;
use tvsync_ingest::store::memory::id_histogram;
use tvsync_ingest::store::{Deduplicator, MemoryRecordStore, StoreError, StoreResult};
use tvsync_ingest::{DriverOptions, FetchOutcome, IngestionDriver, Record, RecordFetcher};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tvsync_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

fn record(id: i64) -> Record {
    let mut doc = Map::new();
    doc.insert("id".to_string(), json!(id));
    doc.insert("name".to_string(), json!(format!("Show {}", id)));
    Record::new(id, doc)
}

/// Answers from a fixed table; unknown ids have no data
#[derive(Default)]
struct ScriptedFetcher {
    outcomes: HashMap<i64, FetchOutcome>,
    requested: Arc<Mutex<Vec<i64>>>,
}

impl ScriptedFetcher {
    fn found(ids: impl IntoIterator<Item = i64>) -> Self {
        let mut fetcher = Self::default();
        for id in ids {
            fetcher.outcomes.insert(id, FetchOutcome::Found(record(id)));
        }
        fetcher
    }

    fn failing(mut self, id: i64) -> Self {
        self.outcomes
            .insert(id, FetchOutcome::Failed(format!("HTTP status server error (500) for id {}", id)));
        self
    }

    fn requested(&self) -> Arc<Mutex<Vec<i64>>> {
        Arc::clone(&self.requested)
    }
}

#[async_trait]
impl RecordFetcher for ScriptedFetcher {
    async fn fetch(&self, id: i64) -> FetchOutcome {
        self.requested.lock().unwrap().push(id);
        self.outcomes.get(&id).cloned().unwrap_or(FetchOutcome::NoData)
    }
}

struct BrokenDeduplicator;

#[async_trait]
impl Deduplicator for BrokenDeduplicator {
    async fn remove_duplicates(&self) -> StoreResult<u64> {
        Err(StoreError::Rejected("dedup statement timed out".to_string()))
    }
}

#[tokio::test]
async fn test_sparse_range_single_final_flush() {
    init_tracing();

    let store = MemoryRecordStore::new();
    let fetcher = ScriptedFetcher::found([1, 2, 4]);
    let driver = IngestionDriver::new(fetcher, store.clone(), DriverOptions::new(5));

    let summary = driver.run().await.unwrap();

    assert_eq!(store.insert_calls(), vec![vec![1, 2, 4]]);
    assert_eq!(summary.new_records, 3);
    assert_eq!(summary.no_data, 2);
    assert_eq!(summary.ids_attempted, 5);
    assert_eq!(summary.total(), 3);
}

#[tokio::test]
async fn test_empty_store_starts_at_one() {
    let fetcher = ScriptedFetcher::found(1..=3);
    let requested = fetcher.requested();
    let driver = IngestionDriver::new(fetcher, MemoryRecordStore::new(), DriverOptions::new(3));

    let summary = driver.run().await.unwrap();

    assert_eq!(*requested.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(summary.start_id, 1);
    assert_eq!(summary.previous_total, 0);
}

#[tokio::test]
async fn test_resumes_by_refetching_last_stored_id() {
    let store = MemoryRecordStore::with_records((1..=7).map(record));
    let fetcher = ScriptedFetcher::found(1..=10);
    let requested = fetcher.requested();
    let driver = IngestionDriver::new(fetcher, store.clone(), DriverOptions::new(10));

    let summary = driver.run().await.unwrap();

    assert_eq!(*requested.lock().unwrap(), vec![7, 8, 9, 10]);
    assert_eq!(summary.start_id, 7);
    assert_eq!(summary.previous_total, 7);
    assert_eq!(summary.new_records, 4);
    // id 7 is now stored twice until a dedup pass runs
    assert_eq!(id_histogram(&store.records())[&7], 2);
}

#[tokio::test]
async fn test_dedup_pass_removes_refetched_id() {
    let store = MemoryRecordStore::with_records((1..=7).map(record));
    let driver = IngestionDriver::new(ScriptedFetcher::found(1..=10), store.clone(), DriverOptions::new(10))
        .with_deduplicator(Arc::new(store.clone()));

    let summary = driver.run().await.unwrap();

    assert_eq!(summary.duplicates_removed, Some(1));
    assert_eq!(store.ids(), (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_dedup_failure_does_not_fail_run() {
    let sink = RecordingSink::new();
    let driver = IngestionDriver::new(ScriptedFetcher::found(1..=2), MemoryRecordStore::new(), DriverOptions::new(2))
        .with_sink(Arc::new(sink.clone()))
        .with_deduplicator(Arc::new(BrokenDeduplicator));

    let summary = driver.run().await.unwrap();

    assert_eq!(summary.duplicates_removed, None);
    assert_eq!(sink.summaries().len(), 1);
}

#[tokio::test]
async fn test_batch_count_is_ceiling_of_range_over_threshold() {
    let store = MemoryRecordStore::new();
    let options = DriverOptions::new(25).with_batch_size(10);
    let driver = IngestionDriver::new(ScriptedFetcher::found(1..=25), store.clone(), options);

    let summary = driver.run().await.unwrap();

    let sizes: Vec<usize> = store.insert_calls().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    assert_eq!(summary.batches_committed, 3);
    assert_eq!(store.ids(), (1..=25).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_exact_multiple_of_threshold_flushes_once_per_batch() {
    let store = MemoryRecordStore::new();
    let options = DriverOptions::new(20).with_batch_size(10);
    let driver = IngestionDriver::new(ScriptedFetcher::found(1..=20), store.clone(), options);

    let summary = driver.run().await.unwrap();

    assert_eq!(store.insert_calls(), vec![(1..=10).collect::<Vec<_>>(), (11..=20).collect()]);
    assert_eq!(summary.batches_committed, 2);
    assert_eq!(store.ids(), (1..=20).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_no_data_ids_count_towards_flush_threshold() {
    let store = MemoryRecordStore::new();
    let options = DriverOptions::new(10).with_batch_size(5);
    let fetcher = ScriptedFetcher::found([2, 4, 6, 8, 10]);
    let driver = IngestionDriver::new(fetcher, store.clone(), options);

    let summary = driver.run().await.unwrap();

    assert_eq!(store.insert_calls(), vec![vec![2, 4], vec![6, 8, 10]]);
    assert_eq!(summary.no_data, 5);
    assert_eq!(summary.new_records, 5);
}

#[tokio::test]
async fn test_window_without_records_skips_store() {
    let store = MemoryRecordStore::new();
    let options = DriverOptions::new(6).with_batch_size(3);
    let driver = IngestionDriver::new(ScriptedFetcher::found([5]), store.clone(), options);

    let summary = driver.run().await.unwrap();

    assert_eq!(store.insert_calls(), vec![vec![5]]);
    assert_eq!(summary.batches_committed, 1);
}

#[tokio::test]
async fn test_fetch_errors_are_counted_and_skipped() {
    let store = MemoryRecordStore::new();
    let fetcher = ScriptedFetcher::found(1..=4).failing(3);
    let driver = IngestionDriver::new(fetcher, store.clone(), DriverOptions::new(4));

    let summary = driver.run().await.unwrap();

    assert_eq!(store.ids(), vec![1, 2, 4]);
    assert_eq!(summary.fetch_errors, 1);
    assert_eq!(summary.new_records, 3);
}

#[tokio::test]
async fn test_rejected_batch_is_dead_lettered_and_not_resubmitted() {
    init_tracing();

    let store = MemoryRecordStore::new();
    store.fail_insert_call(2);
    let sink = RecordingSink::new();
    let options = DriverOptions::new(6).with_batch_size(2);
    let driver = IngestionDriver::new(ScriptedFetcher::found(1..=6), store.clone(), options)
        .with_sink(Arc::new(sink.clone()));

    let summary = driver.run().await.unwrap();

    // the scan carries on after the rejection and never retries it
    assert_eq!(store.insert_calls(), vec![vec![1, 2], vec![3, 4], vec![5, 6]]);
    assert_eq!(store.ids(), vec![1, 2, 5, 6]);

    assert_eq!(summary.batches_committed, 2);
    assert_eq!(summary.batches_failed, 1);
    assert_eq!(summary.records_dropped, 2);
    // fetched records are reported as new even when their batch was lost
    assert_eq!(summary.new_records, 6);

    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].batch_number, 2);
    assert_eq!(failures[0].run_id, summary.run_id);
    assert_eq!(failures[0].records, vec![record(3), record(4)]);
    assert!(failures[0].error.contains("rejected"));
}

#[tokio::test]
async fn test_summary_adds_new_records_to_previous_total() {
    let store = MemoryRecordStore::with_records((1..=50).map(record));
    let mut options = DriverOptions::new(80);
    options.start_id = Some(51);
    let sink = RecordingSink::new();
    let driver = IngestionDriver::new(ScriptedFetcher::found(51..=80), store, options)
        .with_sink(Arc::new(sink.clone()));

    let summary = driver.run().await.unwrap();

    assert_eq!(summary.previous_total, 50);
    assert_eq!(summary.new_records, 30);
    assert_eq!(summary.total(), 80);
    assert_eq!(sink.summaries(), vec![summary]);
}

#[tokio::test]
async fn test_start_past_end_fetches_nothing() {
    let store = MemoryRecordStore::with_records((1..=9).map(record));
    let fetcher = ScriptedFetcher::found(1..=20);
    let requested = fetcher.requested();
    let sink = RecordingSink::new();
    let driver = IngestionDriver::new(fetcher, store.clone(), DriverOptions::new(5))
        .with_sink(Arc::new(sink.clone()));

    let summary = driver.run().await.unwrap();

    assert!(requested.lock().unwrap().is_empty());
    assert!(store.insert_calls().is_empty());
    assert_eq!(summary.ids_attempted, 0);
    assert_eq!(summary.new_records, 0);
    assert_eq!(summary.total(), 9);
    assert_eq!(sink.summaries().len(), 1);
}

#[tokio::test]
async fn test_non_positive_start_id_is_clamped_to_one() {
    let fetcher = ScriptedFetcher::found(1..=2);
    let requested = fetcher.requested();
    let mut options = DriverOptions::new(2);
    options.start_id = Some(-2);
    let driver = IngestionDriver::new(fetcher, MemoryRecordStore::new(), options);

    let summary = driver.run().await.unwrap();

    assert_eq!(*requested.lock().unwrap(), vec![1, 2]);
    assert_eq!(summary.start_id, 1);
    assert_eq!(summary.ids_attempted, 2);
}

#[tokio::test]
async fn test_run_range_ignores_resumption_point() {
    let store = MemoryRecordStore::with_records((1..=100).map(record));
    let fetcher = ScriptedFetcher::found(1..=200);
    let requested = fetcher.requested();
    let driver = IngestionDriver::new(fetcher, store.clone(), DriverOptions::new(200));

    let summary = driver.run_range(3, 5).await.unwrap();

    assert_eq!(*requested.lock().unwrap(), vec![3, 4, 5]);
    assert_eq!(summary.previous_total, 100);
    assert_eq!(store.insert_calls(), vec![vec![3, 4, 5]]);
}

#[tokio::test]
async fn test_driver_is_reusable_across_runs() {
    let store = MemoryRecordStore::new();
    let driver = IngestionDriver::new(ScriptedFetcher::found(1..=4), store.clone(), DriverOptions::new(4));

    let first = driver.run().await.unwrap();
    let second = driver.run().await.unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.new_records, 4);
    // second run resumes at 4 and fetches it again
    assert_eq!(second.start_id, 4);
    assert_eq!(second.previous_total, 4);
    assert_eq!(second.new_records, 1);
}

#[tokio::test(start_paused = true)]
async fn test_request_delay_between_fetches() {
    let mut options = DriverOptions::new(3);
    options.request_delay = std::time::Duration::from_secs(2);
    let driver = IngestionDriver::new(ScriptedFetcher::found(1..=3), MemoryRecordStore::new(), options);

    let started = tokio::time::Instant::now();
    let summary = driver.run().await.unwrap();

    // no pause before the first request
    assert!(started.elapsed() >= std::time::Duration::from_secs(4));
    assert_eq!(summary.new_records, 3);
}
