//! Batch accumulator
//!
//! Buffers fetched records and hands them to the store in one bulk insert.
//! The buffer is emptied on every flush, whether the insert succeeded or
//! not: a rejected batch is returned to the caller and never resubmitted.

use tracing::{error, info};

use crate::store::{RecordStore, StoreError};
use crate::types::Record;

/// What happened to a flushed batch
#[derive(Debug)]
pub enum FlushOutcome {
    /// Nothing was buffered; the store was not called
    Empty,
    Committed { batch_number: u64, count: usize },
    /// The store rejected the batch. The records are handed back so the
    /// caller can dead-letter them.
    Failed {
        batch_number: u64,
        records: Vec<Record>,
        error: StoreError,
    },
}

pub struct BatchAccumulator {
    threshold: usize,
    buffer: Vec<Record>,
    flushed: u64,
}

impl BatchAccumulator {
    /// `threshold` is the number of attempted ids per batch; 0 is treated as 1
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            buffer: Vec::with_capacity(threshold),
            flushed: 0,
        }
    }

    pub fn add(&mut self, record: Record) {
        self.buffer.push(record);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of flushes that reached the store so far
    pub fn flushed(&self) -> u64 {
        self.flushed
    }

    /// Flush once `count_since_last_flush` ids have been attempted, or when
    /// the last id of the range has just been processed.
    pub fn should_flush(&self, count_since_last_flush: usize, is_last_id: bool) -> bool {
        count_since_last_flush >= self.threshold || is_last_id
    }

    /// Send the buffered records to `store` and clear the buffer
    pub async fn flush<S>(&mut self, store: &S) -> FlushOutcome
    where
        S: RecordStore + ?Sized,
    {
        let records = std::mem::take(&mut self.buffer);
        if records.is_empty() {
            return FlushOutcome::Empty;
        }

        self.flushed += 1;
        let batch_number = self.flushed;
        let count = records.len();

        match store.bulk_insert(&records).await {
            Ok(_) => {
                info!(batch = batch_number, size = count, "Batch with {} records saved", count);
                FlushOutcome::Committed { batch_number, count }
            },
            Err(e) => {
                error!(
                    batch = batch_number,
                    size = count,
                    error = %e,
                    "Error saving batch with {} records",
                    count
                );
                FlushOutcome::Failed {
                    batch_number,
                    records,
                    error: e,
                }
            },
        }
    }
}
