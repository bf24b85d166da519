//! In-memory record store
//!
//! Clones share the same underlying state, so a test can hand one clone to
//! the driver and inspect another afterwards.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Deduplicator, RecordStore, StoreError, StoreResult};
use crate::types::Record;

#[derive(Debug, Default)]
struct MemoryState {
    rows: Vec<Record>,
    /// Ids passed to every bulk insert call, including rejected ones
    insert_calls: Vec<Vec<i64>>,
    /// 1-based bulk insert call numbers that must be rejected
    failing_calls: HashSet<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing documents
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        store.lock().rows.extend(records);
        store
    }

    /// Reject the `call`-th bulk insert (1-based)
    pub fn fail_insert_call(&self, call: usize) {
        self.lock().failing_calls.insert(call);
    }

    /// Ids submitted by each bulk insert call, in call order
    pub fn insert_calls(&self) -> Vec<Vec<i64>> {
        self.lock().insert_calls.clone()
    }

    /// Remote ids of the stored documents, in insertion order
    pub fn ids(&self) -> Vec<i64> {
        self.lock().rows.iter().map(|r| r.id).collect()
    }

    pub fn records(&self) -> Vec<Record> {
        self.lock().rows.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock only means another test thread panicked mid-update.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn count(&self) -> StoreResult<u64> {
        Ok(self.lock().rows.len() as u64)
    }

    async fn find_max_id(&self) -> StoreResult<Option<i64>> {
        Ok(self.lock().rows.iter().map(|r| r.id).max())
    }

    async fn bulk_insert(&self, records: &[Record]) -> StoreResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut state = self.lock();
        state.insert_calls.push(records.iter().map(|r| r.id).collect());
        let call = state.insert_calls.len();

        if state.failing_calls.contains(&call) {
            return Err(StoreError::Rejected(format!(
                "bulk insert call {} rejected ({} documents)",
                call,
                records.len()
            )));
        }

        state.rows.extend_from_slice(records);
        Ok(records.len() as u64)
    }
}

#[async_trait]
impl Deduplicator for MemoryRecordStore {
    async fn remove_duplicates(&self) -> StoreResult<u64> {
        let mut state = self.lock();
        let before = state.rows.len();

        let mut seen = HashSet::new();
        state.rows.retain(|r| seen.insert(r.id));

        Ok((before - state.rows.len()) as u64)
    }
}

/// Count documents per remote id, handy when asserting on duplicates
pub fn id_histogram(records: &[Record]) -> HashMap<i64, usize> {
    let mut counts = HashMap::new();
    for record in records {
        *counts.entry(record.id).or_insert(0) += 1;
    }
    counts
}
