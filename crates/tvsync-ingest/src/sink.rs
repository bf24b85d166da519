//! Run sinks
//!
//! The driver reports rejected batches and the final summary to a
//! [`RunSink`]. Sinks never influence control flow: write errors are logged
//! and swallowed.

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info};
use uuid::Uuid;

use crate::summary::RunSummary;
use crate::types::Record;

/// Timestamp embedded in artifact file names
const ARTIFACT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// A batch the store refused to commit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub run_id: Uuid,
    pub batch_number: u64,
    pub records: Vec<Record>,
    pub error: String,
    pub occurred_at: DateTime<Utc>,
}

impl BatchFailure {
    pub fn new(run_id: Uuid, batch_number: u64, records: Vec<Record>, error: impl Into<String>) -> Self {
        Self {
            run_id,
            batch_number,
            records,
            error: error.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn first_id(&self) -> Option<i64> {
        self.records.first().map(|r| r.id)
    }

    pub fn last_id(&self) -> Option<i64> {
        self.records.last().map(|r| r.id)
    }

    fn detail_text(&self) -> String {
        let range = match (self.first_id(), self.last_id()) {
            (Some(first), Some(last)) => format!("{}..={}", first, last),
            _ => "-".to_string(),
        };

        format!(
            "Run: {}\nBatch: {}\nIds: {}\nRecords: {}\nAt: {}\n\n{}\n",
            self.run_id,
            self.batch_number,
            range,
            self.records.len(),
            self.occurred_at.to_rfc3339(),
            self.error
        )
    }
}

#[async_trait]
pub trait RunSink: Send + Sync {
    async fn batch_failed(&self, failure: &BatchFailure);

    async fn run_completed(&self, summary: &RunSummary);
}

/// Sink that drops every event
pub struct NoopSink;

#[async_trait]
impl RunSink for NoopSink {
    async fn batch_failed(&self, _failure: &BatchFailure) {}

    async fn run_completed(&self, _summary: &RunSummary) {}
}

/// Writes run artifacts into a directory
///
/// - `error_<ts>_batch<n>.txt`: why batch `n` was rejected
/// - `dead_letter_<ts>_batch<n>.jsonl`: the rejected records, one per line
/// - `log_<ts>.txt`: the run summary
pub struct ArtifactSink {
    dir: PathBuf,
}

impl ArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, prefix: &str, at: DateTime<Local>, suffix: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_{}{}",
            prefix,
            at.format(ARTIFACT_TIMESTAMP_FORMAT),
            suffix
        ))
    }

    async fn write(&self, path: &Path, contents: String) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(path, contents).await
    }

    async fn write_dead_letter(&self, path: &Path, records: &[Record]) -> tvsync_common::Result<()> {
        let mut lines = String::new();
        for record in records {
            lines.push_str(&serde_json::to_string(record)?);
            lines.push('\n');
        }
        self.write(path, lines).await?;
        Ok(())
    }
}

#[async_trait]
impl RunSink for ArtifactSink {
    async fn batch_failed(&self, failure: &BatchFailure) {
        let at = failure.occurred_at.with_timezone(&Local);
        let suffix = format!("_batch{}", failure.batch_number);

        let error_path = self.path_for("error", at, &format!("{}.txt", suffix));
        if let Err(e) = self.write(&error_path, failure.detail_text()).await {
            error!(path = %error_path.display(), error = %e, "Failed to write error artifact");
        }

        let dead_letter_path = self.path_for("dead_letter", at, &format!("{}.jsonl", suffix));
        match self.write_dead_letter(&dead_letter_path, &failure.records).await {
            Ok(()) => info!(
                path = %dead_letter_path.display(),
                records = failure.records.len(),
                "Dead-lettered rejected batch"
            ),
            Err(e) => {
                error!(path = %dead_letter_path.display(), error = %e, "Failed to write dead letter")
            },
        }
    }

    async fn run_completed(&self, summary: &RunSummary) {
        let path = self.path_for("log", Local::now(), ".txt");
        if let Err(e) = self.write(&path, summary.artifact_text()).await {
            error!(path = %path.display(), error = %e, "Failed to write run summary artifact");
        }
    }
}

#[derive(Debug, Default)]
struct Recorded {
    failures: Vec<BatchFailure>,
    summaries: Vec<RunSummary>,
}

/// Keeps every event in memory; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<BatchFailure> {
        self.lock().failures.clone()
    }

    pub fn summaries(&self) -> Vec<RunSummary> {
        self.lock().summaries.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RunSink for RecordingSink {
    async fn batch_failed(&self, failure: &BatchFailure) {
        self.lock().failures.push(failure.clone());
    }

    async fn run_completed(&self, summary: &RunSummary) {
        self.lock().summaries.push(summary.clone());
    }
}
