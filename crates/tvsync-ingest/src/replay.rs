//! Dead-letter replay
//!
//! Re-inserts the records of a `dead_letter_*.jsonl` file written by
//! [`ArtifactSink`](crate::sink::ArtifactSink). Unlike the ingestion loop,
//! replay is an operator action and stops at the first rejected chunk.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;
use tvsync_common::TvsyncError;

use crate::store::RecordStore;
use crate::types::Record;

/// Parse a JSON-lines dead-letter file; blank lines are skipped
pub async fn read_dead_letter(path: &Path) -> tvsync_common::Result<Vec<Record>> {
    let contents = tokio::fs::read_to_string(path).await?;

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<Record>(line).map_err(|e| {
                TvsyncError::invalid_record(format!("{}:{}: {}", path.display(), n + 1, e))
            })
        })
        .collect()
}

/// Insert every record of `path` into `store`, `chunk_size` at a time
///
/// Returns the number of inserted documents.
pub async fn replay_dead_letter<S>(store: &S, path: &Path, chunk_size: usize) -> Result<u64>
where
    S: RecordStore + ?Sized,
{
    let records = read_dead_letter(path)
        .await
        .with_context(|| format!("Failed to read dead letter file {}", path.display()))?;
    let mut inserted = 0;

    for chunk in records.chunks(chunk_size.max(1)) {
        inserted += store
            .bulk_insert(chunk)
            .await
            .with_context(|| format!("Failed to replay {} records", chunk.len()))?;
    }

    info!(path = %path.display(), inserted, "Replayed dead letter file");
    Ok(inserted)
}
