//! Record store adapters
//!
//! The ingestion core only talks to the [`RecordStore`] and [`Deduplicator`]
//! traits. [`PgRecordStore`] is the production backend; [`MemoryRecordStore`]
//! backs tests and local experiments.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::Record;

pub mod memory;
pub mod postgres;

pub use memory::MemoryRecordStore;
pub use postgres::{create_pool, DbConfig, PgRecordStore};

/// Store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Embedded migrations could not be applied
    #[error("Database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Database configuration is invalid or missing
    #[error("Database configuration error: {0}. Check DATABASE_URL and connection settings.")]
    Config(String),

    /// The backend refused a bulk insert
    #[error("Bulk insert rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Document collection the ingestion loop writes into
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Number of documents currently stored
    async fn count(&self) -> StoreResult<u64>;

    /// Highest remote id present, `None` when the store is empty
    async fn find_max_id(&self) -> StoreResult<Option<i64>>;

    /// Insert every record in one all-or-nothing operation
    ///
    /// Returns the number of rows written. An empty slice is a no-op.
    async fn bulk_insert(&self, records: &[Record]) -> StoreResult<u64>;
}

/// Post-ingestion sweep collapsing repeated remote ids
#[async_trait]
pub trait Deduplicator: Send + Sync {
    /// Keep the first stored copy of each remote id and delete the rest.
    /// Returns how many documents were removed.
    async fn remove_duplicates(&self) -> StoreResult<u64>;
}
