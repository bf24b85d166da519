//! tvsync Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Resumable, batched ingestion of documents addressed by sequential numeric
//! ids into a document store.
//!
//! # Components
//!
//! - [`fetcher`]: one HTTP GET per id, classified as found / no data / failed
//! - [`batch`]: buffers records and commits them in bulk
//! - [`driver`]: resumes from the highest stored id and drives the scan
//! - [`store`]: the document store (PostgreSQL or in-memory) and dedup pass
//! - [`sink`]: failure events and run artifacts
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tvsync_ingest::config::IngestConfig;
//! use tvsync_ingest::driver::IngestionDriver;
//! use tvsync_ingest::fetcher::HttpFetcher;
//! use tvsync_ingest::sink::ArtifactSink;
//! use tvsync_ingest::store::PgRecordStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let store = PgRecordStore::connect(&config.database).await?;
//!     store.migrate().await?;
//!
//!     let driver = IngestionDriver::new(HttpFetcher::new(&config.api)?, store.clone(), config.driver_options())
//!         .with_sink(Arc::new(ArtifactSink::new(&config.artifact_dir)))
//!         .with_deduplicator(Arc::new(store));
//!
//!     let summary = driver.run().await?;
//!     tracing::info!(new_records = summary.new_records, "done");
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod driver;
pub mod fetcher;
pub mod replay;
pub mod sink;
pub mod store;
pub mod summary;
pub mod types;

pub use driver::{DriverOptions, IngestionDriver, ResumePoint};
pub use fetcher::{FetchOutcome, HttpFetcher, RecordFetcher};
pub use store::{Deduplicator, RecordStore, StoreError, StoreResult};
pub use summary::RunSummary;
pub use types::Record;
