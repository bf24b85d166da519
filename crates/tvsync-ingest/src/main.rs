//! tvsync-ingest - resumable document ingestion tool

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tvsync_common::logging::{init_logging, LogConfig, LogLevel};
use tvsync_ingest::config::IngestConfig;
use tvsync_ingest::driver::IngestionDriver;
use tvsync_ingest::fetcher::HttpFetcher;
use tvsync_ingest::replay::replay_dead_letter;
use tvsync_ingest::sink::ArtifactSink;
use tvsync_ingest::store::{DbConfig, Deduplicator, PgRecordStore, RecordStore};

#[derive(Parser, Debug)]
#[command(name = "tvsync-ingest")]
#[command(author, version, about = "Resumable batched ingestion of remote documents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch ids from the resumption point to the configured total (default)
    Run(RunArgs),

    /// Show the resumption point and the current document count
    Status,

    /// Remove duplicate documents from the store
    Dedup,

    /// Re-insert the records of a dead letter file
    Replay {
        /// Path to a dead_letter_*.jsonl file
        #[arg(short, long)]
        file: PathBuf,

        /// Records per insert
        #[arg(long, default_value_t = 100)]
        chunk_size: usize,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Start from this id instead of the resumption point
    #[arg(long)]
    start_id: Option<i64>,

    /// Inclusive upper bound of the scan
    #[arg(long, env = "TVSYNC_TOTAL")]
    total: Option<i64>,

    /// Ids per committed batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Directory for summary, error and dead letter files
    #[arg(long)]
    artifact_dir: Option<PathBuf>,

    /// Skip the duplicate removal pass at the end of the run
    #[arg(long)]
    skip_dedup: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("tvsync-ingest")
        .filter_directives("sqlx=warn,hyper=info,reqwest=info")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run(args).await?,
        Command::Status => status().await?,
        Command::Dedup => {
            let store = connect(&DbConfig::from_env()?).await?;
            let removed = store.remove_duplicates().await?;
            info!(removed, "Removed {} duplicate documents", removed);
        },
        Command::Replay { file, chunk_size } => {
            let store = connect(&DbConfig::from_env()?).await?;
            replay_dead_letter(&store, &file, chunk_size).await?;
        },
    }

    Ok(())
}

async fn connect(config: &DbConfig) -> Result<PgRecordStore> {
    let store = PgRecordStore::connect(config)
        .await
        .context("Failed to connect to the record store")?;
    store.migrate().await?;
    Ok(store)
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = IngestConfig::load_env()?;

    if args.start_id.is_some() {
        config.start_id = args.start_id;
    }
    if let Some(total) = args.total {
        config.total = total;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(dir) = args.artifact_dir {
        config.artifact_dir = dir;
    }
    config.skip_dedup |= args.skip_dedup;
    config.validate()?;

    let store = connect(&config.database).await?;
    let fetcher = HttpFetcher::new(&config.api).context("Failed to build HTTP client")?;

    let mut driver = IngestionDriver::new(fetcher, store.clone(), config.driver_options())
        .with_sink(Arc::new(ArtifactSink::new(&config.artifact_dir)));
    if !config.skip_dedup {
        driver = driver.with_deduplicator(Arc::new(store));
    }

    info!(
        total = driver.options().end_id,
        batch_size = driver.options().batch_size,
        "Starting ingestion"
    );
    driver.run().await?;

    Ok(())
}

async fn status() -> Result<()> {
    let store = connect(&DbConfig::from_env()?).await?;
    let count = store.count().await?;
    let last_id = store.find_max_id().await?;

    info!(
        last_id = last_id.unwrap_or(0),
        total = count,
        "Last ID fetched: {}, total data: {}",
        last_id.unwrap_or(0),
        count
    );
    Ok(())
}
