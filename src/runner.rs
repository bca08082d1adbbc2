//! High-level runner API for taxi-ingest.
//!
//! This module wraps connection setup, download, reader selection and the
//! chunked load behind a single call. It is the API used by the CLI.

use anyhow::{Context, Result, anyhow, bail};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

use crate::db::pool::{PoolArgsBuilder, pool};
use crate::formats::open_reader;
use crate::io::{Downloader, SourceUri};
use crate::pipeline::Ingester;

pub use crate::config::{DEFAULT_CHUNK_SIZE, DEFAULT_URL_PREFIX};
pub use crate::dataset::{TaxiType, default_table_name, trip_data_url};
pub use crate::formats::Format;
pub use crate::io::FetchOutcome;
pub use crate::pipeline::ChunkTiming;

/// Arguments for running an ingestion
#[derive(Clone)]
pub struct IngestArgs {
    // Connection configuration
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,

    // Source configuration
    pub source_uri: String,
    pub target_table: String,
    /// Detected from the file name when not given
    pub format: Option<Format>,

    // Options
    pub chunk_size: usize,
    pub data_dir: PathBuf,
    pub quiet: bool,

    // Test-only: inject a pre-created pool (for SQLite testing)
    #[cfg(test)]
    pub test_pool: Option<crate::db::Pool>,
}

/// Result of a completed ingestion
#[derive(Debug)]
pub struct IngestResult {
    pub table: String,
    pub rows_loaded: u64,
    pub chunks: usize,
    pub download: FetchOutcome,
    pub duration: Duration,
    pub chunk_timings: Vec<ChunkTiming>,
}

/// Download a file if needed and load it into a freshly created table
///
/// # Example
///
/// ```no_run
/// use taxi_ingest::runner::{IngestArgs, TaxiType, default_table_name, run_ingest, trip_data_url};
///
/// # async fn example() -> anyhow::Result<()> {
/// let args = IngestArgs {
///     user: "root".to_string(),
///     password: "root".to_string(),
///     host: "localhost".to_string(),
///     port: 5432,
///     database: "ny_taxi".to_string(),
///     source_uri: trip_data_url(taxi_ingest::runner::DEFAULT_URL_PREFIX, TaxiType::Yellow, 2025, 1)?,
///     target_table: default_table_name(TaxiType::Yellow),
///     format: None,
///     chunk_size: 100_000,
///     data_dir: ".".into(),
///     quiet: true,
/// };
///
/// let result = run_ingest(args).await?;
/// println!("Loaded {} rows in {:?}", result.rows_loaded, result.duration);
/// # Ok(())
/// # }
/// ```
pub async fn run_ingest(args: IngestArgs) -> Result<IngestResult> {
    let start = Instant::now();

    if args.chunk_size == 0 {
        bail!("Chunk size must be greater than zero");
    }

    let source = SourceUri::parse(&args.source_uri)?;
    let format = match args.format {
        Some(format) => format,
        None => {
            let file_name = source.file_name()?;
            Format::detect(&file_name).ok_or_else(|| {
                anyhow!(
                    "Could not detect format from file '{}'.\n\
                     Supported extensions: .csv, .parquet",
                    file_name
                )
            })?
        }
    };

    let pool_args = PoolArgsBuilder::default()
        .host(args.host.clone())
        .port(args.port)
        .username(args.user.clone())
        .password(args.password.clone())
        .database(args.database.clone())
        .build()?;

    if !args.quiet {
        println!("Database: {}", pool_args.redacted_url());
        println!("Table: {}", args.target_table);
        println!("Source: {}", args.source_uri);
        println!();
    }

    // Create connection pool (or use test pool if provided)
    #[cfg(test)]
    let pool = match args.test_pool {
        Some(test_pool) => test_pool,
        None => pool(pool_args).await?,
    };

    #[cfg(not(test))]
    let pool = pool(pool_args).await?;

    let downloader = Downloader::new(args.quiet)?;
    let download = downloader
        .fetch(&source, &args.data_dir)
        .await
        .with_context(|| format!("Failed to fetch {}", args.source_uri))?;

    let mut reader = open_reader(download.path(), format, args.chunk_size)
        .await
        .with_context(|| format!("Failed to open {}", download.path().display()))?;

    let summary = Ingester::new(pool, args.target_table.clone(), args.quiet)
        .run(reader.as_mut())
        .await?;

    let duration = start.elapsed();
    info!(
        table = args.target_table.as_str(),
        rows = summary.rows_loaded,
        chunks = summary.chunks,
        duration_secs = duration.as_secs_f64(),
        "ingestion complete"
    );

    Ok(IngestResult {
        table: args.target_table,
        rows_loaded: summary.rows_loaded,
        chunks: summary.chunks,
        download,
        duration,
        chunk_timings: summary.chunk_timings,
    })
}
