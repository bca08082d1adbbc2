use anyhow::{Context, Result};
use indicatif::{HumanBytes, HumanCount};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::loader::ChunkLoader;
use crate::db::Pool;
use crate::formats::TableReader;
use crate::formats::preview::{format_column_types, format_preview};
use crate::telemetry::{ProgressReporter, TelemetryEvent};

/// Wall time spent committing one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkTiming {
    pub chunk: usize,
    pub rows: u64,
    pub duration: Duration,
}

/// Outcome of draining a reader into a table
#[derive(Debug)]
pub struct IngestSummary {
    pub rows_loaded: u64,
    pub chunks: usize,
    pub chunk_timings: Vec<ChunkTiming>,
}

/// Copies every chunk of a reader into a freshly created table
pub struct Ingester {
    pool: Pool,
    table_name: String,
    quiet: bool,
}

impl Ingester {
    pub fn new(pool: Pool, table_name: impl Into<String>, quiet: bool) -> Self {
        Self {
            pool,
            table_name: table_name.into(),
            quiet,
        }
    }

    /// Describe the source, replace the table and load it chunk by chunk
    pub async fn run(&self, reader: &mut dyn TableReader) -> Result<IngestSummary> {
        let mut reporter = ProgressReporter::new(self.quiet);
        let total_rows = reader.metadata().total_rows;
        let schema = reader.schema().clone();

        reporter.message(format!(
            "Total rows: {} ({})",
            HumanCount(total_rows),
            HumanBytes(reader.metadata().file_size_bytes)
        ));
        reporter.message(format!(
            "\nFirst rows:\n{}",
            format_preview(&schema, reader.preview())
        ));
        reporter.message(format!("Column types:\n{}", format_column_types(&schema)));

        reporter.message(format!("Creating table {}", self.table_name));
        self.pool
            .replace_table(&self.table_name, &schema)
            .await
            .with_context(|| format!("Failed to create table '{}'", self.table_name))?;
        info!(
            table = self.table_name.as_str(),
            columns = schema.columns.len(),
            "table created"
        );
        reporter.message(format!("Table {} created", self.table_name));

        let loader = ChunkLoader::new(self.pool.clone(), self.table_name.clone(), schema.clone())?;
        let mut chunk_timings = Vec::new();
        let mut chunk_idx = 0;

        reporter.start(total_rows);
        while let Some(chunk) = reader
            .next_chunk()
            .await
            .with_context(|| format!("Failed to read chunk {}", chunk_idx + 1))?
        {
            chunk_idx += 1;
            if chunk_idx == 1 {
                reporter.message(format!(
                    "First chunk shape: ({}, {})",
                    chunk.records.len(),
                    schema.columns.len()
                ));
            }

            let start = Instant::now();
            let rows = loader
                .load(&chunk.records)
                .await
                .with_context(|| format!("Failed to load chunk {}", chunk_idx))?;
            let duration = start.elapsed();

            reporter.message(format!(
                "Chunk {}: {} rows in {:.2}s",
                chunk_idx,
                rows,
                duration.as_secs_f64()
            ));
            reporter.record(TelemetryEvent::ChunkLoaded {
                rows,
                bytes: chunk.bytes_read,
                duration_ms: duration.as_millis() as u64,
            });
            chunk_timings.push(ChunkTiming {
                chunk: chunk_idx,
                rows,
                duration,
            });
        }

        let rows_loaded = reporter.stats().rows_loaded;
        let table_rows = self
            .pool
            .count_rows(&self.table_name)
            .await
            .with_context(|| format!("Failed to count rows in '{}'", self.table_name))?;
        if table_rows != total_rows as i64 {
            warn!(
                expected = total_rows,
                in_table = table_rows,
                "row count differs from file metadata"
            );
        }

        reporter.message(format!(
            "Done ingesting {} rows into {}",
            HumanCount(rows_loaded),
            self.table_name
        ));
        reporter.finish();

        Ok(IngestSummary {
            rows_loaded,
            chunks: chunk_idx,
            chunk_timings,
        })
    }
}
