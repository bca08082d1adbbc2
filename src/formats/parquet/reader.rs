//! Parquet file reader implementation.

use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::StreamExt;
use parquet::arrow::async_reader::{ParquetRecordBatchStream, ParquetRecordBatchStreamBuilder};
use std::path::Path;
use std::pin::Pin;
use tokio::fs::File;
use tracing::debug;

use crate::config::PREVIEW_ROWS;
use crate::db::Schema;
use crate::formats::reader::{ChunkData, FileMetadata, Record, TableReader};

use super::conversion::{estimate_batch_size, record_batch_to_records};

/// Streams record batches of at most `chunk_size` rows from a local Parquet file
///
/// The first batch is read when the file is opened; the table schema is taken
/// from it so that it matches exactly what the first chunk will insert.
pub struct ParquetReader {
    stream: Pin<Box<ParquetRecordBatchStream<File>>>,
    pending: Option<RecordBatch>,
    schema: Schema,
    metadata: FileMetadata,
    preview: Vec<Record>,
}

impl ParquetReader {
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        let file = File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let file_size_bytes = file
            .metadata()
            .await
            .context("Failed to get file size")?
            .len();

        // Read Parquet metadata from footer
        let builder = ParquetRecordBatchStreamBuilder::new(file)
            .await
            .with_context(|| format!("Failed to read Parquet metadata from {}", path.display()))?;

        let file_metadata = builder.metadata().file_metadata();
        let total_rows = u64::try_from(file_metadata.num_rows()).unwrap_or(0);
        debug!(
            total_rows,
            row_groups = builder.metadata().num_row_groups(),
            "opened parquet file"
        );
        let file_schema = builder.schema().clone();

        let mut stream = Box::pin(
            builder
                .with_batch_size(chunk_size)
                .build()
                .context("Failed to build Parquet stream")?,
        );

        let pending = next_non_empty_batch(&mut stream).await?;

        let schema = match &pending {
            Some(batch) => Schema::from_arrow(&batch.schema()),
            None => Schema::from_arrow(&file_schema),
        }
        .with_context(|| format!("Unsupported schema in {}", path.display()))?;

        let preview = match &pending {
            Some(batch) => {
                let rows = PREVIEW_ROWS.min(batch.num_rows());
                record_batch_to_records(&batch.slice(0, rows))?
            }
            None => Vec::new(),
        };

        Ok(Self {
            stream,
            pending,
            schema,
            metadata: FileMetadata {
                file_size_bytes,
                total_rows,
            },
            preview,
        })
    }
}

/// Pull batches until one carries rows, or the stream ends
async fn next_non_empty_batch(
    stream: &mut Pin<Box<ParquetRecordBatchStream<File>>>,
) -> Result<Option<RecordBatch>> {
    while let Some(batch_result) = stream.next().await {
        let batch = batch_result.context("Failed to read record batch")?;
        if batch.num_rows() > 0 {
            return Ok(Some(batch));
        }
    }
    Ok(None)
}

#[async_trait]
impl TableReader for ParquetReader {
    fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn preview(&self) -> &[Record] {
        &self.preview
    }

    async fn next_chunk(&mut self) -> Result<Option<ChunkData>> {
        let batch = match self.pending.take() {
            Some(batch) => batch,
            None => match next_non_empty_batch(&mut self.stream).await? {
                Some(batch) => batch,
                None => return Ok(None),
            },
        };

        // Arrow doesn't expose bytes read, so the decoded size stands in
        let bytes_read = estimate_batch_size(&batch);
        let records =
            record_batch_to_records(&batch).context("Failed to convert RecordBatch to Records")?;

        Ok(Some(ChunkData {
            records,
            bytes_read,
        }))
    }
}
