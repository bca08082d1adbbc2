use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

use super::delimited::reader::CsvReader;
use super::parquet::ParquetReader;
use crate::db::Schema;

/// Metadata about a file to be loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub file_size_bytes: u64,
    pub total_rows: u64,
}

/// A single record (row) from the file
///
/// Every value is carried as text; `None` is NULL, which is distinct from an
/// empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub fields: Vec<Option<String>>,
}

impl Record {
    /// Field `idx` as text, `None` when it is NULL or out of range
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.fields.get(idx).and_then(|f| f.as_deref())
    }
}

/// One chunk of rows handed to the database in a single bulk insert
#[derive(Debug)]
pub struct ChunkData {
    pub records: Vec<Record>,
    pub bytes_read: u64,
}

/// Trait for reading different file formats as a sequence of row chunks
///
/// The schema and preview describe the first chunk and are available as soon
/// as the reader is opened.
#[async_trait]
pub trait TableReader: Send {
    /// Get metadata about the file
    fn metadata(&self) -> &FileMetadata;

    /// Column names and SQL types the destination table is created with
    fn schema(&self) -> &Schema;

    /// The first few rows of the file
    fn preview(&self) -> &[Record];

    /// Read the next chunk, or `None` once the file is exhausted
    async fn next_chunk(&mut self) -> Result<Option<ChunkData>>;
}

/// Configuration for delimited file reading
#[derive(Debug, Clone)]
pub struct DelimitedConfig {
    pub delimiter: u8,
    pub has_header: bool,
    pub quote: u8,
}

impl Default for DelimitedConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            quote: b'"',
        }
    }
}

impl DelimitedConfig {
    pub fn csv() -> Self {
        Self::default()
    }
}

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Parquet,
}

impl Format {
    /// Auto-detect file format from a file name or path
    pub fn detect(path: &str) -> Option<Self> {
        let lower = path.to_lowercase();

        if lower.ends_with(".csv") {
            Some(Format::Csv)
        } else if lower.ends_with(".parquet") {
            Some(Format::Parquet)
        } else {
            None
        }
    }
}

/// Open a reader for a local file in the given format
pub async fn open_reader(
    path: &Path,
    format: Format,
    chunk_size: usize,
) -> Result<Box<dyn TableReader>> {
    match format {
        Format::Csv => {
            let reader = CsvReader::open(path, DelimitedConfig::csv(), chunk_size).await?;
            Ok(Box::new(reader))
        }
        Format::Parquet => {
            let reader = ParquetReader::open(path, chunk_size).await?;
            Ok(Box::new(reader))
        }
    }
}
