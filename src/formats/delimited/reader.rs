use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;

use crate::config::PREVIEW_ROWS;
use crate::db::{Schema, SchemaInferrer};
use crate::formats::reader::{ChunkData, DelimitedConfig, FileMetadata, Record, TableReader};

/// Delimited file reader
///
/// The whole file is parsed up front so column types can be inferred from
/// every row; chunks are then drained from the parsed records in order.
pub struct CsvReader {
    schema: Schema,
    metadata: FileMetadata,
    preview: Vec<Record>,
    records: VecDeque<Record>,
    chunk_size: usize,
}

impl CsvReader {
    pub async fn open(path: &Path, config: DelimitedConfig, chunk_size: usize) -> Result<Self> {
        let buffer = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        if buffer.is_empty() {
            bail!("{} is empty", path.display());
        }

        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(config.delimiter)
            .quote(config.quote)
            .has_headers(config.has_header)
            .from_reader(buffer.as_slice());

        let raw_header: Vec<String> = if config.has_header {
            csv_reader
                .headers()
                .context("Failed to parse CSV header")?
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            Vec::new()
        };

        let mut records = Vec::new();
        for (idx, result) in csv_reader.records().enumerate() {
            let record = result.with_context(|| format!("Failed to parse CSV record {}", idx + 1))?;

            // An empty field is a missing value
            records.push(Record {
                fields: record
                    .iter()
                    .map(|s| (!s.is_empty()).then(|| s.to_string()))
                    .collect(),
            });
        }

        let header = if config.has_header {
            normalize_header(raw_header)
        } else {
            let width = records.first().map_or(0, |r| r.fields.len());
            (1..=width).map(|i| format!("column_{}", i)).collect()
        };

        let schema = SchemaInferrer::infer_from_records(&header, &records)
            .with_context(|| format!("Failed to infer schema for {}", path.display()))?;

        let metadata = FileMetadata {
            file_size_bytes: buffer.len() as u64,
            total_rows: records.len() as u64,
        };
        let preview = records.iter().take(PREVIEW_ROWS).cloned().collect();

        Ok(Self {
            schema,
            metadata,
            preview,
            records: VecDeque::from(records),
            chunk_size,
        })
    }
}

/// Fill in blank column names and disambiguate repeated ones
///
/// A blank name at position `i` becomes `Unnamed: i`; the second `x` becomes
/// `x.1`, the third `x.2` and so on.
fn normalize_header(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    raw.into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let base = if name.trim().is_empty() {
                format!("Unnamed: {}", idx)
            } else {
                name
            };

            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{}.{}", base, count)
            };
            *count += 1;
            name
        })
        .collect()
}

#[async_trait]
impl TableReader for CsvReader {
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
        if self.records.is_empty() {
            return Ok(None);
        }

        let take = self.chunk_size.min(self.records.len());
        let records: Vec<Record> = self.records.drain(..take).collect();

        // Apportion the file size by row count
        let bytes_read = if self.metadata.total_rows == 0 {
            0
        } else {
            self.metadata.file_size_bytes * records.len() as u64 / self.metadata.total_rows
        };

        Ok(Some(ChunkData {
            records,
            bytes_read,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::SqlType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[tokio::test]
    async fn test_reads_in_chunks() {
        let mut csv = String::from("LocationID,Borough,Zone\n");
        for i in 1..=7 {
            csv.push_str(&format!("{},Queens,Zone {}\n", i, i));
        }
        let temp_file = write_csv(&csv);

        let mut reader = CsvReader::open(temp_file.path(), DelimitedConfig::csv(), 3)
            .await
            .unwrap();

        assert_eq!(reader.metadata().total_rows, 7);
        assert_eq!(reader.preview().len(), PREVIEW_ROWS);
        assert_eq!(
            reader.schema().column_names(),
            vec!["LocationID", "Borough", "Zone"]
        );
        assert_eq!(reader.schema().columns[0].sql_type, SqlType::BigInt);

        let mut sizes = Vec::new();
        let mut total_bytes = 0;
        while let Some(chunk) = reader.next_chunk().await.unwrap() {
            sizes.push(chunk.records.len());
            total_bytes += chunk.bytes_read;
        }
        assert_eq!(sizes, vec![3, 3, 1]);
        assert!(total_bytes <= reader.metadata().file_size_bytes);
    }

    #[tokio::test]
    async fn test_types_inferred_over_all_rows() {
        // The last row turns an integer column into a float column
        let temp_file = write_csv("id,fare\n1,10\n2,12\n3,7.5\n");

        let reader = CsvReader::open(temp_file.path(), DelimitedConfig::csv(), 1)
            .await
            .unwrap();

        assert_eq!(
            reader.schema().columns[1].sql_type,
            SqlType::DoublePrecision
        );
    }

    #[tokio::test]
    async fn test_quoted_fields() {
        let temp_file = write_csv("id,zone\n1,\"Newark, Airport\"\n2,\"Say \"\"hi\"\"\"\n");

        let mut reader = CsvReader::open(temp_file.path(), DelimitedConfig::csv(), 10)
            .await
            .unwrap();

        let chunk = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(chunk.records[0].get(1), Some("Newark, Airport"));
        assert_eq!(chunk.records[1].get(1), Some("Say \"hi\""));
    }

    #[tokio::test]
    async fn test_empty_fields_are_null() {
        let temp_file = write_csv("id,zone,service_zone
1,,Airports
2,\"\",
");

        let mut reader = CsvReader::open(temp_file.path(), DelimitedConfig::csv(), 10)
            .await
            .unwrap();

        let chunk = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(
            chunk.records[0].fields,
            vec![Some("1".to_string()), None, Some("Airports".to_string())]
        );
        assert_eq!(chunk.records[1].get(1), None);
        assert_eq!(chunk.records[1].get(2), None);
        assert!(reader.schema().columns[1].nullable);
    }

    #[tokio::test]
    async fn test_header_only_file() {
        let temp_file = write_csv("LocationID,Borough\n");

        let mut reader = CsvReader::open(temp_file.path(), DelimitedConfig::csv(), 10)
            .await
            .unwrap();

        assert_eq!(reader.metadata().total_rows, 0);
        assert_eq!(reader.schema().columns.len(), 2);
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_file_is_an_error() {
        let temp_file = write_csv("");
        let result = CsvReader::open(temp_file.path(), DelimitedConfig::csv(), 10).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ragged_rows_are_an_error() {
        let temp_file = write_csv("a,b\n1,2\n3,4,5\n");
        let result = CsvReader::open(temp_file.path(), DelimitedConfig::csv(), 10).await;

        let err = result.err().unwrap();
        assert!(format!("{:#}", err).contains("record 2"));
    }

    #[tokio::test]
    async fn test_headerless_file_gets_generated_names() {
        let temp_file = write_csv("1,x\n2,y\n");
        let config = DelimitedConfig {
            has_header: false,
            ..DelimitedConfig::csv()
        };

        let reader = CsvReader::open(temp_file.path(), config, 10).await.unwrap();
        assert_eq!(reader.schema().column_names(), vec!["column_1", "column_2"]);
        assert_eq!(reader.metadata().total_rows, 2);
    }

    #[test]
    fn test_normalize_header() {
        let header = vec![
            "id".to_string(),
            "".to_string(),
            "id".to_string(),
            "id".to_string(),
        ];
        assert_eq!(
            normalize_header(header),
            vec!["id", "Unnamed: 1", "id.1", "id.2"]
        );
    }
}
