//! Parquet file format support.
//!
//! Record batches are streamed from the file one chunk at a time and
//! flattened into text records before they are handed to the loader.

mod conversion;
mod reader;

pub use reader::ParquetReader;
