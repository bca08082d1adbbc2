//! File format parsers and readers

pub mod delimited;
pub mod parquet;
pub mod preview;
pub mod reader;

pub use reader::{Format, Record, TableReader, open_reader};
