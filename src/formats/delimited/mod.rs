//! Delimited text (CSV) support

pub mod reader;
