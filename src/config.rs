//! Configuration constants for the ingester
//!
//! This module centralizes the tunable parameters and constants used throughout
//! the application.

use std::time::Duration;

// ============================================================================
// Connection Configuration
// ============================================================================

/// How long to wait for the database connection before giving up
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// PostgreSQL caps a single statement at 65535 bind parameters
pub const POSTGRES_MAX_BIND_PARAMS: usize = 65_535;

/// SQLite's default SQLITE_MAX_VARIABLE_NUMBER (3.32+)
#[cfg(test)]
pub const SQLITE_MAX_BIND_PARAMS: usize = 32_766;

// ============================================================================
// Ingestion Configuration
// ============================================================================

/// Rows per chunk when the caller does not choose one
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Number of rows printed when previewing a source file
pub const PREVIEW_ROWS: usize = 5;

/// Longest cell value shown in previews and error samples before truncation
pub const PREVIEW_CELL_WIDTH: usize = 20;

// ============================================================================
// Download Configuration
// ============================================================================

/// Where the NYC TLC publishes its monthly trip record files
pub const DEFAULT_URL_PREFIX: &str = "https://d37ci6vzurychx.cloudfront.net/trip-data";

pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Suffix for files that are still being downloaded
pub const PARTIAL_DOWNLOAD_SUFFIX: &str = "part";
