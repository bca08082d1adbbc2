//! Table creation and chunked loading

pub mod ingester;
pub mod loader;

pub use ingester::{ChunkTiming, Ingester};
