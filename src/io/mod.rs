//! Source resolution and download layer

pub mod download;
pub mod uri;

pub use download::{Downloader, FetchOutcome};
pub use uri::SourceUri;
