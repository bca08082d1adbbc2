//! Fetches remote source files into the local data directory.
//!
//! Files are cached by name: a file that already exists in the data directory
//! is used as-is and never downloaded again.

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use super::uri::SourceUri;
use crate::config::{PARTIAL_DOWNLOAD_SUFFIX, USER_AGENT};

/// What happened when a source was fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Source is a local file, read in place
    Local(PathBuf),
    /// Remote file was found in the data directory from an earlier run
    AlreadyPresent(PathBuf),
    /// Remote file was downloaded during this run
    Downloaded { path: PathBuf, bytes: u64 },
}

impl FetchOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FetchOutcome::Local(path) | FetchOutcome::AlreadyPresent(path) => path,
            FetchOutcome::Downloaded { path, .. } => path,
        }
    }

    pub fn was_downloaded(&self) -> bool {
        matches!(self, FetchOutcome::Downloaded { .. })
    }
}

/// Downloads remote files over HTTP(S)
pub struct Downloader {
    client: Client,
    quiet: bool,
}

impl Downloader {
    pub fn new(quiet: bool) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, quiet })
    }

    /// Make `source` available on local disk, downloading it into `data_dir`
    /// unless a file of the same name is already there
    pub async fn fetch(&self, source: &SourceUri, data_dir: &Path) -> Result<FetchOutcome> {
        match source {
            SourceUri::Local(path) => {
                let exists = fs::try_exists(path)
                    .await
                    .with_context(|| format!("Failed to check source file {}", path.display()))?;
                if !exists {
                    return Err(anyhow!("Source file not found: {}", path.display()));
                }
                Ok(FetchOutcome::Local(path.clone()))
            }
            SourceUri::Remote(url) => {
                let file_name = source.file_name()?;
                let destination = source.local_path(data_dir)?;

                let cached = fs::try_exists(&destination).await.with_context(|| {
                    format!("Failed to check for cached file {}", destination.display())
                })?;
                if cached {
                    self.say(format!("File {} already exists", file_name));
                    info!(path = %destination.display(), "using cached download");
                    return Ok(FetchOutcome::AlreadyPresent(destination));
                }

                self.say(format!("Downloading {}...", file_name));
                let bytes = self
                    .download(url, data_dir, &file_name, &destination)
                    .await
                    .with_context(|| format!("Failed to download {}", url))?;
                self.say("Download complete");

                Ok(FetchOutcome::Downloaded {
                    path: destination,
                    bytes,
                })
            }
        }
    }

    /// Stream the body of `url` into `destination`
    ///
    /// The body is written to a `.part` file first and renamed once complete, so
    /// an interrupted download never masquerades as a cached file.
    async fn download(
        &self,
        url: &Url,
        data_dir: &Path,
        file_name: &str,
        destination: &Path,
    ) -> Result<u64> {
        fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .context("Download request failed")?
            .error_for_status()
            .context("Server rejected download request")?;

        let total_bytes = response.content_length();
        debug!(?total_bytes, %url, "download started");

        let progress = self.progress_bar(total_bytes);
        let partial_path = data_dir.join(format!("{}.{}", file_name, PARTIAL_DOWNLOAD_SUFFIX));

        let written = write_body(response, &partial_path, progress.as_ref()).await;
        if let Some(bar) = &progress {
            bar.finish_and_clear();
        }
        let written = match written {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&partial_path).await;
                return Err(e);
            }
        };

        fs::rename(&partial_path, destination)
            .await
            .with_context(|| format!("Failed to move download into {}", destination.display()))?;

        info!(bytes = written, path = %destination.display(), "download finished");

        Ok(written)
    }

    fn progress_bar(&self, total_bytes: Option<u64>) -> Option<ProgressBar> {
        if self.quiet {
            return None;
        }

        let bar = match total_bytes {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("[{elapsed_precise}] Bytes: [{bar:30.yellow/blue}] {bytes}/{total_bytes} ({percent}%) | {bytes_per_sec}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=>-"),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::default_spinner()
                        .template("[{elapsed_precise}] {spinner} {bytes} | {bytes_per_sec}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        };
        Some(bar)
    }

    fn say(&self, message: impl AsRef<str>) {
        if !self.quiet {
            println!("{}", message.as_ref());
        }
    }
}

/// Stream a response body into `path`, returning the number of bytes written
async fn write_body(
    response: reqwest::Response,
    path: &Path,
    progress: Option<&ProgressBar>,
) -> Result<u64> {
    let mut file = File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Failed to read response body")?;
        file.write_all(&chunk)
            .await
            .context("Failed to write downloaded data")?;
        written += chunk.len() as u64;
        if let Some(bar) = progress {
            bar.set_position(written);
        }
    }

    file.flush().await.context("Failed to flush downloaded data")?;
    Ok(written)
}
