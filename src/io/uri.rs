use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use url::Url;

/// Represents a parsed source URI
#[derive(Debug, Clone)]
pub enum SourceUri {
    Local(PathBuf),
    Remote(Url),
}

impl SourceUri {
    /// Parse a URI string into a SourceUri
    pub fn parse(uri: &str) -> Result<Self> {
        // Try parsing as URL first
        if let Ok(url) = Url::parse(uri) {
            match url.scheme() {
                "http" | "https" => {
                    if url.host_str().is_none() {
                        return Err(anyhow!("URL missing host: {}", uri));
                    }
                    Ok(SourceUri::Remote(url))
                }
                "file" => {
                    let path = url
                        .to_file_path()
                        .map_err(|_| anyhow!("Invalid file:// URI: {}", uri))?;
                    Ok(SourceUri::Local(path))
                }
                // Windows drive letters parse as a one-letter scheme
                scheme if scheme.len() == 1 => Ok(SourceUri::Local(PathBuf::from(uri))),
                scheme => Err(anyhow!("Unsupported URI scheme: {}", scheme)),
            }
        } else {
            // Treat as local file path
            Ok(SourceUri::Local(PathBuf::from(uri)))
        }
    }

    /// Name of the file this source resolves to on disk
    ///
    /// For remote sources this is the last path segment of the URL, which is
    /// also the name the download is cached under.
    pub fn file_name(&self) -> Result<String> {
        match self {
            SourceUri::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| anyhow!("Path has no file name: {}", path.display())),
            SourceUri::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|name| !name.is_empty())
                .map(|name| name.to_string())
                .ok_or_else(|| anyhow!("URL has no file name to cache under: {}", url)),
        }
    }

    /// Where this source lives (or will live) once fetched into `data_dir`
    pub fn local_path(&self, data_dir: &Path) -> Result<PathBuf> {
        match self {
            SourceUri::Local(path) => Ok(path.clone()),
            SourceUri::Remote(_) => Ok(data_dir.join(self.file_name()?)),
        }
    }
}
