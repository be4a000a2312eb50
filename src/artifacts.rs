//! Downloading files attached to conference events

use crate::config::ClientConfig;
use crate::protocol::FileDescriptor;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use url::Url;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Invalid download URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Refusing to save file with unusable name {0:?}")]
    UnsafeFileName(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Download of {url} failed with status {status}")]
    Status {
        url: Url,
        status: reqwest::StatusCode,
    },
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fetches [`FileDescriptor`]s from the conference server's HTTP side
#[derive(Debug, Clone)]
pub struct ArtifactDownloader {
    client: reqwest::Client,
    base: Url,
}

impl ArtifactDownloader {
    pub fn new(http_url: &str) -> Result<Self, DownloadError> {
        let base = Url::parse(http_url).map_err(|source| DownloadError::InvalidUrl {
            url: http_url.to_string(),
            source,
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self { client, base })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, DownloadError> {
        Self::new(&config.http_url)
    }

    /// Absolute URL of a file; relative download paths resolve against the HTTP base
    pub fn resolve(&self, file: &FileDescriptor) -> Result<Url, DownloadError> {
        self.base
            .join(&file.download_url)
            .map_err(|source| DownloadError::InvalidUrl {
                url: file.download_url.clone(),
                source,
            })
    }

    /// Download `file` into `dir`, returning the path written
    pub async fn download(&self, file: &FileDescriptor, dir: &Path) -> Result<PathBuf, DownloadError> {
        let name = safe_file_name(&file.filename)
            .ok_or_else(|| DownloadError::UnsafeFileName(file.filename.clone()))?;
        let url = self.resolve(file)?;

        tracing::info!(url = %url, filename = %name, size = ?file.size, "Downloading artifact");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status { url, status });
        }

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| io_error(dir, source))?;

        // Partial downloads never appear under the final name
        let target = dir.join(name);
        let partial = dir.join(format!(".{name}.part"));
        let mut out = tokio::fs::File::create(&partial)
            .await
            .map_err(|source| io_error(&partial, source))?;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&partial).await;
                    return Err(e.into());
                }
            };
            out.write_all(&chunk)
                .await
                .map_err(|source| io_error(&partial, source))?;
        }
        out.flush()
            .await
            .map_err(|source| io_error(&partial, source))?;
        drop(out);

        tokio::fs::rename(&partial, &target)
            .await
            .map_err(|source| io_error(&target, source))?;

        tracing::debug!(path = %target.display(), "Artifact saved");
        Ok(target)
    }
}

/// Write `contents` to `dir` under the final component of `filename`
pub async fn save_artifact(
    dir: &Path,
    filename: &str,
    contents: &[u8],
) -> Result<PathBuf, DownloadError> {
    let name =
        safe_file_name(filename).ok_or_else(|| DownloadError::UnsafeFileName(filename.to_string()))?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| io_error(dir, source))?;

    let target = dir.join(name);
    tokio::fs::write(&target, contents)
        .await
        .map_err(|source| io_error(&target, source))?;
    Ok(target)
}

/// Final path component of a server-supplied name; `None` if nothing usable is left
pub fn safe_file_name(name: &str) -> Option<&str> {
    // Servers may send either separator
    let last = name.rsplit(['/', '\\']).next()?;
    Path::new(last)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && !n.starts_with('.'))
}

fn io_error(path: &Path, source: std::io::Error) -> DownloadError {
    DownloadError::Io {
        path: path.to_path_buf(),
        source,
    }
}
