//! Archive fetching.
//!
//! [`ArchiveFetcher`] streams a remote archive into a local file.
//! [`verify_archive_size`] is the truncation guard the package manager
//! applies to every fetched archive. It is a size heuristic, not an
//! integrity check: no checksum is compared.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{CnshError, Result};

/// Downloader for package archives.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Download `url` to `dest`, replacing any existing file.
    ///
    /// `name` is the package the archive belongs to, used in errors.
    /// Returns the number of bytes written.
    async fn fetch(&self, name: &str, url: &str, dest: &Path) -> Result<u64>;
}

/// HTTP implementation of [`ArchiveFetcher`] that streams the body to disk.
#[derive(Clone)]
pub struct HttpArchiveFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl std::fmt::Debug for HttpArchiveFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpArchiveFetcher")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpArchiveFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cnsh/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CnshError::Download {
                name: String::new(),
                detail: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    async fn fetch(&self, name: &str, url: &str, dest: &Path) -> Result<u64> {
        let fail = |detail: String| CnshError::Download {
            name: name.to_string(),
            detail,
        };

        debug!(package = name, url = url, "Downloading archive");
        let response = self.client.get(url).send().await.map_err(|e| {
            warn!(package = name, url = url, error = %e, "Archive request failed");
            if e.is_timeout() {
                fail(format!("request timed out after {}s", self.timeout.as_secs()))
            } else {
                fail(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(fail(format!("HTTP {} from {url}", response.status())));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| CnshError::io(dest, e))?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| fail(format!("transfer interrupted: {e}")))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| CnshError::io(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| CnshError::io(dest, e))?;

        debug!(package = name, bytes = written, "Archive downloaded");
        Ok(written)
    }
}

/// Reject an archive on disk that is smaller than `min_bytes`.
///
/// Returns the archive size on success.
pub fn verify_archive_size(name: &str, archive: &Path, min_bytes: u64) -> Result<u64> {
    let size = std::fs::metadata(archive)
        .map_err(|e| CnshError::io(archive, e))?
        .len();
    if size < min_bytes {
        return Err(CnshError::Download {
            name: name.to_string(),
            detail: format!(
                "downloaded archive is too small ({size} bytes, expected at least {min_bytes}); \
                 the transfer was probably truncated"
            ),
        });
    }
    Ok(size)
}
