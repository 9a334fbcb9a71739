//! Download a source document into its workspace.
//!
//! The body is streamed chunk by chunk into the destination file so large
//! documents never sit fully in memory. The status line is checked before a
//! single byte is written. When the platform reported the attachment size,
//! a body of any other length is a failed download. Any failure after the
//! file was created removes the partial file before the error propagates.

use crate::error::JobError;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Build the HTTP client shared by every job of a pipeline.
pub fn build_client(timeout_secs: u64) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

/// Stream `url` into `dest`. Returns the number of bytes written.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    expected_len: Option<u64>,
    timeout_secs: u64,
) -> Result<u64, JobError> {
    info!("Downloading {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| transport_error(url, timeout_secs, &e))?;

    let status = response.status();
    if !status.is_success() {
        warn!("Download of {} failed with status {}", url, status);
        return Err(JobError::DownloadStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    match write_body(response, dest, url, expected_len, timeout_secs).await {
        Ok(bytes) => {
            info!("Downloaded {} bytes to {}", bytes, dest.display());
            Ok(bytes)
        }
        Err(e) => {
            if let Err(unlink) = tokio::fs::remove_file(dest).await {
                if unlink.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        "Failed to delete partial download {}: {}",
                        dest.display(),
                        unlink
                    );
                }
            }
            Err(e)
        }
    }
}

async fn write_body(
    response: reqwest::Response,
    dest: &Path,
    url: &str,
    expected_len: Option<u64>,
    timeout_secs: u64,
) -> Result<u64, JobError> {
    let write_err = |e: std::io::Error| JobError::DownloadFailed {
        url: url.to_string(),
        reason: format!("writing {}: {}", dest.display(), e),
    };

    let mut file = File::create(dest).await.map_err(write_err)?;
    let mut body = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| transport_error(url, timeout_secs, &e))?;
        file.write_all(&chunk).await.map_err(write_err)?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(write_err)?;
    if let Some(expected) = expected_len.filter(|&n| n != written) {
        return Err(JobError::DownloadFailed {
            url: url.to_string(),
            reason: format!("expected {expected} bytes, received {written}"),
        });
    }
    file.sync_all().await.map_err(write_err)?;
    debug!("Closed {} after {} bytes", dest.display(), written);
    Ok(written)
}

fn transport_error(url: &str, timeout_secs: u64, e: &reqwest::Error) -> JobError {
    if e.is_timeout() {
        JobError::DownloadTimeout {
            url: url.to_string(),
            secs: timeout_secs,
        }
    } else {
        JobError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}
