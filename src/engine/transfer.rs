//! Resumable HTTP transfer of a single media file.
//!
//! Bytes are streamed into `<destination>.part` and the part file is renamed
//! onto the destination once the body is complete. A part file left behind
//! by an interrupted run is resumed with a `Range` request; if the server
//! answers with a full `200` instead, the partial bytes are discarded.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use reqwest::header::{CONTENT_RANGE, HeaderMap, RANGE};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use crate::engine::retry::{RetryPolicy, Retryable};

const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// Error types for media transfers
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Request error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP error: {0}")]
    Status(StatusCode),

    #[error("Download incomplete: {written}/{expected} bytes")]
    Incomplete { written: u64, expected: u64 },

    #[error("Invalid Content-Range header: {0}")]
    ContentRange(String),
}

impl Retryable for TransferError {
    fn is_transient(&self) -> bool {
        match self {
            TransferError::Network(e) => !e.is_builder(),
            TransferError::Io(_) => true,
            TransferError::Status(status) => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::RANGE_NOT_SATISFIABLE
            }
            TransferError::Incomplete { .. } => true,
            TransferError::ContentRange(_) => true,
        }
    }
}

/// Moves the bytes behind a media URL into a local file.
#[async_trait]
pub trait MediaTransfer: Send + Sync {
    /// Returns the final size of `destination` in bytes.
    async fn fetch_to_file(
        &self,
        url: &str,
        destination: &Path,
        title: &str,
    ) -> Result<u64, TransferError>;
}

/// Where in-flight bytes for `destination` are kept.
pub fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    destination.with_file_name(name)
}

/// Size of `path` if it is an existing, non-empty file.
pub fn existing_file_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file() && meta.len() > 0)
        .map(|meta| meta.len())
}

/// Start offset and total size from `Content-Range: bytes N-M/total`.
/// A `*` total means unknown and is reported as 0.
fn content_range(headers: &HeaderMap) -> Result<(u64, u64), TransferError> {
    let value = headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| TransferError::ContentRange("missing".to_string()))?;
    let invalid = || TransferError::ContentRange(value.to_string());

    let (range, total) = value
        .trim()
        .strip_prefix("bytes ")
        .and_then(|rest| rest.split_once('/'))
        .ok_or_else(invalid)?;
    let start = range
        .split_once('-')
        .and_then(|(start, _)| start.trim().parse::<u64>().ok())
        .ok_or_else(invalid)?;
    let total = match total.trim() {
        "*" => 0,
        total => total.parse().map_err(|_| invalid())?,
    };
    Ok((start, total))
}

/// [`MediaTransfer`] over a shared `reqwest` client.
pub struct HttpTransfer {
    client: Client,
    retry: RetryPolicy,
    progress: MultiProgress,
}

impl HttpTransfer {
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            progress: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        }
    }

    /// Draws per-transfer progress bars into `progress`.
    pub fn with_progress(mut self, progress: MultiProgress) -> Self {
        self.progress = progress;
        self
    }

    fn progress_bar(&self, total: u64, position: u64, title: &str) -> ProgressBar {
        let (bar, template) = if total > 0 {
            (
                ProgressBar::new(total),
                "{msg:40!} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec})",
            )
        } else {
            (ProgressBar::new_spinner(), "{spinner} {msg:40!} {bytes} ({bytes_per_sec})")
        };

        let style = ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");

        let bar = self.progress.add(bar);
        bar.set_style(style);
        bar.set_message(title.to_string());
        bar.set_position(position);
        bar
    }

    /// One request/stream cycle. Leaves the part file in place on error.
    async fn attempt(
        &self,
        url: &str,
        destination: &Path,
        part: &Path,
        title: &str,
    ) -> Result<u64, TransferError> {
        let offset = fs::metadata(part).await.map(|m| m.len()).unwrap_or(0);

        let mut request = self.client.get(url);
        if offset > 0 {
            info!("Resuming {} from byte {}", title, offset);
            request = request.header(RANGE, format!("bytes={}-", offset));
        }

        let response = request.send().await?;
        let status = response.status();

        let (file, mut written, total) = match status {
            StatusCode::PARTIAL_CONTENT => {
                let (start, total) = content_range(response.headers())?;
                if start == offset {
                    let file = if offset > 0 {
                        OpenOptions::new().append(true).open(part).await?
                    } else {
                        File::create(part).await?
                    };
                    (file, offset, total)
                } else if start == 0 {
                    warn!("Server sent {} from byte 0 instead of {}, restarting", title, offset);
                    (File::create(part).await?, 0, total)
                } else {
                    return Err(TransferError::ContentRange(format!(
                        "requested bytes from {} but got bytes from {}",
                        offset, start
                    )));
                }
            }
            status if status.is_success() => {
                if offset > 0 {
                    warn!("Server ignored range request for {}, restarting from zero", title);
                }
                let total = response.content_length().unwrap_or(0);
                (File::create(part).await?, 0, total)
            }
            status => return Err(TransferError::Status(status)),
        };

        debug!("Transfer of {} expects {} bytes (0 = unknown)", title, total);
        let bar = self.progress_bar(total, written, title);
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
            bar.set_position(written);
        }
        writer.flush().await?;
        bar.finish_and_clear();

        if total > 0 && written < total {
            return Err(TransferError::Incomplete {
                written,
                expected: total,
            });
        }

        fs::rename(part, destination).await?;
        Ok(written)
    }
}

#[async_trait]
impl MediaTransfer for HttpTransfer {
    #[instrument(skip_all, fields(title = %title))]
    async fn fetch_to_file(
        &self,
        url: &str,
        destination: &Path,
        title: &str,
    ) -> Result<u64, TransferError> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        let part = part_path(destination);
        let part = part.as_path();
        let max_attempts = self.retry.max_attempts;

        info!("Starting download: {}", title);
        let written = self
            .retry
            .run(title, |attempt| async move {
                if attempt > 1 {
                    info!("Retry attempt {}/{} for {}", attempt, max_attempts, title);
                }
                let result = self.attempt(url, destination, part, title).await;
                if result.is_err() {
                    discard_partial(part).await;
                }
                result
            })
            .await?;

        info!("Download completed: {} ({:.2} MB)", title, written as f64 / (1024.0 * 1024.0));
        Ok(written)
    }
}

async fn discard_partial(part: &Path) {
    match fs::remove_file(part).await {
        Ok(()) => debug!("Removed partial file {}", part.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial file {}: {}", part.display(), e),
    }
}
