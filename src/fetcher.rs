use futures::StreamExt;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use reqwest::{header, Client, Response, StatusCode};
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

/// One source-to-destination transfer.
#[derive(Clone, Debug)]
pub struct TransferTarget {
    pub source: String,
    pub destination: PathBuf,
    pub chunk_size: NonZeroUsize,
}

impl TransferTarget {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<PathBuf>,
        chunk_size: NonZeroUsize,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            chunk_size,
        }
    }
}

/// Byte accounting for a transfer in flight. `written` never drops below `resume_offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferState {
    pub resume_offset: u64,
    pub total: Option<u64>,
    pub written: u64,
}

impl TransferState {
    pub fn new(resume_offset: u64, total: Option<u64>) -> Self {
        Self {
            resume_offset,
            total,
            written: resume_offset,
        }
    }

    fn record(&mut self, len: usize) {
        self.written += len as u64;
    }

    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some(self.written as f64 / total as f64 * 100.0),
            _ => None,
        }
    }

    pub fn progress_message(&self) -> String {
        match (self.percent(), self.total) {
            (Some(percent), Some(total)) => {
                format!("{:.1}% ({}/{} bytes)", percent, self.written, total)
            }
            _ => format!("{} bytes", self.written),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchReport {
    pub destination: PathBuf,
    pub resume_offset: u64,
    pub total: Option<u64>,
    pub written: u64,
    /// Number of writes issued during this invocation.
    pub chunks: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Status,
    Filesystem,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid source url {url:?}: {source}")]
    InvalidSource {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: StatusCode },
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::InvalidSource { .. } | FetchError::Network { .. } => ErrorKind::Network,
            FetchError::Status { .. } => ErrorKind::Status,
            FetchError::Filesystem { .. } => ErrorKind::Filesystem,
        }
    }

    fn network(url: &str, source: reqwest::Error) -> Self {
        FetchError::Network {
            url: url.to_string(),
            source,
        }
    }

    fn filesystem(path: &Path, source: io::Error) -> Self {
        FetchError::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub struct Fetcher {
    client: Client,
    show_progress: bool,
}

impl Fetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Downloads `target.source` into `target.destination`, continuing from
    /// whatever is already on disk. Whatever was written stays on disk on failure.
    ///
    /// The failure line is left to the caller; the bar is abandoned as it stood.
    pub async fn fetch(&self, target: &TransferTarget) -> Result<FetchReport, FetchError> {
        let pb = self.progress_bar();
        self.fetch_with(target, &pb).await
    }

    async fn fetch_with(
        &self,
        target: &TransferTarget,
        pb: &ProgressBar,
    ) -> Result<FetchReport, FetchError> {
        pb.set_message(format!("Connecting {}", target.source));

        match self.transfer(target, pb).await {
            Ok(report) => {
                pb.finish_with_message(format!("Completed {}", report.destination.display()));
                info!(
                    url = %target.source,
                    destination = %report.destination.display(),
                    offset = report.resume_offset,
                    total = ?report.total,
                    written = report.written,
                    chunks = report.chunks,
                    "download finished"
                );
                Ok(report)
            }
            Err(e) => {
                pb.abandon();
                debug!(
                    url = %target.source,
                    destination = %target.destination.display(),
                    kind = ?e.kind(),
                    "download failed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    async fn transfer(
        &self,
        target: &TransferTarget,
        pb: &ProgressBar,
    ) -> Result<FetchReport, FetchError> {
        let url = Url::parse(&target.source).map_err(|source| FetchError::InvalidSource {
            url: target.source.clone(),
            source,
        })?;
        let destination = &target.destination;

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| FetchError::filesystem(parent, e))?;
            }
        }

        let mut offset = match fs::metadata(destination).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(FetchError::filesystem(destination, e)),
        };

        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(header::RANGE, format!("bytes={}-", offset));
        }
        debug!(
            url = %target.source,
            offset,
            chunk_size = target.chunk_size.get(),
            "sending request"
        );

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::network(&target.source, e))?;
        let status = response.status();

        if offset > 0 && status == StatusCode::RANGE_NOT_SATISFIABLE {
            return match content_range_total(&response) {
                Some(total) if total != offset => Err(FetchError::Status {
                    url: target.source.clone(),
                    status,
                }),
                _ => {
                    debug!(url = %target.source, offset, "already complete");
                    Ok(FetchReport {
                        destination: destination.clone(),
                        resume_offset: offset,
                        total: Some(offset),
                        written: offset,
                        chunks: 0,
                    })
                }
            };
        }

        if !status.is_success() {
            return Err(FetchError::Status {
                url: target.source.clone(),
                status,
            });
        }

        if offset > 0 && status != StatusCode::PARTIAL_CONTENT {
            warn!(
                url = %target.source,
                offset,
                %status,
                "range ignored by server, restarting from zero"
            );
            offset = 0;
        }

        let total = response.content_length().map(|len| len + offset);
        let state = TransferState::new(offset, total);
        match total {
            Some(total) => pb.set_length(total),
            None => pb.set_style(spinner_style()),
        }
        pb.set_position(offset);
        pb.set_message(state.progress_message());

        let file = open_destination(destination, offset).await?;
        let mut sink = ChunkSink {
            file,
            path: destination,
            state,
            chunks: 0,
            pb,
        };

        let chunk_size = target.chunk_size.get();
        let mut pending: Vec<u8> = Vec::with_capacity(chunk_size);
        let mut stream = response.bytes_stream();

        while let Some(item) = stream.next().await {
            let bytes = match item {
                Ok(bytes) => bytes,
                Err(e) => {
                    // Keep every byte that arrived as part of the resume checkpoint.
                    if !pending.is_empty() {
                        sink.write(&pending).await?;
                    }
                    return Err(FetchError::network(&target.source, e));
                }
            };

            pending.extend_from_slice(&bytes);
            while pending.len() >= chunk_size {
                let rest = pending.split_off(chunk_size);
                let chunk = std::mem::replace(&mut pending, rest);
                sink.write(&chunk).await?;
            }
        }

        if !pending.is_empty() {
            sink.write(&pending).await?;
        }

        Ok(FetchReport {
            destination: destination.clone(),
            resume_offset: sink.state.resume_offset,
            total: sink.state.total,
            written: sink.state.written,
            chunks: sink.chunks,
        })
    }

    fn progress_bar(&self) -> ProgressBar {
        let pb = ProgressBar::with_draw_target(Some(0), self.draw_target());
        pb.set_style(bar_style());
        pb
    }

    fn draw_target(&self) -> ProgressDrawTarget {
        if self.show_progress {
            ProgressDrawTarget::stderr_with_hz(5)
        } else {
            ProgressDrawTarget::hidden()
        }
    }
}

struct ChunkSink<'a> {
    file: File,
    path: &'a Path,
    state: TransferState,
    chunks: usize,
    pb: &'a ProgressBar,
}

impl ChunkSink<'_> {
    /// Writes one chunk and waits until it reaches the file, so the on-disk size
    /// always matches `state.written`.
    async fn write(&mut self, chunk: &[u8]) -> Result<(), FetchError> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| FetchError::filesystem(self.path, e))?;
        self.file
            .flush()
            .await
            .map_err(|e| FetchError::filesystem(self.path, e))?;

        self.state.record(chunk.len());
        self.chunks += 1;
        self.pb.set_position(self.state.written);
        self.pb.set_message(self.state.progress_message());
        Ok(())
    }
}

async fn open_destination(path: &Path, offset: u64) -> Result<File, FetchError> {
    let mut options = OpenOptions::new();
    if offset > 0 {
        options.append(true);
    } else {
        options.create(true).write(true).truncate(true);
    }
    options
        .open(path)
        .await
        .map_err(|e| FetchError::filesystem(path, e))
}

/// Total length from `Content-Range: bytes <range>/<total>`, when the server states one.
fn content_range_total(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(header::CONTENT_RANGE)?
        .to_str()
        .ok()?
        .rsplit('/')
        .next()?
        .trim()
        .parse()
        .ok()
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes_per_sec:>12} {msg}",
        )
        .map(|style| style.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {bytes_per_sec:>12} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
