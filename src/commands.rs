use anyhow::{Context, Result};
use indicatif::HumanBytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::cli::Provider;
use crate::config::FetchConfig;
use crate::fetcher::{FetchReport, Fetcher, TransferTarget};
use crate::providers;
use crate::utils::{join_relative, resolve_destination};

/// Everything needed to materialize one model revision from a registry.
#[derive(Clone, Debug)]
pub struct SnapshotRequest {
    pub provider: Provider,
    pub model: String,
    pub revision: String,
    pub local_dir: PathBuf,
    pub endpoint: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    pub root: PathBuf,
    pub fetched: usize,
    pub skipped: usize,
    pub bytes: u64,
}

/// Single-URL download. Returns whether it succeeded; the error is already printed.
pub async fn run_single_download(url: String, dest: PathBuf, config: &FetchConfig) -> bool {
    let result = async {
        let fetcher = Fetcher::new(config.build_client()?).with_progress(config.show_progress);
        single_download(&fetcher, &url, &dest, config).await
    }
    .await;

    match result {
        Ok(report) => {
            println!("✅ Download complete: {}", report.destination.display());
            true
        }
        Err(e) => {
            eprintln!("❌ Download failed: {:#}", e);
            false
        }
    }
}

async fn single_download(
    fetcher: &Fetcher,
    url: &str,
    dest: &Path,
    config: &FetchConfig,
) -> Result<FetchReport> {
    let destination = resolve_destination(url, dest)?;
    let target = TransferTarget::new(url, destination, config.chunk_size);
    Ok(fetcher.fetch(&target).await?)
}

/// Registry download. Returns whether it succeeded; the error is already printed.
pub async fn run_snapshot(request: SnapshotRequest, config: &FetchConfig) -> bool {
    println!("Downloading {} from {:?}", request.model, request.provider);
    let result = async {
        let fetcher = Fetcher::new(config.build_client()?).with_progress(config.show_progress);
        download_snapshot(&fetcher, &request, config).await
    }
    .await;

    match result {
        Ok(report) => {
            println!(
                "✅ Model download complete: {} ({} fetched, {} already present, {})",
                report.root.display(),
                report.fetched,
                report.skipped,
                HumanBytes(report.bytes)
            );
            true
        }
        Err(e) => {
            eprintln!("❌ Model download failed: {:#}", e);
            false
        }
    }
}

/// Fetches every listed file of the model into `<local_dir>/<model>/`, one at a time.
/// Stops at the first failure; completed and partial files stay for the next run.
pub async fn download_snapshot(
    fetcher: &Fetcher,
    request: &SnapshotRequest,
    config: &FetchConfig,
) -> Result<SnapshotReport> {
    let root = join_relative(&request.local_dir, &request.model)?;
    fs::create_dir_all(&root)
        .await
        .with_context(|| format!("Failed to create model directory {}", root.display()))?;

    let items = providers::fetch_urls(
        fetcher.client(),
        request.provider,
        &request.model,
        &request.revision,
        request.endpoint.as_deref(),
        config.use_mirror,
    )
    .await?;
    info!(
        model = %request.model,
        files = items.len(),
        root = %root.display(),
        "listing fetched"
    );

    let mut report = SnapshotReport {
        root: root.clone(),
        ..Default::default()
    };

    for item in items {
        let destination = join_relative(&root, &item.path)?;

        if let (Some(expected), Ok(metadata)) = (item.size, fs::metadata(&destination).await) {
            if metadata.len() == expected {
                debug!(path = %item.path, size = expected, "already present, skipping");
                report.skipped += 1;
                report.bytes += expected;
                continue;
            }
        }

        debug!(path = %item.path, size = ?item.size, sha256 = ?item.sha256, "fetching");
        let target = TransferTarget::new(&item.url, destination, config.chunk_size);
        let fetched = fetcher
            .fetch(&target)
            .await
            .with_context(|| format!("Failed to download {}", item.path))?;
        report.fetched += 1;
        report.bytes += fetched.written;
    }

    Ok(report)
}
