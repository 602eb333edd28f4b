mod cli;
mod commands;
mod config;
mod fetcher;
mod providers;
mod utils;

#[cfg(test)]
mod test_support;

use anyhow::Result;
use clap::Parser;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::cli::Provider;
use crate::commands::SnapshotRequest;
use crate::config::{FetchConfig, DEFAULT_CHUNK_SIZE, DEFAULT_CONNECT_TIMEOUT_SECS};

#[derive(Parser, Debug)]
#[command(author, version, about = "Resumable model downloader", long_about = None)]
struct Args {
    /// Model id (e.g. org/model) to fetch from the registry, or an http(s) URL
    #[arg(index = 1)]
    source: String,

    /// Local directory for models; for a URL, the destination file or directory
    #[arg(index = 2)]
    dest: PathBuf,

    /// Bytes written per chunk
    #[arg(long = "chunk-size", default_value_t = default_chunk_size())]
    chunk_size: NonZeroUsize,

    /// Model registry used for model ids
    #[arg(short = 'P', long, value_enum, default_value = "modelscope")]
    provider: Provider,

    /// Revision/branch used when generating resolve URLs
    /// [default: master for modelscope, main for huggingface]
    #[arg(short = 'b', long = "revision")]
    revision: Option<String>,

    /// Override the registry base URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Talk to the registry directly instead of its mirror
    #[arg(long = "no-mirror")]
    no_mirror: bool,

    /// Extra request header, e.g. -H 'Authorization: Bearer xyz' (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Hide the progress bar
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Connection timeout in seconds
    #[arg(long = "connect-timeout", default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    connect_timeout: u64,
}

fn default_chunk_size() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroUsize::MIN)
}

impl Args {
    fn revision(&self) -> String {
        self.revision
            .clone()
            .unwrap_or_else(|| self.provider.default_revision().to_string())
    }

    fn fetch_config(&self) -> Result<FetchConfig> {
        let mut config = FetchConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            chunk_size: self.chunk_size,
            use_mirror: !self.no_mirror,
            show_progress: !self.quiet,
            ..FetchConfig::default()
        };
        for header in &self.headers {
            config.add_header(header)?;
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<bool> {
    let config = args.fetch_config()?;
    let revision = args.revision();
    tracing::debug!(?config, "configuration resolved");

    // One transfer at a time; a current-thread runtime is all that is needed.
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let ok = rt.block_on(async {
        if crate::utils::is_remote_source(&args.source) {
            crate::commands::run_single_download(args.source, args.dest, &config).await
        } else {
            let request = SnapshotRequest {
                provider: args.provider,
                revision,
                model: args.source,
                local_dir: args.dest,
                endpoint: args.endpoint,
            };
            crate::commands::run_snapshot(request, &config).await
        }
    });
    Ok(ok)
}
