use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use std::num::NonZeroUsize;
use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: usize = 8192;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Settings shared by every request of one invocation.
#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub user_agent: String,
    /// Static headers sent with every request.
    pub headers: HeaderMap,
    pub connect_timeout: Duration,
    pub chunk_size: NonZeroUsize,
    /// Route hub traffic through the mirror endpoint where the provider has one.
    pub use_mirror: bool,
    pub show_progress: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("model-fetch/{}", env!("CARGO_PKG_VERSION")),
            headers: HeaderMap::new(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            chunk_size: NonZeroUsize::new(DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroUsize::MIN),
            use_mirror: true,
            show_progress: true,
        }
    }
}

impl FetchConfig {
    pub fn build_client(&self) -> Result<Client> {
        Client::builder()
            .user_agent(self.user_agent.clone())
            .default_headers(self.headers.clone())
            .connect_timeout(self.connect_timeout)
            .build()
            .context("Failed to build HTTP client")
    }

    /// Adds a header given as `Name: value`.
    pub fn add_header(&mut self, raw: &str) -> Result<()> {
        let (name, value) = parse_header(raw)?;
        self.headers.append(name, value);
        Ok(())
    }
}

pub fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("Header must look like 'Name: value', got {:?}", raw))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .with_context(|| format!("Invalid header name in {:?}", raw))?;
    let value = HeaderValue::from_str(value.trim())
        .with_context(|| format!("Invalid header value in {:?}", raw))?;
    Ok((name, value))
}
