pub mod huggingface;
pub mod modelscope;

use anyhow::Result;
use reqwest::Client;

use crate::cli::Provider;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadItem {
    pub url: String,
    /// Path relative to the model root, as listed by the registry.
    pub path: String,
    pub size: Option<u64>,
    pub sha256: Option<String>,
}

/// Lists every file of `model` at `revision`.
/// `endpoint` overrides the provider's default base URL.
pub async fn fetch_urls(
    client: &Client,
    provider: Provider,
    model: &str,
    revision: &str,
    endpoint: Option<&str>,
    use_mirror: bool,
) -> Result<Vec<DownloadItem>> {
    let endpoint = endpoint
        .map(|e| e.trim_end_matches('/').to_string())
        .unwrap_or_else(|| default_endpoint(provider, use_mirror).to_string());
    match provider {
        Provider::Modelscope => {
            modelscope::fetch_modelscope_urls(client, &endpoint, model, revision).await
        }
        Provider::Huggingface => {
            huggingface::fetch_huggingface_urls(client, &endpoint, model, revision).await
        }
    }
}

pub fn default_endpoint(provider: Provider, use_mirror: bool) -> &'static str {
    match (provider, use_mirror) {
        (Provider::Modelscope, _) => modelscope::DEFAULT_ENDPOINT,
        (Provider::Huggingface, true) => huggingface::MIRROR_ENDPOINT,
        (Provider::Huggingface, false) => huggingface::DEFAULT_ENDPOINT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_flag_only_affects_huggingface() {
        assert_eq!(default_endpoint(Provider::Huggingface, true), "https://hf-mirror.com");
        assert_eq!(default_endpoint(Provider::Huggingface, false), "https://huggingface.co");
        assert_eq!(
            default_endpoint(Provider::Modelscope, true),
            default_endpoint(Provider::Modelscope, false)
        );
    }
}
