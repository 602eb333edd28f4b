use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::Deserialize;

use super::DownloadItem;

pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";
pub const MIRROR_ENDPOINT: &str = "https://hf-mirror.com";

#[derive(Deserialize)]
struct ModelInfo {
    #[serde(default)]
    siblings: Vec<Sibling>,
}

#[derive(Deserialize)]
struct Sibling {
    rfilename: String,
    #[serde(default)]
    size: Option<u64>,
}

pub async fn fetch_huggingface_urls(
    client: &Client,
    endpoint: &str,
    model: &str,
    revision: &str,
) -> Result<Vec<DownloadItem>> {
    let api_url = format!("{}/api/models/{}/revision/{}", endpoint, model, revision);
    let resp = client
        .get(&api_url)
        .query(&[("blobs", "true")])
        .send()
        .await
        .context("Failed to request Hugging Face model info")?;
    if !resp.status().is_success() {
        bail!("Hugging Face model info request failed with status {}", resp.status());
    }

    let body = resp.text().await.context("Failed to read Hugging Face response")?;
    let info: ModelInfo =
        serde_json::from_str(&body).context("Failed to parse Hugging Face response JSON")?;

    let items: Vec<DownloadItem> = info
        .siblings
        .into_iter()
        .map(|sibling| DownloadItem {
            url: format!("{}/{}/resolve/{}/{}", endpoint, model, revision, sibling.rfilename),
            path: sibling.rfilename,
            size: sibling.size,
            sha256: None,
        })
        .collect();

    if items.is_empty() {
        bail!("Hugging Face file list for {} is empty", model);
    }
    Ok(items)
}
