use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde::Deserialize;

use super::DownloadItem;

pub const DEFAULT_ENDPOINT: &str = "https://modelscope.cn";

#[derive(Deserialize)]
struct ModelScopeResponse {
    #[serde(rename = "Code")]
    code: Option<i64>,
    #[serde(rename = "Data")]
    data: Option<ModelScopeData>,
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "Success")]
    success: Option<bool>,
}

#[derive(Deserialize)]
struct ModelScopeData {
    #[serde(rename = "Files")]
    files: Vec<ModelScopeFile>,
}

#[derive(Deserialize)]
struct ModelScopeFile {
    #[serde(rename = "Path")]
    path: String,
    #[serde(rename = "Type", default)]
    kind: Option<String>,
    #[serde(rename = "Size", default)]
    size: Option<u64>,
    #[serde(rename = "Sha256", default)]
    sha256: Option<String>,
}

pub async fn fetch_modelscope_urls(
    client: &Client,
    endpoint: &str,
    model: &str,
    revision: &str,
) -> Result<Vec<DownloadItem>> {
    let api_url = format!("{}/api/v1/models/{}/repo/files", endpoint, model);
    let resp = client
        .get(&api_url)
        .query(&[("Revision", revision), ("Recursive", "true")])
        .send()
        .await
        .context("Failed to request ModelScope file list")?;
    if !resp.status().is_success() {
        bail!("ModelScope file list request failed with status {}", resp.status());
    }

    let body = resp.text().await.context("Failed to read ModelScope response")?;
    parse_listing(&body, endpoint, model, revision)
}

fn parse_listing(
    body: &str,
    endpoint: &str,
    model: &str,
    revision: &str,
) -> Result<Vec<DownloadItem>> {
    let parsed: ModelScopeResponse =
        serde_json::from_str(body).context("Failed to parse ModelScope response JSON")?;

    if parsed.success == Some(false) {
        bail!(
            "ModelScope rejected the request (code {}): {}",
            parsed.code.unwrap_or_default(),
            parsed.message.unwrap_or_default()
        );
    }
    let data = parsed.data.ok_or_else(|| {
        anyhow!(
            "ModelScope response has no Data field: {}",
            parsed.message.unwrap_or_default()
        )
    })?;

    let items: Vec<DownloadItem> = data
        .files
        .into_iter()
        .filter(|file| file.kind.as_deref() != Some("tree"))
        .map(|file| DownloadItem {
            url: format!("{}/models/{}/resolve/{}/{}", endpoint, model, revision, file.path),
            path: file.path,
            size: file.size,
            sha256: file.sha256.filter(|s| !s.is_empty()),
        })
        .collect();

    if items.is_empty() {
        bail!("ModelScope file list for {} is empty", model);
    }
    Ok(items)
}
