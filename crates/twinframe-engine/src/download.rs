use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use tracing::warn;
use url::Url;

pub const DEFAULT_DOWNLOAD_FILENAME: &str = "generated-image.png";
pub const FAILED_TO_DOWNLOAD_MESSAGE: &str = "Failed to download image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedImage {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Fetches a generated image's bytes, normally through the download proxy.
#[async_trait]
pub trait ImageDownloader: Send + Sync {
    async fn download(&self, image_url: &str) -> Result<DownloadedImage>;
}

#[derive(Debug, Clone)]
pub struct DownloadClient {
    endpoint: String,
    http: HttpClient,
}

impl DownloadClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(endpoint, HttpClient::new())
    }

    pub fn with_client(endpoint: impl Into<String>, http: HttpClient) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }
}

#[async_trait]
impl ImageDownloader for DownloadClient {
    async fn download(&self, image_url: &str) -> Result<DownloadedImage> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "url": image_url }))
            .send()
            .await
            .with_context(|| format!("download proxy request failed ({})", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|parsed| parsed.get("error").and_then(Value::as_str).map(str::to_string))
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| FAILED_TO_DOWNLOAD_MESSAGE.to_string());
            warn!(status = status.as_u16(), %message, "download proxy refused request");
            bail!(message);
        }

        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let filename = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(filename_from_disposition)
            .or_else(|| filename_from_url(image_url))
            .unwrap_or_else(|| DEFAULT_DOWNLOAD_FILENAME.to_string());
        let data = response
            .bytes()
            .await
            .context("failed reading downloaded image bytes")?
            .to_vec();

        Ok(DownloadedImage {
            filename,
            content_type,
            data,
        })
    }
}

/// Pulls `filename` out of a `Content-Disposition` value, quoted or not.
pub fn filename_from_disposition(disposition: &str) -> Option<String> {
    disposition.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let value = value.trim().trim_matches('"').trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

pub fn filename_from_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    parsed
        .path_segments()?
        .last()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}
