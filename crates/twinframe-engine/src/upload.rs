use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::Client as HttpClient;
use tracing::warn;
use twinframe_contracts::files::{LocalFile, UploadErrorBody, UploadedFile};

pub const FAILED_TO_UPLOAD_MESSAGE: &str = "Failed to upload file";

/// Sends one local file to object storage and returns where it landed.
#[async_trait]
pub trait AssetUploader: Send + Sync {
    async fn upload(&self, file: &LocalFile, folder: Option<&str>) -> Result<UploadedFile>;
}

/// Multipart client for the storage upload endpoint.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    endpoint: String,
    http: HttpClient,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(endpoint, HttpClient::new())
    }

    pub fn with_client(endpoint: impl Into<String>, http: HttpClient) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AssetUploader for HttpUploader {
    async fn upload(&self, file: &LocalFile, folder: Option<&str>) -> Result<UploadedFile> {
        let part = MultipartPart::bytes(file.bytes().to_vec())
            .file_name(file.name().to_string())
            .mime_str(file.mime_type())
            .with_context(|| format!("invalid mime type for {}", file.name()))?;
        let form = MultipartForm::new()
            .part("file", part)
            .text("folder", folder.unwrap_or_default().to_string());

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("upload request failed ({})", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = rejection_message(&body);
            warn!(
                status = status.as_u16(),
                file = file.name(),
                %message,
                "storage rejected upload"
            );
            bail!(message);
        }

        let uploaded: UploadedFile = response
            .json()
            .await
            .context("upload endpoint returned an invalid JSON payload")?;
        if uploaded.url.trim().is_empty() {
            bail!("upload endpoint returned an empty url");
        }
        Ok(uploaded)
    }
}

fn rejection_message(body: &str) -> String {
    serde_json::from_str::<UploadErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.best_message().map(str::to_string))
        .unwrap_or_else(|| FAILED_TO_UPLOAD_MESSAGE.to_string())
}

#[cfg(test)]
mod tests {
    use axum::extract::Multipart;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;

    async fn serve(app: Router) -> anyhow::Result<String> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(format!("http://{addr}/upload"))
    }

    fn png() -> LocalFile {
        LocalFile::new("me.png", "image/png", 5, vec![9u8; 64])
    }

    #[test]
    fn rejection_message_falls_back_to_generic_text() {
        let body = r#"{"error":"File type not supported","message":"File type not supported"}"#;
        assert_eq!(rejection_message(body), "File type not supported");
        assert_eq!(rejection_message("<html>oops</html>"), FAILED_TO_UPLOAD_MESSAGE);
        assert_eq!(rejection_message("{}"), FAILED_TO_UPLOAD_MESSAGE);
    }

    #[tokio::test]
    async fn upload_sends_file_and_folder_fields() -> anyhow::Result<()> {
        let app = Router::new().route(
            "/upload",
            post(|mut multipart: Multipart| async move {
                let mut seen = serde_json::Map::new();
                while let Ok(Some(field)) = multipart.next_field().await {
                    let name = field.name().unwrap_or_default().to_string();
                    if name == "file" {
                        let file_name = field.file_name().unwrap_or_default().to_string();
                        let mime = field.content_type().unwrap_or_default().to_string();
                        let size = field.bytes().await.map(|bytes| bytes.len()).unwrap_or(0);
                        seen.insert("file_name".to_string(), json!(file_name));
                        seen.insert("mime".to_string(), json!(mime));
                        seen.insert("size".to_string(), json!(size));
                    } else {
                        let text = field.text().await.unwrap_or_default();
                        seen.insert(name, json!(text));
                    }
                }
                let key = format!(
                    "{}/{}",
                    seen.get("folder").and_then(Value::as_str).unwrap_or_default(),
                    seen.get("file_name").and_then(Value::as_str).unwrap_or_default(),
                );
                let ok = seen.get("mime") == Some(&json!("image/png"))
                    && seen.get("size") == Some(&json!(64));
                let url = if ok { format!("https://cdn.test/{key}") } else { String::new() };
                Json(json!({"url": url, "key": key}))
            }),
        );
        let endpoint = serve(app).await?;

        let uploaded = HttpUploader::new(endpoint)
            .upload(&png(), Some("image-inputs"))
            .await?;
        assert_eq!(uploaded.url, "https://cdn.test/image-inputs/me.png");
        assert_eq!(uploaded.key.as_deref(), Some("image-inputs/me.png"));
        Ok(())
    }

    #[tokio::test]
    async fn non_success_status_surfaces_endpoint_message() -> anyhow::Result<()> {
        let app = Router::new().route(
            "/upload",
            post(|| async {
                (
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    Json(json!({
                        "error": "File type not supported",
                        "message": "File type not supported"
                    })),
                )
            }),
        );
        let endpoint = serve(app).await?;

        let err = HttpUploader::new(endpoint)
            .upload(&png(), None)
            .await
            .err()
            .map(|err| format!("{err:#}"))
            .unwrap_or_default();
        assert_eq!(err, "File type not supported");
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_error_body_uses_generic_message() -> anyhow::Result<()> {
        let app = Router::new().route(
            "/upload",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream exploded") }),
        );
        let endpoint = serve(app).await?;

        let err = HttpUploader::new(endpoint)
            .upload(&png(), None)
            .await
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert_eq!(err, FAILED_TO_UPLOAD_MESSAGE);
        Ok(())
    }
}
