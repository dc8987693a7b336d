use std::sync::Arc;

use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::header::{ACCEPT, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};
use twinframe_contracts::config::{is_allowed_upload_mime, MAX_FILE_SIZE_MB};
use twinframe_contracts::files::{UploadErrorBody, UploadedFile};
use url::Url;
use uuid::Uuid;

use crate::storage::StorageProvider;

const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*;q=0.8,*/*;q=0.5";
const FALLBACK_ATTACHMENT_NAME: &str = "image";

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageProvider>,
    pub http: reqwest::Client,
    pub max_file_bytes: u64,
}

impl AppState {
    pub fn new(storage: Arc<dyn StorageProvider>) -> Self {
        Self {
            storage,
            http: reqwest::Client::new(),
            max_file_bytes: twinframe_contracts::config::MAX_FILE_SIZE_BYTES,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No file provided")]
    MissingFile,
    #[error("File size exceeds the {}MB limit", MAX_FILE_SIZE_MB)]
    FileTooLarge,
    #[error("File type not supported")]
    UnsupportedType,
    #[error("{0}")]
    MalformedUpload(String),
    #[error("{0}")]
    Storage(String),
    #[error("Missing image URL")]
    MissingUrl,
    #[error("Invalid image URL")]
    InvalidUrl,
    #[error("Unsupported image URL protocol")]
    UnsupportedProtocol,
    #[error("Upstream download failed with status {}", .0.as_u16())]
    Upstream(StatusCode),
    #[error("Failed to download image. Please try again later.")]
    DownloadFailed,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile
            | ApiError::FileTooLarge
            | ApiError::MalformedUpload(_)
            | ApiError::MissingUrl
            | ApiError::InvalidUrl
            | ApiError::UnsupportedProtocol => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Upstream(status) => *status,
            ApiError::Storage(_) | ApiError::DownloadFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(UploadErrorBody::new(self.to_string()))).into_response()
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::FileTooLarge
        } else {
            ApiError::MalformedUpload(err.body_text())
        }
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

struct IncomingFile {
    name: String,
    content_type: String,
    data: axum::body::Bytes,
}

/// POST /api/storage/upload
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadedFile>, ApiError> {
    let mut file: Option<IncomingFile> = None;
    let mut folder: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let part = field.name().map(str::to_string);
        match part.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                file = Some(IncomingFile {
                    name,
                    content_type,
                    data,
                });
            }
            Some("folder") => folder = Some(field.text().await?),
            _ => {}
        }
    }

    let file = file.ok_or(ApiError::MissingFile)?;
    if file.data.len() as u64 > state.max_file_bytes {
        return Err(ApiError::FileTooLarge);
    }
    if !is_allowed_upload_mime(&file.content_type) {
        return Err(ApiError::UnsupportedType);
    }

    let folder = folder.filter(|folder| !folder.trim().is_empty());
    let uploaded = state
        .storage
        .put(&file.data, &file.name, &file.content_type, folder.as_deref())
        .await
        .map_err(|err| {
            warn!(error = %err, file = %file.name, "storage write failed");
            ApiError::Storage(err.to_string())
        })?;
    info!(url = %uploaded.url, bytes = file.data.len(), "file uploaded");
    Ok(Json(uploaded))
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: Option<String>,
}

/// POST /api/download-image
///
/// Only http and https sources are fetched. The upstream body is streamed
/// back as an attachment.
pub async fn download_image(
    State(state): State<AppState>,
    request: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request_id = Uuid::new_v4();
    let source = parse_source_url(request.ok().and_then(|Json(body)| body.url).as_deref())
        .map_err(|err| {
            warn!(%request_id, error = %err, "download request refused");
            err
        })?;

    let upstream = state
        .http
        .get(source.clone())
        .header(ACCEPT, IMAGE_ACCEPT)
        .send()
        .await
        .map_err(|err| {
            warn!(%request_id, error = %err, "unexpected error downloading image");
            ApiError::DownloadFailed
        })?;

    let status = upstream.status();
    if !status.is_success() {
        let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        warn!(%request_id, status = status.as_u16(), "upstream download failed");
        return Err(ApiError::Upstream(status));
    }

    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| HeaderValue::from_bytes(value.as_bytes()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        attachment_name(&source)
    ))
    .map_err(|_| ApiError::DownloadFailed)?;

    let length = upstream.content_length();

    let mut response = (
        [
            (CONTENT_TYPE, content_type),
            (CONTENT_DISPOSITION, disposition),
            (CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        Body::from_stream(upstream.bytes_stream()),
    )
        .into_response();
    if let Some(length) = length {
        response
            .headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from(length));
    }
    info!(%request_id, url = %source, "proxying image download");
    Ok(response)
}

fn parse_source_url(raw: Option<&str>) -> Result<Url, ApiError> {
    let raw = raw
        .filter(|raw| !raw.trim().is_empty())
        .ok_or(ApiError::MissingUrl)?;
    let url = Url::parse(raw.trim()).map_err(|_| ApiError::InvalidUrl)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ApiError::UnsupportedProtocol),
    }
}

/// Last path segment of the source; the query never reaches it.
pub fn attachment_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .unwrap_or(FALLBACK_ATTACHMENT_NAME)
        .replace('"', "")
}
