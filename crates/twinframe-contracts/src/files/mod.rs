use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

mod signature;

pub use signature::{signature, FileSignature};

/// A file picked by the user, held in memory.
///
/// Slots replace files wholesale, so the bytes are shared behind an `Arc` and
/// never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    name: String,
    mime_type: String,
    modified_ms: i64,
    data: Arc<[u8]>,
}

impl LocalFile {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        modified_ms: i64,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            modified_ms,
            data: data.into(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata =
            fs::metadata(path).with_context(|| format!("failed reading {}", path.display()))?;
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|duration| duration.as_millis() as i64)
            .unwrap_or(0);
        let data = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let name = path
            .file_name()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        let mime_type = mime_for_path(path).unwrap_or("application/octet-stream");
        Ok(Self::new(name, mime_type, modified_ms, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn modified_ms(&self) -> i64 {
        self.modified_ms
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn data(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    pub fn is_image(&self) -> bool {
        self.mime_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("image/")
    }

    pub fn signature(&self) -> FileSignature {
        FileSignature::of(self)
    }
}

/// Successful response body of the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Failure body of the upload endpoint. Both fields usually carry the same text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UploadErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl UploadErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            error: Some(message.clone()),
            message: Some(message),
        }
    }

    /// `message` wins over `error`; blank values count as absent.
    pub fn best_message(&self) -> Option<&str> {
        non_blank(self.message.as_deref()).or_else(|| non_blank(self.error.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "avif" => Some("image/avif"),
        "heic" => Some("image/heic"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn from_path_reads_name_size_and_mime() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("portrait.JPG");
        fs::write(&path, vec![7u8; 2048])?;

        let file = LocalFile::from_path(&path)?;
        assert_eq!(file.name(), "portrait.JPG");
        assert_eq!(file.size(), 2048);
        assert_eq!(file.mime_type(), "image/jpeg");
        assert!(file.is_image());
        assert!(file.modified_ms() > 0);
        Ok(())
    }

    #[test]
    fn unknown_extension_is_not_an_image() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("notes.txt");
        fs::write(&path, b"hello")?;

        let file = LocalFile::from_path(&path)?;
        assert_eq!(file.mime_type(), "application/octet-stream");
        assert!(!file.is_image());
        Ok(())
    }

    #[test]
    fn from_path_reports_missing_file() {
        let err = LocalFile::from_path(Path::new("/definitely/not/here.png"))
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.contains("failed reading"));
    }

    #[test]
    fn error_body_prefers_message_then_error() {
        let both = UploadErrorBody {
            error: Some("short".to_string()),
            message: Some("long form".to_string()),
        };
        assert_eq!(both.best_message(), Some("long form"));

        let error_only = UploadErrorBody {
            error: Some("File type not supported".to_string()),
            message: Some("  ".to_string()),
        };
        assert_eq!(error_only.best_message(), Some("File type not supported"));

        assert_eq!(UploadErrorBody::default().best_message(), None);
    }
}
