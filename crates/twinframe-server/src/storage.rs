use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use tracing::debug;
use twinframe_contracts::files::UploadedFile;
use uuid::Uuid;

/// Folder used when the client does not name one.
pub const FALLBACK_FOLDER: &str = "uploads";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to store {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Object storage as seen by the upload endpoint.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn put(
        &self,
        data: &[u8],
        filename: &str,
        content_type: &str,
        folder: Option<&str>,
    ) -> Result<UploadedFile, StorageError>;
}

/// Writes objects below a root directory that the server also serves under
/// `/files`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_base: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed creating storage dir {}", root.display()))?;
        Ok(Self {
            root,
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/files/{key}", self.public_base)
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    async fn put(
        &self,
        data: &[u8],
        filename: &str,
        content_type: &str,
        folder: Option<&str>,
    ) -> Result<UploadedFile, StorageError> {
        let key = storage_key(folder, filename, Utc::now(), Uuid::new_v4());
        let path = self.root.join(&key);
        let write = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, data).await
        };
        write.await.map_err(|source| StorageError::Write {
            key: key.clone(),
            source,
        })?;
        debug!(%key, content_type, bytes = data.len(), "stored object");
        Ok(UploadedFile {
            url: self.public_url(&key),
            key: Some(key),
        })
    }
}

/// `{folder}/{yyyy}/{mm}/{id}-{name}` with every segment reduced to a safe
/// character set. Traversal segments in `folder` are dropped.
pub fn storage_key(folder: Option<&str>, filename: &str, now: DateTime<Utc>, id: Uuid) -> String {
    let folder = folder
        .map(|raw| {
            raw.split('/')
                .map(str::trim)
                .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
                .map(sanitize_segment)
                .collect::<Vec<_>>()
                .join("/")
        })
        .filter(|folder| !folder.is_empty())
        .unwrap_or_else(|| FALLBACK_FOLDER.to_string());
    format!(
        "{folder}/{:04}/{:02}/{id}-{}",
        now.year(),
        now.month(),
        sanitize_segment(filename)
    )
}

fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}
