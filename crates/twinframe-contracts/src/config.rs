use std::env;

pub const DEFAULT_SLOT_COUNT: usize = 2;
pub const MAX_FILE_SIZE_MB: u64 = 12;
pub const MAX_FILE_SIZE_BYTES: u64 = MAX_FILE_SIZE_MB * 1024 * 1024;
pub const DEFAULT_UPLOAD_FOLDER: &str = "image-inputs";
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:3000";

/// MIME types the upload endpoint stores. Slot validation is looser and
/// accepts any `image/*`, so a file can pass locally and still be refused
/// by the endpoint.
pub const ALLOWED_UPLOAD_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

pub fn is_allowed_upload_mime(mime_type: &str) -> bool {
    ALLOWED_UPLOAD_MIME_TYPES
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(mime_type.trim()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioConfig {
    pub slot_count: usize,
    pub max_file_bytes: u64,
    pub upload_folder: Option<String>,
    pub upload_url: String,
    pub generate_url: String,
    pub download_url: String,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self::with_api_base(DEFAULT_API_BASE)
    }
}

impl StudioConfig {
    pub fn with_api_base(api_base: &str) -> Self {
        let base = api_base.trim().trim_end_matches('/');
        Self {
            slot_count: DEFAULT_SLOT_COUNT,
            max_file_bytes: MAX_FILE_SIZE_BYTES,
            upload_folder: Some(DEFAULT_UPLOAD_FOLDER.to_string()),
            upload_url: format!("{base}/api/storage/upload"),
            generate_url: format!("{base}/api/generate-image"),
            download_url: format!("{base}/api/download-image"),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    /// Applies overrides from `lookup` on top of the defaults. `TWINFRAME_API_BASE`
    /// moves every endpoint; the per-endpoint keys win over it.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = lookup("TWINFRAME_API_BASE")
            .map(|base| Self::with_api_base(&base))
            .unwrap_or_default();
        if let Some(value) = lookup("TWINFRAME_UPLOAD_URL") {
            config.upload_url = value;
        }
        if let Some(value) = lookup("TWINFRAME_GENERATE_URL") {
            config.generate_url = value;
        }
        if let Some(value) = lookup("TWINFRAME_DOWNLOAD_URL") {
            config.download_url = value;
        }
        if let Some(value) = lookup("TWINFRAME_UPLOAD_FOLDER") {
            config.upload_folder = Some(value);
        }
        config
    }
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
