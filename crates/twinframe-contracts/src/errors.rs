use thiserror::Error;

pub const UPLOAD_FAILED_MESSAGE: &str = "We couldn't send your reference images. Please try again.";
pub const DOWNLOAD_FAILED_MESSAGE: &str = "Failed to download the image. Please try again.";

/// Failures a user can see in the error banner.
///
/// `InvalidType`, `TooLarge`, `MissingImage` and `MissingPrompt` never reach
/// the network. The remaining variants carry a message that is displayed
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StudioError {
    #[error("slot {index} does not exist (there are {slot_count} slots)")]
    InvalidSlot { index: usize, slot_count: usize },
    #[error("Only image files can be used as references.")]
    InvalidType { mime_type: String },
    #[error("Each image must be {}MB or smaller.", .max_bytes / (1024 * 1024))]
    TooLarge { size: u64, max_bytes: u64 },
    #[error("Add a reference image to every slot first.")]
    MissingImage,
    #[error("Describe the image you want to generate.")]
    MissingPrompt,
    #[error("{0}")]
    UploadFailed(String),
    #[error("{0}")]
    GenerationFailed(String),
    #[error("{0}")]
    DownloadFailed(String),
}

impl StudioError {
    /// Validation and precondition failures are handled locally and are not
    /// logged as exceptional.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidSlot { .. }
                | Self::InvalidType { .. }
                | Self::TooLarge { .. }
                | Self::MissingImage
                | Self::MissingPrompt
        )
    }
}

/// Maps a failure from the upload phase of a generation to what the banner
/// shows. Any message mentioning "upload" (case-insensitive) collapses to the
/// generic upload message; everything else passes through untouched.
///
/// This sniffs strings, so unrelated errors that happen to say "upload" are
/// reported as upload failures too. Keep all callers going through here so
/// the rule can be swapped for a structured error kind in one place.
pub fn classify_preparation_error(err: StudioError) -> StudioError {
    if err.to_string().to_lowercase().contains("upload") {
        return StudioError::UploadFailed(UPLOAD_FAILED_MESSAGE.to_string());
    }
    err
}
