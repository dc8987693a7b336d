use std::sync::Arc;

use tracing::debug;

use super::GenerateImageResponse;
use crate::slots::{PreviewHandle, PreviewRegistry};

pub const NO_IMAGE_RETURNED_MESSAGE: &str = "The generator did not return an image.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GenerationState {
    #[default]
    Idle,
    Loading,
    Succeeded {
        image_url: String,
        revised_prompt: Option<String>,
    },
    Failed {
        message: String,
    },
}

/// The single generated-image artifact and everything hanging off it: the
/// open/closed preview and a locally held copy of the downloaded bytes.
#[derive(Debug, Default)]
pub struct ResultLifecycle {
    state: GenerationState,
    preview_open: bool,
    previews: PreviewRegistry,
    download: Option<PreviewHandle>,
}

impl ResultLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, GenerationState::Loading)
    }

    pub fn image_url(&self) -> Option<&str> {
        match &self.state {
            GenerationState::Succeeded { image_url, .. } => Some(image_url.as_str()),
            _ => None,
        }
    }

    pub fn revised_prompt(&self) -> Option<&str> {
        match &self.state {
            GenerationState::Succeeded { revised_prompt, .. } => revised_prompt.as_deref(),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            GenerationState::Failed { message } => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn preview_open(&self) -> bool {
        self.preview_open && self.image_url().is_some()
    }

    /// Enters `Loading`. Returns false, leaving everything as is, when a
    /// request is already in flight.
    pub fn begin(&mut self) -> bool {
        if self.is_loading() {
            return false;
        }
        self.release_download();
        self.preview_open = false;
        self.state = GenerationState::Loading;
        debug!("generation started");
        true
    }

    /// Settles a `Loading` result with the generator's reply. Replies that
    /// arrive after a reset are dropped and false is returned.
    pub fn finish(&mut self, response: GenerateImageResponse) -> bool {
        if !self.is_loading() {
            debug!("dropping generation reply that arrived after reset");
            return false;
        }
        let error = response.error.filter(|value| !value.trim().is_empty());
        let image_url = response.image_url.filter(|value| !value.trim().is_empty());
        self.state = match (error, image_url) {
            (Some(message), _) => GenerationState::Failed { message },
            (None, Some(image_url)) => GenerationState::Succeeded {
                image_url,
                revised_prompt: response.revised_prompt,
            },
            (None, None) => GenerationState::Failed {
                message: NO_IMAGE_RETURNED_MESSAGE.to_string(),
            },
        };
        true
    }

    pub fn reset(&mut self) {
        self.release_download();
        self.preview_open = false;
        if self.state != GenerationState::Idle {
            debug!("generation result reset");
        }
        self.state = GenerationState::Idle;
    }

    pub fn open_preview(&mut self) -> bool {
        self.preview_open = self.image_url().is_some();
        self.preview_open
    }

    pub fn close_preview(&mut self) {
        self.preview_open = false;
    }

    /// Keeps downloaded bytes for the current image, replacing any earlier
    /// copy. Ignored unless a generated image is present.
    pub fn attach_download(
        &mut self,
        filename: &str,
        mime_type: &str,
        data: Arc<[u8]>,
    ) -> Option<&PreviewHandle> {
        self.image_url()?;
        self.release_download();
        self.download = Some(self.previews.create_from(filename, mime_type, data));
        self.download.as_ref()
    }

    pub fn download(&self) -> Option<&PreviewHandle> {
        self.download.as_ref()
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    fn release_download(&mut self) {
        if let Some(handle) = self.download.take() {
            self.previews.release(handle);
        }
    }
}

impl Drop for ResultLifecycle {
    fn drop(&mut self) {
        self.release_download();
    }
}
