use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use twinframe_contracts::config::StudioConfig;
use twinframe_contracts::errors::{
    classify_preparation_error, StudioError, DOWNLOAD_FAILED_MESSAGE,
};
use twinframe_contracts::files::LocalFile;
use twinframe_contracts::generation::{
    GenerateImageRequest, GenerationState, PresetRegistry, ResultLifecycle,
};
use twinframe_contracts::slots::SlotStore;

use crate::coordinator::UploadCoordinator;
use crate::download::{DownloadClient, DownloadedImage, ImageDownloader};
use crate::generate::{HttpGenerator, ImageGenerator};
use crate::upload::{AssetUploader, HttpUploader};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// Another trigger is still outstanding; nothing was done.
    Busy,
    /// A local gate or the upload phase stopped the request.
    Rejected(StudioError),
    /// The generator answered. The state may be `Failed` with its message.
    Finished(GenerationState),
}

impl GenerateOutcome {
    /// The generated image URL and revised prompt. A generator failure turns
    /// into [`StudioError::GenerationFailed`] with its message untouched.
    /// `Ok(None)` when nothing was produced: busy, or the reply was dropped
    /// by a reset.
    pub fn into_image(self) -> Result<Option<(String, Option<String>)>, StudioError> {
        match self {
            GenerateOutcome::Finished(GenerationState::Succeeded {
                image_url,
                revised_prompt,
            }) => Ok(Some((image_url, revised_prompt))),
            GenerateOutcome::Finished(GenerationState::Failed { message }) => {
                Err(StudioError::GenerationFailed(message))
            }
            GenerateOutcome::Finished(_) | GenerateOutcome::Busy => Ok(None),
            GenerateOutcome::Rejected(err) => Err(err),
        }
    }
}

#[derive(Debug, Default)]
struct Banner {
    local_error: Option<StudioError>,
    prompt_open: bool,
    mode: Option<String>,
}

/// Owns the reference slots, the generated result, and the busy flags of
/// one editing session.
///
/// Methods take `&self` so a front end can keep polling state while a
/// `generate` or `download_result` future is pending. Locks are only held
/// between await points.
pub struct Studio {
    slots: Mutex<SlotStore>,
    result: Mutex<ResultLifecycle>,
    banner: Mutex<Banner>,
    uploads: UploadCoordinator,
    generator: Arc<dyn ImageGenerator>,
    downloader: Arc<dyn ImageDownloader>,
    presets: PresetRegistry,
    triggered: AtomicBool,
    downloading: AtomicBool,
}

impl Studio {
    pub fn new(
        config: &StudioConfig,
        uploader: Arc<dyn AssetUploader>,
        generator: Arc<dyn ImageGenerator>,
        downloader: Arc<dyn ImageDownloader>,
    ) -> Self {
        Self {
            slots: Mutex::new(SlotStore::from_config(config)),
            result: Mutex::new(ResultLifecycle::new()),
            banner: Mutex::new(Banner::default()),
            uploads: UploadCoordinator::new(uploader, config.upload_folder.clone()),
            generator,
            downloader,
            presets: PresetRegistry::default(),
            triggered: AtomicBool::new(false),
            downloading: AtomicBool::new(false),
        }
    }

    /// Studio wired to the HTTP endpoints named in `config`.
    pub fn from_config(config: &StudioConfig) -> Self {
        Self::new(
            config,
            Arc::new(HttpUploader::new(config.upload_url.clone())),
            Arc::new(HttpGenerator::new(config.generate_url.clone())),
            Arc::new(DownloadClient::new(config.download_url.clone())),
        )
    }

    pub fn with_generator(mut self, generator: Arc<dyn ImageGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn set_slot(&self, index: usize, file: Option<LocalFile>) -> Result<(), StudioError> {
        let outcome = self.slots.lock().set_slot(index, file);
        if let Err(err) = outcome {
            debug!(slot = index, error = %err, "slot input rejected");
            self.show_error(err.clone());
            return Err(err);
        }
        self.banner.lock().local_error = None;
        self.result.lock().reset();
        Ok(())
    }

    pub fn clear_slot(&self, index: usize) -> Result<(), StudioError> {
        self.set_slot(index, None)
    }

    pub fn all_slots_ready(&self) -> bool {
        self.slots.lock().all_slots_ready()
    }

    pub fn all_slots_uploaded(&self) -> bool {
        self.slots.lock().all_slots_uploaded()
    }

    pub fn with_slots<R>(&self, read: impl FnOnce(&SlotStore) -> R) -> R {
        read(&self.slots.lock())
    }

    pub async fn ensure_uploaded(&self) -> Result<Vec<String>, StudioError> {
        self.uploads.ensure_uploaded(&self.slots).await
    }

    pub fn is_uploading(&self) -> bool {
        self.uploads.is_uploading()
    }

    pub fn is_generating(&self) -> bool {
        self.result.lock().is_loading()
    }

    pub fn is_downloading(&self) -> bool {
        self.downloading.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.triggered.load(Ordering::SeqCst) || self.is_uploading() || self.is_generating()
    }

    /// Runs the whole trigger: gates, uploads, then one generation call.
    ///
    /// Image completeness and prompt emptiness are both checked before any
    /// network I/O. A call made while another is outstanding returns
    /// [`GenerateOutcome::Busy`] without touching any state.
    pub async fn generate(&self, prompt: &str) -> GenerateOutcome {
        if self.is_uploading() || self.is_generating() {
            return GenerateOutcome::Busy;
        }
        let Some(_claim) = TriggerClaim::acquire(&self.triggered) else {
            return GenerateOutcome::Busy;
        };

        self.banner.lock().local_error = None;
        if !self.all_slots_ready() {
            return self.reject(StudioError::MissingImage);
        }
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return self.reject(StudioError::MissingPrompt);
        }

        let image_urls = match self.ensure_uploaded().await {
            Ok(urls) => urls,
            Err(err) => {
                if err.is_local() {
                    debug!(error = %err, "generation request not prepared");
                } else {
                    warn!(error = %err, "failed to prepare generation request");
                }
                return self.reject(classify_preparation_error(err));
            }
        };

        if !self.result.lock().begin() {
            return GenerateOutcome::Busy;
        }
        let request = GenerateImageRequest {
            prompt: prompt.to_string(),
            image_urls,
        };
        info!(
            generator = self.generator.name(),
            images = request.image_urls.len(),
            "requesting generation"
        );
        let response = self.generator.generate(&request).await;

        let state = {
            let mut result = self.result.lock();
            if !result.finish(response) {
                debug!("generation reply discarded after reset");
            }
            result.state().clone()
        };
        match &state {
            GenerationState::Failed { message } => {
                warn!(%message, "generation failed");
                self.banner.lock().prompt_open = true;
            }
            GenerationState::Succeeded { image_url, .. } => {
                info!(%image_url, "generation finished");
            }
            _ => {}
        }
        GenerateOutcome::Finished(state)
    }

    pub fn result_state(&self) -> GenerationState {
        self.result.lock().state().clone()
    }

    pub fn generated_image_url(&self) -> Option<String> {
        self.result.lock().image_url().map(str::to_string)
    }

    pub fn revised_prompt(&self) -> Option<String> {
        self.result.lock().revised_prompt().map(str::to_string)
    }

    pub fn reset(&self) {
        self.result.lock().reset();
    }

    pub fn open_preview(&self) -> bool {
        self.result.lock().open_preview()
    }

    pub fn close_preview(&self) {
        self.result.lock().close_preview();
    }

    pub fn preview_open(&self) -> bool {
        self.result.lock().preview_open()
    }

    /// Downloads the generated image through the proxy and keeps a local
    /// copy on the result. `Ok(None)` when there is nothing to download or a
    /// download is already running.
    pub async fn download_result(&self) -> Result<Option<DownloadedImage>, StudioError> {
        let Some(image_url) = self.generated_image_url() else {
            return Ok(None);
        };
        let Some(_claim) = TriggerClaim::acquire(&self.downloading) else {
            return Ok(None);
        };

        match self.downloader.download(&image_url).await {
            Ok(image) => {
                self.result.lock().attach_download(
                    &image.filename,
                    &image.content_type,
                    Arc::from(image.data.as_slice()),
                );
                self.banner.lock().local_error = None;
                info!(
                    filename = %image.filename,
                    bytes = image.data.len(),
                    "generated image downloaded"
                );
                Ok(Some(image))
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to download generated image");
                let err = StudioError::DownloadFailed(DOWNLOAD_FAILED_MESSAGE.to_string());
                self.show_error(err.clone());
                Err(err)
            }
        }
    }

    pub fn presets(&self) -> &PresetRegistry {
        &self.presets
    }

    /// Switches to a preset and returns its prompt. Unknown keys change nothing.
    pub fn select_mode(&self, key: &str) -> Option<String> {
        let preset = self.presets.get(key)?;
        let mut banner = self.banner.lock();
        banner.mode = Some(preset.key.clone());
        banner.local_error = None;
        Some(preset.prompt.clone())
    }

    pub fn selected_mode(&self) -> Option<String> {
        self.banner.lock().mode.clone()
    }

    pub fn local_error(&self) -> Option<StudioError> {
        self.banner.lock().local_error.clone()
    }

    /// What the error banner shows: the local error first, then the
    /// generator's failure message.
    pub fn error_banner(&self) -> Option<String> {
        if let Some(err) = self.local_error() {
            return Some(err.to_string());
        }
        self.result.lock().error().map(str::to_string)
    }

    pub fn prompt_open(&self) -> bool {
        self.banner.lock().prompt_open
    }

    pub fn set_prompt_open(&self, open: bool) {
        self.banner.lock().prompt_open = open;
    }

    /// Empties every slot and resets the result, releasing all handles.
    pub fn teardown(&self) {
        self.slots.lock().teardown();
        self.result.lock().reset();
    }

    fn show_error(&self, err: StudioError) {
        let mut banner = self.banner.lock();
        banner.local_error = Some(err);
        banner.prompt_open = true;
    }

    fn reject(&self, err: StudioError) -> GenerateOutcome {
        self.show_error(err.clone());
        GenerateOutcome::Rejected(err)
    }
}

/// Claims a busy flag for the lifetime of the guard.
struct TriggerClaim<'a>(&'a AtomicBool);

impl<'a> TriggerClaim<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for TriggerClaim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
