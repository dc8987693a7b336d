use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use twinframe_contracts::errors::StudioError;
use twinframe_contracts::files::FileSignature;
use twinframe_contracts::slots::{SlotStore, SlotUpload, UploadedAsset};

use crate::upload::AssetUploader;

enum SlotOutcome {
    Cached(String),
    Uploaded {
        signature: FileSignature,
        url: String,
    },
    Failed(anyhow::Error),
}

/// Turns filled slots into remote URLs, uploading only what changed.
///
/// Pending uploads run concurrently on the calling task. The join waits for
/// every upload to settle, writes the cache entry of each one that succeeded,
/// and only then reports the first failure in slot order. A retry after a
/// partial failure therefore uploads just the slots that failed.
pub struct UploadCoordinator {
    uploader: Arc<dyn AssetUploader>,
    folder: Option<String>,
    in_flight_batches: AtomicUsize,
}

impl UploadCoordinator {
    pub fn new(uploader: Arc<dyn AssetUploader>, folder: Option<String>) -> Self {
        Self {
            uploader,
            folder,
            in_flight_batches: AtomicUsize::new(0),
        }
    }

    /// True while any batch with at least one real upload is in flight.
    /// Overlapping batches are counted, so the first to settle does not
    /// clear the flag for the others.
    pub fn is_uploading(&self) -> bool {
        self.in_flight_batches.load(Ordering::SeqCst) > 0
    }

    pub async fn ensure_uploaded(
        &self,
        slots: &Mutex<SlotStore>,
    ) -> Result<Vec<String>, StudioError> {
        let plan = slots.lock().upload_plan()?;
        let pending = plan
            .iter()
            .filter(|upload| matches!(upload, SlotUpload::Pending { .. }))
            .count();
        if pending == 0 {
            debug!(slots = plan.len(), "all slots already uploaded");
        } else {
            info!(pending, slots = plan.len(), "uploading reference images");
        }
        let _flag = (pending > 0).then(|| UploadingFlag::raise(&self.in_flight_batches));

        let folder = self.folder.as_deref();
        let outcomes = join_all(plan.into_iter().map(|upload| async move {
            match upload {
                SlotUpload::Cached(url) => SlotOutcome::Cached(url),
                SlotUpload::Pending { file, signature } => {
                    match self.uploader.upload(&file, folder).await {
                        Ok(uploaded) => SlotOutcome::Uploaded {
                            signature,
                            url: uploaded.url,
                        },
                        Err(err) => SlotOutcome::Failed(err),
                    }
                }
            }
        }))
        .await;

        let mut urls = Vec::with_capacity(outcomes.len());
        let mut first_failure: Option<String> = None;
        let mut slots = slots.lock();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                SlotOutcome::Cached(url) => urls.push(url),
                SlotOutcome::Uploaded { signature, url } => {
                    slots.record_upload(
                        index,
                        UploadedAsset {
                            signature,
                            remote_url: url.clone(),
                        },
                    )?;
                    urls.push(url);
                }
                SlotOutcome::Failed(err) => {
                    let message = format!("{err:#}");
                    warn!(slot = index, error = %message, "reference image upload failed");
                    first_failure.get_or_insert(message);
                }
            }
        }

        match first_failure {
            Some(message) => Err(StudioError::UploadFailed(message)),
            None => Ok(urls),
        }
    }
}

/// Counts one in-flight batch until dropped, including by a dropped future.
struct UploadingFlag<'a>(&'a AtomicUsize);

impl<'a> UploadingFlag<'a> {
    fn raise(batches: &'a AtomicUsize) -> Self {
        batches.fetch_add(1, Ordering::SeqCst);
        Self(batches)
    }
}

impl Drop for UploadingFlag<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
