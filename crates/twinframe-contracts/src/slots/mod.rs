use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StudioConfig;
use crate::errors::StudioError;
use crate::files::{FileSignature, LocalFile};

mod preview;

pub use preview::{PreviewEntry, PreviewHandle, PreviewRegistry};

/// Remembered result of the last successful upload for a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedAsset {
    pub signature: FileSignature,
    pub remote_url: String,
}

#[derive(Debug, Default)]
pub struct Slot {
    file: Option<LocalFile>,
    preview: Option<PreviewHandle>,
    uploaded: Option<UploadedAsset>,
}

impl Slot {
    pub fn file(&self) -> Option<&LocalFile> {
        self.file.as_ref()
    }

    pub fn preview(&self) -> Option<&PreviewHandle> {
        self.preview.as_ref()
    }

    pub fn uploaded_asset(&self) -> Option<&UploadedAsset> {
        self.uploaded.as_ref()
    }

    pub fn signature(&self) -> Option<FileSignature> {
        self.file.as_ref().map(LocalFile::signature)
    }

    /// The cached URL, but only while it still belongs to the current file.
    pub fn reusable_url(&self) -> Option<&str> {
        let signature = self.signature()?;
        self.uploaded
            .as_ref()
            .filter(|asset| asset.signature == signature)
            .map(|asset| asset.remote_url.as_str())
    }

    pub fn is_uploaded(&self) -> bool {
        self.reusable_url().is_some()
    }
}

/// What the upload coordinator has to do for one slot, captured at the time
/// the plan was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotUpload {
    Cached(String),
    Pending {
        file: LocalFile,
        signature: FileSignature,
    },
}

/// Fixed-size, ordered reference-image slots.
///
/// Each filled slot owns exactly one live preview handle. Handles are
/// released when the file is replaced or cleared and when the store is torn
/// down or dropped.
#[derive(Debug)]
pub struct SlotStore {
    slots: Vec<Slot>,
    max_file_bytes: u64,
    previews: PreviewRegistry,
}

impl SlotStore {
    pub fn new(slot_count: usize, max_file_bytes: u64) -> Self {
        Self::with_previews(slot_count, max_file_bytes, PreviewRegistry::new())
    }

    pub fn from_config(config: &StudioConfig) -> Self {
        Self::new(config.slot_count, config.max_file_bytes)
    }

    pub fn with_previews(
        slot_count: usize,
        max_file_bytes: u64,
        previews: PreviewRegistry,
    ) -> Self {
        Self {
            slots: (0..slot_count).map(|_| Slot::default()).collect(),
            max_file_bytes,
            previews,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    pub fn validate(&self, file: &LocalFile) -> Result<(), StudioError> {
        if !file.is_image() {
            return Err(StudioError::InvalidType {
                mime_type: file.mime_type().to_string(),
            });
        }
        if file.size() > self.max_file_bytes {
            return Err(StudioError::TooLarge {
                size: file.size(),
                max_bytes: self.max_file_bytes,
            });
        }
        Ok(())
    }

    /// Replaces the file at `index`. `None` clears the slot.
    ///
    /// A rejected file leaves the slot untouched. The cached upload survives
    /// only when the new file has the same signature as the cached one.
    pub fn set_slot(&mut self, index: usize, file: Option<LocalFile>) -> Result<(), StudioError> {
        let slot_count = self.slots.len();
        if index >= slot_count {
            return Err(StudioError::InvalidSlot { index, slot_count });
        }
        if let Some(file) = file.as_ref() {
            self.validate(file)?;
        }

        let previews = self.previews.clone();
        let slot = &mut self.slots[index];
        if let Some(previous) = slot.preview.take() {
            previews.release(previous);
        }

        let keep_cache = match (file.as_ref(), slot.uploaded.as_ref()) {
            (Some(file), Some(asset)) => asset.signature == file.signature(),
            _ => false,
        };
        if !keep_cache {
            slot.uploaded = None;
        }

        slot.preview = file.as_ref().map(|file| previews.create(file));
        debug!(
            slot = index,
            file = file.as_ref().map(LocalFile::name),
            kept_upload = keep_cache,
            "slot updated"
        );
        slot.file = file;
        Ok(())
    }

    pub fn clear_slot(&mut self, index: usize) -> Result<(), StudioError> {
        self.set_slot(index, None)
    }

    pub fn all_slots_ready(&self) -> bool {
        self.slots.iter().all(|slot| slot.file.is_some())
    }

    pub fn all_slots_uploaded(&self) -> bool {
        self.slots.iter().all(Slot::is_uploaded)
    }

    /// Snapshot of per-slot upload work, in slot order.
    pub fn upload_plan(&self) -> Result<Vec<SlotUpload>, StudioError> {
        self.slots
            .iter()
            .map(|slot| {
                let file = slot.file.as_ref().ok_or(StudioError::MissingImage)?;
                if let Some(url) = slot.reusable_url() {
                    return Ok(SlotUpload::Cached(url.to_string()));
                }
                Ok(SlotUpload::Pending {
                    file: file.clone(),
                    signature: file.signature(),
                })
            })
            .collect()
    }

    /// Writes the cache entry for `index`. The entry is kept even if the slot
    /// has since moved on to another file; it just never matches that file.
    pub fn record_upload(&mut self, index: usize, asset: UploadedAsset) -> Result<(), StudioError> {
        let slot_count = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(StudioError::InvalidSlot { index, slot_count })?;
        slot.uploaded = Some(asset);
        Ok(())
    }

    /// Releases every preview handle and empties all slots.
    pub fn teardown(&mut self) {
        for slot in &mut self.slots {
            if let Some(handle) = slot.preview.take() {
                self.previews.release(handle);
            }
            slot.file = None;
            slot.uploaded = None;
        }
    }
}

impl Drop for SlotStore {
    fn drop(&mut self) {
        self.teardown();
    }
}
