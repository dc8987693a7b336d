use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::files::LocalFile;

/// Display handle for a local image. Not `Clone`: whoever holds it owns the
/// live registry entry and must hand it back through [`PreviewRegistry::release`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct PreviewHandle {
    id: String,
}

impl PreviewHandle {
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewEntry {
    pub name: String,
    pub mime_type: String,
    pub data: Arc<[u8]>,
}

/// Registry of live preview handles, shared by cloning.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    inner: Arc<Mutex<HashMap<String, PreviewEntry>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, file: &LocalFile) -> PreviewHandle {
        self.create_from(file.name(), file.mime_type(), file.data())
    }

    pub fn create_from(
        &self,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Arc<[u8]>,
    ) -> PreviewHandle {
        let id = format!("blob:twinframe/{}", uuid::Uuid::new_v4());
        self.inner.lock().insert(
            id.clone(),
            PreviewEntry {
                name: name.into(),
                mime_type: mime_type.into(),
                data,
            },
        );
        PreviewHandle { id }
    }

    /// Returns false if the handle was already gone, which only happens when
    /// a handle from another registry is passed in.
    pub fn release(&self, handle: PreviewHandle) -> bool {
        self.inner.lock().remove(&handle.id).is_some()
    }

    pub fn resolve(&self, handle: &PreviewHandle) -> Option<PreviewEntry> {
        self.inner.lock().get(&handle.id).cloned()
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.inner.lock().contains_key(id)
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_release_tracks_live_handles() {
        let registry = PreviewRegistry::new();
        let file = LocalFile::new("a.png", "image/png", 1, vec![1u8, 2, 3]);

        let first = registry.create(&file);
        let second = registry.create(&file);
        assert_ne!(first.id(), second.id());
        assert!(first.id().starts_with("blob:twinframe/"));
        assert_eq!(registry.live_count(), 2);

        let entry = registry.resolve(&first).map(|entry| entry.name);
        assert_eq!(entry.as_deref(), Some("a.png"));

        let first_id = first.id().to_string();
        assert!(registry.release(first));
        assert!(!registry.is_live(&first_id));
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn release_from_foreign_registry_is_reported() {
        let mine = PreviewRegistry::new();
        let theirs = PreviewRegistry::new();
        let handle = theirs.create_from("b.png", "image/png", Arc::from(vec![0u8]));
        assert!(!mine.release(handle));
        assert_eq!(theirs.live_count(), 1);
    }
}
