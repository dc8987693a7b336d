use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use twinframe_contracts::files::{LocalFile, UploadedFile};
use twinframe_contracts::generation::{GenerateImageRequest, GenerateImageResponse};

use crate::download::{DownloadedImage, ImageDownloader};
use crate::generate::ImageGenerator;
use crate::upload::AssetUploader;

pub(crate) fn jpeg(name: &str, modified_ms: i64) -> LocalFile {
    LocalFile::new(name, "image/jpeg", modified_ms, vec![0u8; 1024 * 1024])
}

async fn settle() {
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }
}

/// Records every upload and answers `https://cdn.test/<name>` after yielding,
/// so sibling uploads genuinely interleave.
#[derive(Default)]
pub(crate) struct FakeUploader {
    calls: Mutex<Vec<(String, Option<String>)>>,
    failing: Mutex<HashSet<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeUploader {
    pub(crate) fn failing(names: &[&str]) -> Self {
        let uploader = Self::default();
        uploader
            .failing
            .lock()
            .extend(names.iter().map(|name| name.to_string()));
        uploader
    }

    pub(crate) fn heal(&self) {
        self.failing.lock().clear();
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    pub(crate) fn folders(&self) -> Vec<Option<String>> {
        self.calls.lock().iter().map(|(_, folder)| folder.clone()).collect()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_for_calls(&self, count: usize) {
        while self.calls() < count {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl AssetUploader for FakeUploader {
    async fn upload(&self, file: &LocalFile, folder: Option<&str>) -> Result<UploadedFile> {
        self.calls
            .lock()
            .push((file.name().to_string(), folder.map(str::to_string)));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        settle().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().contains(file.name()) {
            bail!("storage offline for {}", file.name());
        }
        Ok(UploadedFile {
            url: format!("https://cdn.test/{}", file.name()),
            key: Some(file.name().to_string()),
        })
    }
}

pub(crate) struct FakeGenerator {
    requests: Mutex<Vec<GenerateImageRequest>>,
    reply: Mutex<GenerateImageResponse>,
}

impl Default for FakeGenerator {
    fn default() -> Self {
        Self::replying(GenerateImageResponse::image("https://cdn.test/generated/out.png"))
    }
}

impl FakeGenerator {
    pub(crate) fn replying(reply: GenerateImageResponse) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            reply: Mutex::new(reply),
        }
    }

    pub(crate) fn requests(&self) -> Vec<GenerateImageRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, request: &GenerateImageRequest) -> GenerateImageResponse {
        self.requests.lock().push(request.clone());
        settle().await;
        self.reply.lock().clone()
    }
}

#[derive(Default)]
pub(crate) struct FakeDownloader {
    fail: bool,
    urls: Mutex<Vec<String>>,
}

impl FakeDownloader {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl ImageDownloader for FakeDownloader {
    async fn download(&self, image_url: &str) -> Result<DownloadedImage> {
        self.urls.lock().push(image_url.to_string());
        settle().await;
        if self.fail {
            bail!("Upstream download failed with status 404");
        }
        Ok(DownloadedImage {
            filename: "out.png".to_string(),
            content_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        })
    }
}
