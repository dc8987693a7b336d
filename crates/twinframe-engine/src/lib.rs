pub mod coordinator;
pub mod download;
pub mod generate;
pub mod studio;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_support;

pub use coordinator::UploadCoordinator;
pub use download::{DownloadClient, DownloadedImage, ImageDownloader};
pub use generate::{
    default_generator_registry, DryrunGenerator, GeneratorRegistry, HttpGenerator, ImageGenerator,
};
pub use studio::{GenerateOutcome, Studio};
pub use upload::{AssetUploader, HttpUploader};
