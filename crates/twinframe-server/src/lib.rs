pub mod api;
pub mod config;
pub mod storage;

use std::path::Path;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;

pub use api::{ApiError, AppState};
pub use config::ServerConfig;
pub use storage::{LocalStorage, StorageProvider};

/// Headroom over the file ceiling for multipart framing and the folder field.
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

pub fn router(state: AppState, files_dir: &Path) -> Router {
    let upload_limit = (state.max_file_bytes + MULTIPART_OVERHEAD_BYTES) as usize;
    Router::new()
        .route("/health", get(api::health))
        .route(
            "/api/storage/upload",
            post(api::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/download-image", post(api::download_image))
        .nest_service("/files", ServeDir::new(files_dir))
        .with_state(state)
}
