use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use twinframe_server::config::ServerArgs;
use twinframe_server::{router, AppState, LocalStorage, ServerConfig};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("twinframe-server error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("twinframe=info,tower_http=info")),
        )
        .init();

    let config = ServerConfig::from_args(ServerArgs::parse())?;
    let storage = LocalStorage::new(&config.storage_dir, &config.public_url)?;
    info!(dir = %config.storage_dir.display(), public_url = %config.public_url, "storage ready");

    let app = router(AppState::new(Arc::new(storage)), &config.storage_dir);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed binding {}", config.bind))?;
    info!("listening on http://{}", config.bind);
    info!("  GET  /health");
    info!("  POST /api/storage/upload");
    info!("  POST /api/download-image");
    info!("  GET  /files/*");

    axum::serve(listener, app).await.context("server stopped")?;
    Ok(())
}
