mod advisory;
mod classify;
mod config;
mod cookies;
mod download;
mod engine;
mod error;
mod files;
mod instagram;
mod quality;
mod registry;
mod routes;
mod sanitize;
mod serve;
mod upgrade;
mod youtube;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::{
    config::{DEFAULT_LOG_FILTER, Settings},
    download::Downloader,
    engine::{MediaEngine, YtDlp},
    error::ApiError,
    registry::DownloadRegistry,
    routes::{AppState, app, build_cors_layer},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let settings = Settings::from_env();

    tokio::fs::create_dir_all(&settings.download_dir)
        .await
        .map_err(|error| {
            ApiError::internal(format!(
                "Could not create download directory {}: {error}",
                settings.download_dir.display()
            ))
        })?;

    let engine: Arc<dyn MediaEngine> = Arc::new(YtDlp::new(&settings));
    upgrade::upgrade_engine(engine.as_ref(), &settings).await;

    if let Some(max_age) = settings.download_retention {
        files::prune_stale_downloads(&settings.download_dir, max_age).await;
    }

    let downloader = Downloader::new(
        engine,
        settings.download_dir.clone(),
        Arc::new(DownloadRegistry::new(settings.registry_capacity)),
        settings.cookies_browser.clone(),
    );
    let state = AppState {
        downloader: Arc::new(downloader),
        download_retention: settings.download_retention,
    };

    let cors = build_cors_layer(&settings.allowed_origins)?;
    let router = app(state, cors);

    let addr = &settings.bind_addr;
    let listener = TcpListener::bind(addr).await.map_err(|error| {
        ApiError::internal(format!("Could not bind {addr}: {error}"))
    })?;

    info!("Starting video downloader server...");
    info!("Downloads will be saved to: {}", settings.download_dir.display());
    info!("Server listening on http://{addr}");

    axum::serve(listener, router)
        .await
        .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}
