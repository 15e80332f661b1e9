use std::{collections::BTreeSet, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderValue, Method, header::CONTENT_DISPOSITION},
    response::{Html, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info};
use url::Url;

use crate::{
    classify::{UrlKind, classify},
    download::{DownloadResult, Downloader},
    error::ApiError,
    files,
    quality::Quality,
    registry::DownloadedFileRecord,
    serve::{ServeError, serve_download},
};

const INDEX_HTML: &str = include_str!("../static/index.html");
const UNSUPPORTED_URL: &str = "Unsupported URL. Only YouTube and Instagram URLs are supported.";

#[derive(Clone)]
pub struct AppState {
    pub downloader: Arc<Downloader>,
    pub download_retention: Option<Duration>,
}

/// Body of `POST /download` as sent by clients. `quality` may arrive as a
/// string or a bare number.
#[derive(Debug, Deserialize)]
pub struct DownloadPayload {
    url: Option<String>,
    quality: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub quality: Quality,
}

impl DownloadPayload {
    fn into_request(self) -> Option<DownloadRequest> {
        let url = self
            .url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())?;
        let quality = match self.quality {
            Some(serde_json::Value::String(value)) => Quality::parse(Some(&value)),
            Some(serde_json::Value::Number(value)) => Quality::parse(Some(&value.to_string())),
            _ => Quality::default(),
        };
        Some(DownloadRequest { url, quality })
    }
}

pub fn app(state: AppState, cors: Option<CorsLayer>) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/downloads", get(list_downloads))
        .route("/download", post(download))
        .route("/download_file/{*filename}", get(download_file))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn list_downloads(State(state): State<AppState>) -> Json<Vec<DownloadedFileRecord>> {
    Json(state.downloader.registry().list().await)
}

async fn download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadPayload>, JsonRejection>,
) -> Result<Json<DownloadResult>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        ApiError::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    })?;
    let request = payload
        .into_request()
        .ok_or_else(|| ApiError::bad_request("No URL provided"))?;

    if let Some(max_age) = state.download_retention {
        files::prune_stale_downloads(state.downloader.download_dir(), max_age).await;
        state.downloader.registry().forget_missing().await;
    }

    let result = match classify(&request.url) {
        UrlKind::YouTube => state
            .downloader
            .download_youtube(&request.url, request.quality)
            .await
            .into(),
        UrlKind::Instagram => state.downloader.download_instagram(&request.url).await.into(),
        UrlKind::Unsupported => {
            info!("Rejected unsupported URL: {}", request.url);
            DownloadResult::failure(UNSUPPORTED_URL)
        }
    };

    Ok(Json(result))
}

async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ServeError> {
    if let Some(record) = state.downloader.registry().get(&filename).await {
        debug!("Serving recorded download {} from {}", record.filename, record.url);
    }
    serve_download(state.downloader.download_dir(), &filename).await
}

/// CORS for the configured allow-list, or `None` when no origins are set.
/// Every entry must be a bare `scheme://host[:port]` origin.
pub fn build_cors_layer(origins: &[String]) -> Result<Option<CorsLayer>, ApiError> {
    if origins.is_empty() {
        return Ok(None);
    }

    let mut allowed = BTreeSet::new();
    for origin in origins {
        let normalized = normalize_origin(origin).ok_or_else(|| {
            ApiError::internal(format!(
                "ALLOWED_ORIGINS entry {origin:?} is not an http(s) origin"
            ))
        })?;
        allowed.insert(normalized);
    }
    info!("CORS enabled for: {}", allowed.iter().cloned().collect::<Vec<_>>().join(", "));

    let header_values = allowed
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|error| ApiError::internal(format!("Bad CORS origin {origin}: {error}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(header_values))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any)
            .expose_headers([CONTENT_DISPOSITION]),
    ))
}

/// Reduces an origin to the form browsers send in the `Origin` header.
fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value.trim()).ok()?;
    let bare = parsed.path() == "/" && parsed.query().is_none() && parsed.fragment().is_none();
    if !bare || !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    Some(parsed.origin().ascii_serialization())
}
