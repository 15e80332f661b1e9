use std::path::PathBuf;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            success: false,
            error: self.message,
        });

        (self.status, body).into_response()
    }
}

/// Failures of a single extraction engine invocation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("yt-dlp is not installed; install it and restart the server")]
    NotInstalled,
    #[error("could not run yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("yt-dlp did not finish within {0} seconds")]
    TimedOut(u64),
    #[error("{0}")]
    Failed(String),
    #[error("unexpected yt-dlp output: {0}")]
    InvalidOutput(String),
}

/// Failures of a download request. The display text is what the client sees
/// in the `error` field.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Could not get video information")]
    NoInfo,
    #[error("Failed to get video information: {0}")]
    Probe(#[source] EngineError),
    #[error("Download failed: {0}")]
    Fetch(#[source] EngineError),
    #[error("Downloaded file not found or too small. Expected: {}", expected.display())]
    NotFound { expected: PathBuf },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("An error occurred: {0}")]
    Io(#[from] std::io::Error),
}
