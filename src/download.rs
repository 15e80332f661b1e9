use std::{path::PathBuf, sync::Arc};

use serde::Serialize;
use tracing::error;

use crate::{engine::MediaEngine, error::DownloadError, registry::DownloadRegistry};

/// Everything a download needs, shared by the YouTube and Instagram paths.
pub struct Downloader {
    pub(crate) engine: Arc<dyn MediaEngine>,
    pub(crate) download_dir: PathBuf,
    pub(crate) registry: Arc<DownloadRegistry>,
    pub(crate) cookies_browser: Option<String>,
}

impl Downloader {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        download_dir: PathBuf,
        registry: Arc<DownloadRegistry>,
        cookies_browser: Option<String>,
    ) -> Self {
        Self {
            engine,
            download_dir,
            registry,
            cookies_browser,
        }
    }

    pub fn download_dir(&self) -> &std::path::Path {
        &self.download_dir
    }

    pub fn registry(&self) -> &DownloadRegistry {
        &self.registry
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub filename: String,
    pub title: String,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl DownloadResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

impl From<Result<DownloadOutcome, DownloadError>> for DownloadResult {
    fn from(result: Result<DownloadOutcome, DownloadError>) -> Self {
        match result {
            Ok(outcome) => Self {
                success: true,
                download_url: Some(format!(
                    "/download_file/{}",
                    urlencoding::encode(&outcome.filename)
                )),
                filename: Some(outcome.filename),
                title: Some(outcome.title),
                size: outcome.size,
                error: None,
            },
            Err(download_error) => {
                error!("Download failed: {download_error}");
                Self::failure(download_error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_links_to_encoded_file() {
        let result = DownloadResult::from(Ok(DownloadOutcome {
            filename: "My clip #1.mp4".to_string(),
            title: "My clip #1".to_string(),
            size: Some(2048),
        }));

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["filename"], "My clip #1.mp4");
        assert_eq!(value["size"], 2048);
        assert_eq!(value["download_url"], "/download_file/My%20clip%20%231.mp4");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn failure_only_carries_the_message() {
        let result = DownloadResult::from(Err(DownloadError::NoInfo));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"success": false, "error": "Could not get video information"})
        );
    }
}
