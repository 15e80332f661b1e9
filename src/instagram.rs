use tracing::info;

use crate::{
    advisory::advisory,
    download::{DownloadOutcome, Downloader},
    engine::{DownloadOptions, ProbeOptions, output_template},
    error::{DownloadError, EngineError},
    registry::DownloadedFileRecord,
    sanitize::sanitize_filename,
};

const INSTAGRAM_HEADERS: [(&str, &str); 7] = [
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    ),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("Referer", "https://www.instagram.com/"),
    ("Origin", "https://www.instagram.com"),
    ("Connection", "keep-alive"),
    ("Upgrade-Insecure-Requests", "1"),
];

const DEFAULT_TITLE: &str = "instagram_video";

pub fn plan_options(output_template: String) -> DownloadOptions {
    DownloadOptions {
        format: "best".to_string(),
        output_template,
        merge_output_format: Some("mp4".to_string()),
        no_playlist: true,
        http_headers: INSTAGRAM_HEADERS
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        extractor_retries: 3,
        retries: 10,
        fragment_retries: 10,
        quiet: true,
        ignore_errors: true,
        ..Default::default()
    }
}

impl Downloader {
    /// Single pass: probe for a title, then download with the engine's own
    /// reported output path taken as the result.
    pub async fn download_instagram(&self, url: &str) -> Result<DownloadOutcome, DownloadError> {
        info!("Starting Instagram download for URL: {url}");
        tokio::fs::create_dir_all(&self.download_dir).await?;

        let probe = ProbeOptions {
            quiet: true,
            ..Default::default()
        };
        let video_info = self
            .engine
            .probe(url, &probe)
            .await?
            .ok_or(DownloadError::NoInfo)?;

        let title = video_info
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let safe_title = sanitize_filename(&title);

        let options = plan_options(output_template(&self.download_dir, &safe_title));
        let report = self.engine.fetch(url, &options).await?;

        let filename = report
            .output_path
            .as_deref()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                EngineError::InvalidOutput("no output file was reported".to_string())
            })?;

        let path = self.download_dir.join(&filename);
        let size = advisory(
            "reading downloaded file size",
            tokio::fs::metadata(&path).await,
        )
        .map(|metadata| metadata.len());

        if let Some(size) = size {
            info!("Successfully downloaded: {filename} ({size} bytes)");
            self.registry
                .record(DownloadedFileRecord::new(
                    filename.clone(),
                    path,
                    url,
                    &title,
                    size,
                ))
                .await;
        }

        Ok(DownloadOutcome {
            filename,
            title,
            size,
        })
    }
}
