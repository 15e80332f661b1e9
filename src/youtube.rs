use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::{
    advisory::{self, advisory},
    cookies::detect_browser_profile,
    download::{DownloadOutcome, Downloader},
    engine::{DownloadOptions, VideoInfo, output_template},
    error::{DownloadError, EngineError},
    files::{self, MIN_DOWNLOAD_BYTES},
    quality::Quality,
    registry::DownloadedFileRecord,
    sanitize::sanitize_filename,
};

const BROWSER_HEADERS: [(&str, &str); 12] = [
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36",
    ),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("Accept-Encoding", "gzip, deflate, br"),
    ("Dnt", "1"),
    ("Connection", "keep-alive"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Sec-Fetch-User", "?1"),
    ("Cache-Control", "max-age=0"),
];

/// ffmpeg arguments forcing H.264 output with broadly compatible pixels.
const H264_ARGS: [&str; 8] = [
    "-c:v", "libx264", "-crf", "18", "-preset", "slow", "-pix_fmt", "yuv420p",
];

const EXTRACTOR_ARGS: &str = "youtube:player_skip=webpage;skip=dash,hls;player_client=android,web";

const EXTRACTOR_RETRIES: u32 = 3;
const NETWORK_RETRIES: u32 = 5;
const FRAGMENT_RETRIES: u32 = 5;

/// Builds the engine options for a YouTube download at the given quality.
pub fn plan_options(
    quality: Quality,
    output_template: String,
    cookies_browser: Option<String>,
) -> DownloadOptions {
    DownloadOptions {
        format: quality.format_selector().to_string(),
        output_template,
        merge_output_format: quality.merges_streams().then(|| "mp4".to_string()),
        no_playlist: true,
        recode_video: Some("mp4".to_string()),
        postprocessor_args: H264_ARGS.iter().map(ToString::to_string).collect(),
        http_headers: BROWSER_HEADERS
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        extractor_retries: EXTRACTOR_RETRIES,
        retries: NETWORK_RETRIES,
        fragment_retries: FRAGMENT_RETRIES,
        extractor_args: Some(EXTRACTOR_ARGS.to_string()),
        cookies_from_browser: cookies_browser,
        quiet: false,
        ignore_errors: false,
        no_check_certificates: true,
    }
}

impl Downloader {
    /// Probe, plan, pre-clean, fetch, then resolve the file the engine
    /// actually produced.
    pub async fn download_youtube(
        &self,
        url: &str,
        quality: Quality,
    ) -> Result<DownloadOutcome, DownloadError> {
        info!("Starting download for URL: {url}");
        tokio::fs::create_dir_all(&self.download_dir).await?;

        let cookies_browser = self.cookies_browser.as_deref().and_then(|browser| {
            advisory("browser cookie extraction", detect_browser_profile(browser))
                .map(|_| browser.to_string())
        });

        let mut options = plan_options(
            quality,
            output_template(&self.download_dir, "video"),
            cookies_browser,
        );

        info!("Fetching video info...");
        let video_info = self
            .probe_with_cookie_fallback(url, &mut options)
            .await
            .map_err(DownloadError::Probe)?
            .ok_or(DownloadError::NoInfo)?;
        if let Some(id) = &video_info.id {
            info!("Video id: {id}");
        }

        let raw_title = video_info
            .title
            .filter(|title| !title.trim().is_empty());
        let safe_title = sanitize_filename(raw_title.as_deref().unwrap_or("video"));
        options.output_template = output_template(&self.download_dir, &safe_title);

        let planned = self.download_dir.join(format!("{safe_title}.mp4"));
        info!("Output path: {}", planned.display());

        if advisory::remove_file("pre-clean of existing file", &planned).await {
            info!("Removed existing file: {}", planned.display());
        }

        let report = match self.engine.fetch(url, &options).await {
            Ok(report) => report,
            Err(engine_error) => {
                warn!("Download failed: {engine_error}");
                files::remove_partials(&self.download_dir, &safe_title, &planned).await;
                return Err(DownloadError::Fetch(engine_error));
            }
        };
        if let Some(reported) = &report.output_path {
            info!("Engine reported output: {}", reported.display());
        }

        let (path, filename, size) = self.resolve_output(&planned, &safe_title).await?;

        self.registry
            .record(DownloadedFileRecord::new(
                filename.clone(),
                path,
                url,
                raw_title.as_deref().unwrap_or("Unknown"),
                size,
            ))
            .await;

        Ok(DownloadOutcome {
            filename,
            title: raw_title.unwrap_or_else(|| "Downloaded Video".to_string()),
            size: Some(size),
        })
    }

    /// The engine reads browser cookies itself, so a cookie problem first
    /// shows up as a failed probe. Such a failure is advisory: the probe is
    /// repeated without cookies and the rest of the download drops them too.
    async fn probe_with_cookie_fallback(
        &self,
        url: &str,
        options: &mut DownloadOptions,
    ) -> Result<Option<VideoInfo>, EngineError> {
        match self.engine.probe(url, &options.probe_options()).await {
            Err(engine_error) if options.cookies_from_browser.is_some() => {
                advisory::<(), _>("browser cookie extraction", Err(engine_error));
                options.cookies_from_browser = None;
                info!("Retrying video info without browser cookies...");
                self.engine.probe(url, &options.probe_options()).await
            }
            result => result,
        }
    }

    async fn resolve_output(
        &self,
        planned: &Path,
        safe_title: &str,
    ) -> Result<(PathBuf, String, u64), DownloadError> {
        if let Some(size) = files::sized_file(planned, MIN_DOWNLOAD_BYTES).await? {
            let filename = planned
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("{safe_title}.mp4"));
            info!("Successfully downloaded: {filename} ({size} bytes)");
            return Ok((planned.to_path_buf(), filename, size));
        }

        match files::find_by_prefix(&self.download_dir, safe_title, MIN_DOWNLOAD_BYTES, true).await? {
            Some(found) => {
                info!(
                    "Found downloaded file with different name: {} ({} bytes)",
                    found.name, found.size
                );
                Ok((found.path, found.name, found.size))
            }
            None => Err(DownloadError::NotFound {
                expected: planned.to_path_buf(),
            }),
        }
    }
}
