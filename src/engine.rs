//! Seam between the download orchestrators and the external extraction
//! engine. The only production engine is the `yt-dlp` executable, which in
//! turn drives `ffmpeg` for merging and transcoding.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Output,
    time::Duration,
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{process::Command, time::timeout};
use tracing::{debug, error, warn};

use crate::{config::Settings, error::EngineError};

/// Metadata returned by a probe. Only the fields the orchestrators consume
/// are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    pub id: Option<String>,
    pub title: Option<String>,
}

/// ffmpeg post-processors that receive `postprocessor_args`. The convertor
/// skips files already in the target container; merged mp4 output is only
/// re-encoded by the merger.
const TRANSCODING_POSTPROCESSORS: [&str; 2] = ["Merger", "VideoConvertor"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOptions {
    pub quiet: bool,
    pub http_headers: Vec<(String, String)>,
    pub cookies_from_browser: Option<String>,
    pub extractor_args: Option<String>,
    pub no_check_certificates: bool,
}

/// Options for one download invocation. Built fresh per request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    pub format: String,
    pub output_template: String,
    pub merge_output_format: Option<String>,
    pub no_playlist: bool,
    pub recode_video: Option<String>,
    /// Arguments handed to ffmpeg when merging or converting.
    pub postprocessor_args: Vec<String>,
    pub http_headers: Vec<(String, String)>,
    pub extractor_retries: u32,
    pub retries: u32,
    pub fragment_retries: u32,
    pub extractor_args: Option<String>,
    pub cookies_from_browser: Option<String>,
    pub quiet: bool,
    pub ignore_errors: bool,
    pub no_check_certificates: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Final output path as reported by the engine, when it reported one.
    pub output_path: Option<PathBuf>,
}

#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Metadata-only extraction. `Ok(None)` means the engine answered but had
    /// nothing to say about the URL.
    async fn probe(&self, url: &str, options: &ProbeOptions)
    -> Result<Option<VideoInfo>, EngineError>;

    async fn fetch(&self, url: &str, options: &DownloadOptions) -> Result<FetchReport, EngineError>;

    async fn version(&self) -> Result<String, EngineError>;
}

impl ProbeOptions {
    pub fn to_args(&self, url: &str) -> Vec<String> {
        let mut args = vec!["-J".to_string(), "--no-playlist".to_string()];
        push_header_args(&mut args, &self.http_headers);
        push_common_flags(
            &mut args,
            self.extractor_args.as_deref(),
            self.cookies_from_browser.as_deref(),
            self.quiet,
            self.no_check_certificates,
        );
        args.push(url.to_string());
        args
    }
}

impl DownloadOptions {
    /// The subset of these options that applies to a metadata probe.
    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            quiet: self.quiet,
            http_headers: self.http_headers.clone(),
            cookies_from_browser: self.cookies_from_browser.clone(),
            extractor_args: self.extractor_args.clone(),
            no_check_certificates: self.no_check_certificates,
        }
    }

    pub fn to_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            self.format.clone(),
            "-o".to_string(),
            self.output_template.clone(),
        ];

        if let Some(format) = &self.merge_output_format {
            args.push("--merge-output-format".to_string());
            args.push(format.clone());
        }
        if self.no_playlist {
            args.push("--no-playlist".to_string());
        }
        if let Some(format) = &self.recode_video {
            args.push("--recode-video".to_string());
            args.push(format.clone());
        }
        if !self.postprocessor_args.is_empty() {
            let ffmpeg_args = self.postprocessor_args.join(" ");
            for postprocessor in TRANSCODING_POSTPROCESSORS {
                args.push("--postprocessor-args".to_string());
                args.push(format!("{postprocessor}:{ffmpeg_args}"));
            }
        }

        push_header_args(&mut args, &self.http_headers);

        args.push("--extractor-retries".to_string());
        args.push(self.extractor_retries.to_string());
        args.push("--retries".to_string());
        args.push(self.retries.to_string());
        args.push("--fragment-retries".to_string());
        args.push(self.fragment_retries.to_string());

        push_common_flags(
            &mut args,
            self.extractor_args.as_deref(),
            self.cookies_from_browser.as_deref(),
            self.quiet,
            self.no_check_certificates,
        );

        if self.ignore_errors {
            args.push("--ignore-errors".to_string());
        }

        args.extend([
            "--no-progress".to_string(),
            "--newline".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            url.to_string(),
        ]);
        args
    }
}

fn push_header_args(args: &mut Vec<String>, headers: &[(String, String)]) {
    for (name, value) in headers {
        args.push("--add-header".to_string());
        args.push(format!("{name}:{value}"));
    }
}

fn push_common_flags(
    args: &mut Vec<String>,
    extractor_args: Option<&str>,
    cookies_from_browser: Option<&str>,
    quiet: bool,
    no_check_certificates: bool,
) {
    if let Some(extractor_args) = extractor_args {
        args.push("--extractor-args".to_string());
        args.push(extractor_args.to_string());
    }
    if let Some(browser) = cookies_from_browser {
        args.push("--cookies-from-browser".to_string());
        args.push(browser.to_string());
    }
    if quiet {
        args.push("--quiet".to_string());
        args.push("--no-warnings".to_string());
    }
    if no_check_certificates {
        args.push("--no-check-certificates".to_string());
    }
}

/// Output template for a sanitized title. `%` is the template escape
/// character, so titles containing it are escaped.
pub fn output_template(download_dir: &Path, safe_title: &str) -> String {
    let escaped = safe_title.replace('%', "%%");
    download_dir
        .join(format!("{escaped}.%(ext)s"))
        .to_string_lossy()
        .into_owned()
}

pub struct YtDlp {
    program: PathBuf,
    ffmpeg_location: Option<String>,
    timeout: Option<Duration>,
}

impl YtDlp {
    pub fn new(settings: &Settings) -> Self {
        Self {
            program: settings.yt_dlp_bin.clone(),
            ffmpeg_location: settings.ffmpeg_location.clone(),
            timeout: settings.engine_timeout,
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<Output, EngineError> {
        debug!("yt-dlp {:?}", args);
        let command_future = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = match self.timeout {
            Some(limit) => timeout(limit, command_future)
                .await
                .map_err(|_| EngineError::TimedOut(limit.as_secs()))?,
            None => command_future.await,
        }
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                EngineError::NotInstalled
            } else {
                EngineError::Spawn(error)
            }
        })?;

        forward_engine_log(&output.stderr);

        if !output.status.success() {
            return Err(EngineError::Failed(run_error_message(&output.stderr)));
        }

        Ok(output)
    }
}

#[async_trait]
impl MediaEngine for YtDlp {
    async fn probe(
        &self,
        url: &str,
        options: &ProbeOptions,
    ) -> Result<Option<VideoInfo>, EngineError> {
        let output = self.run(options.to_args(url)).await?;
        parse_probe_output(&output.stdout)
    }

    async fn fetch(&self, url: &str, options: &DownloadOptions) -> Result<FetchReport, EngineError> {
        let mut args = Vec::new();
        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.clone());
        }
        args.extend(options.to_args(url));

        let output = self.run(args).await?;
        Ok(FetchReport {
            output_path: extract_printed_path(&output.stdout).map(PathBuf::from),
        })
    }

    async fn version(&self) -> Result<String, EngineError> {
        let output = self.run(vec!["--version".to_string()]).await?;
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if version.is_empty() {
            return Err(EngineError::InvalidOutput("empty version string".to_string()));
        }
        Ok(version)
    }
}

fn parse_probe_output(stdout: &[u8]) -> Result<Option<VideoInfo>, EngineError> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    serde_json::from_str::<Option<VideoInfo>>(text)
        .map_err(|error| EngineError::InvalidOutput(error.to_string()))
}

fn run_error_message(stderr: &[u8]) -> String {
    let message = String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp could not complete the operation")
        .to_string();

    if message.to_ascii_lowercase().contains("unsupported url") {
        "Unsupported or invalid URL for download.".to_string()
    } else {
        message
    }
}

fn extract_printed_path(stdout: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .map(ToString::to_string)
}

fn forward_engine_log(stderr: &[u8]) {
    for line in String::from_utf8_lossy(stderr).lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("ERROR:") {
            error!(target: "yt_dlp", "{line}");
        } else if line.starts_with("WARNING:") {
            warn!(target: "yt_dlp", "{line}");
        } else if let Some(message) = line.strip_prefix("[debug] ") {
            debug!(target: "yt_dlp", "{message}");
        } else {
            debug!(target: "yt_dlp", "{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|arg| arg == flag)
            .and_then(|index| args.get(index + 1))
            .map(String::as_str)
    }

    #[test]
    fn download_args_render_every_option() {
        let options = DownloadOptions {
            format: "best".to_string(),
            output_template: "downloads/clip.%(ext)s".to_string(),
            merge_output_format: Some("mp4".to_string()),
            no_playlist: true,
            recode_video: Some("mp4".to_string()),
            postprocessor_args: vec!["-c:v".to_string(), "libx264".to_string()],
            http_headers: vec![("Referer".to_string(), "https://example.com/".to_string())],
            extractor_retries: 3,
            retries: 5,
            fragment_retries: 7,
            extractor_args: Some("youtube:player_client=web".to_string()),
            cookies_from_browser: Some("chrome".to_string()),
            quiet: true,
            ignore_errors: true,
            no_check_certificates: true,
        };

        let args = options.to_args("https://youtu.be/dQw4w9WgXcQ");

        assert_eq!(arg_after(&args, "-f"), Some("best"));
        assert_eq!(arg_after(&args, "-o"), Some("downloads/clip.%(ext)s"));
        assert_eq!(arg_after(&args, "--merge-output-format"), Some("mp4"));
        assert_eq!(arg_after(&args, "--recode-video"), Some("mp4"));
        let postprocessor_args: Vec<&str> = args
            .iter()
            .enumerate()
            .filter(|(_, arg)| *arg == "--postprocessor-args")
            .filter_map(|(index, _)| args.get(index + 1).map(String::as_str))
            .collect();
        assert_eq!(
            postprocessor_args,
            ["Merger:-c:v libx264", "VideoConvertor:-c:v libx264"]
        );
        assert_eq!(
            arg_after(&args, "--add-header"),
            Some("Referer:https://example.com/")
        );
        assert_eq!(arg_after(&args, "--extractor-retries"), Some("3"));
        assert_eq!(arg_after(&args, "--retries"), Some("5"));
        assert_eq!(arg_after(&args, "--fragment-retries"), Some("7"));
        assert_eq!(
            arg_after(&args, "--extractor-args"),
            Some("youtube:player_client=web")
        );
        assert_eq!(arg_after(&args, "--cookies-from-browser"), Some("chrome"));
        assert_eq!(arg_after(&args, "--print"), Some("after_move:filepath"));
        for flag in [
            "--no-playlist",
            "--quiet",
            "--no-warnings",
            "--ignore-errors",
            "--no-check-certificates",
        ] {
            assert!(args.iter().any(|arg| arg == flag), "missing {flag}");
        }
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/dQw4w9WgXcQ"));
    }

    #[test]
    fn optional_flags_are_omitted_when_unset() {
        let options = DownloadOptions {
            format: "best".to_string(),
            output_template: "x.%(ext)s".to_string(),
            ..Default::default()
        };
        let args = options.to_args("u");

        for flag in [
            "--merge-output-format",
            "--recode-video",
            "--postprocessor-args",
            "--add-header",
            "--cookies-from-browser",
            "--quiet",
            "--ignore-errors",
        ] {
            assert!(!args.iter().any(|arg| arg == flag), "unexpected {flag}");
        }
    }

    #[test]
    fn probe_args_request_json_only() {
        let options = DownloadOptions {
            format: "best".to_string(),
            quiet: true,
            http_headers: vec![("Origin".to_string(), "https://x".to_string())],
            ..Default::default()
        };
        let args = options.probe_options().to_args("u");

        assert_eq!(args[0], "-J");
        assert!(!args.iter().any(|arg| arg == "-f"));
        assert!(!args.iter().any(|arg| arg == "--print"));
        assert_eq!(arg_after(&args, "--add-header"), Some("Origin:https://x"));
        assert!(args.iter().any(|arg| arg == "--quiet"));
    }

    #[test]
    fn output_template_escapes_percent() {
        let template = output_template(Path::new("downloads"), "100% real");
        assert_eq!(
            template,
            Path::new("downloads")
                .join("100%% real.%(ext)s")
                .to_string_lossy()
        );
    }

    #[test]
    fn probe_output_parsing() {
        assert!(parse_probe_output(b"").unwrap().is_none());
        assert!(parse_probe_output(b"null\n").unwrap().is_none());

        let info = parse_probe_output(br#"{"id":"abc","title":"Hello","formats":[]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(info.title.as_deref(), Some("Hello"));
        assert_eq!(info.id.as_deref(), Some("abc"));

        assert!(matches!(
            parse_probe_output(b"not json"),
            Err(EngineError::InvalidOutput(_))
        ));
    }

    #[test]
    fn error_message_uses_last_stderr_line() {
        let stderr = b"[youtube] abc: Downloading webpage\nERROR: [youtube] abc: Video unavailable\n\n";
        assert_eq!(
            run_error_message(stderr),
            "ERROR: [youtube] abc: Video unavailable"
        );
        assert_eq!(
            run_error_message(b"ERROR: Unsupported URL: https://example.com"),
            "Unsupported or invalid URL for download."
        );
        assert_eq!(
            run_error_message(b""),
            "yt-dlp could not complete the operation"
        );
    }

    #[test]
    fn printed_path_is_last_stdout_line() {
        assert_eq!(
            extract_printed_path(b"downloads/a.mp4\n").as_deref(),
            Some("downloads/a.mp4")
        );
        assert_eq!(extract_printed_path(b"\n  \n"), None);
    }
}
