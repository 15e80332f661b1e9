use std::{path::PathBuf, time::Duration};

pub const DEFAULT_LOG_FILTER: &str = "video_downloader=info,yt_dlp=warn,tower_http=info";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
const DEFAULT_COOKIES_BROWSER: &str = "chrome";
const DEFAULT_REGISTRY_CAPACITY: usize = 500;
const DEFAULT_UPGRADE_COMMAND: &str = "python3 -m pip install --upgrade yt-dlp";

/// Process configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub download_dir: PathBuf,
    pub yt_dlp_bin: PathBuf,
    pub ffmpeg_location: Option<String>,
    pub engine_timeout: Option<Duration>,
    pub cookies_browser: Option<String>,
    pub registry_capacity: usize,
    pub download_retention: Option<Duration>,
    pub skip_engine_upgrade: bool,
    pub upgrade_command: Vec<String>,
    pub allowed_origins: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |name: &str| lookup(name).and_then(|value| non_empty(&value).map(ToString::to_string));
        let seconds = |name: &str| {
            text(name)
                .and_then(|value| value.parse::<u64>().ok())
                .filter(|value| *value > 0)
                .map(Duration::from_secs)
        };

        let bind_addr = text("APP_ADDR")
            .or_else(|| {
                text("PORT")
                    .and_then(|value| value.parse::<u16>().ok())
                    .map(|port| format!("0.0.0.0:{port}"))
            })
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let cookies_browser = match lookup("COOKIES_BROWSER") {
            Some(value) => non_empty(&value).map(str::to_ascii_lowercase),
            None => Some(DEFAULT_COOKIES_BROWSER.to_string()),
        };

        let upgrade_command = text("ENGINE_UPGRADE_COMMAND")
            .unwrap_or_else(|| DEFAULT_UPGRADE_COMMAND.to_string())
            .split_whitespace()
            .map(ToString::to_string)
            .collect();

        let allowed_origins = text("ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            bind_addr,
            download_dir: text("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR)),
            yt_dlp_bin: text("YT_DLP_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("yt-dlp")),
            ffmpeg_location: text("FFMPEG_LOCATION"),
            engine_timeout: seconds("ENGINE_TIMEOUT_SECONDS"),
            cookies_browser,
            registry_capacity: text("REGISTRY_CAPACITY")
                .and_then(|value| value.parse::<usize>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_REGISTRY_CAPACITY),
            download_retention: seconds("DOWNLOAD_RETENTION_SECONDS"),
            skip_engine_upgrade: text("SKIP_ENGINE_UPGRADE")
                .and_then(|value| parse_bool(&value))
                .unwrap_or(false),
            upgrade_command,
            allowed_origins,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
