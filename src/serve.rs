use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, PRAGMA},
    },
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use crate::{files, sanitize::sanitize_basename};

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("File not found")]
    NotFound,
    #[error("Error downloading file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error downloading file: invalid header value")]
    Header,
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = match self {
            ServeError::NotFound => StatusCode::NOT_FOUND,
            ServeError::Io(_) | ServeError::Header => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Maps a requested name to a file inside `download_dir`. The request is
/// reduced to a sanitized basename first, so it can never address anything
/// outside the directory.
pub async fn resolve_requested_file(
    download_dir: &Path,
    requested: &str,
) -> Result<(PathBuf, String), ServeError> {
    let safe_name = sanitize_basename(requested);
    let exact = download_dir.join(&safe_name);
    if tokio::fs::metadata(&exact)
        .await
        .is_ok_and(|metadata| metadata.is_file())
    {
        return Ok((exact, safe_name));
    }

    let stem = Path::new(&safe_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(&safe_name)
        .to_string();

    match files::find_by_prefix(download_dir, &stem, 0, false).await {
        Ok(Some(found)) => Ok((found.path, found.name)),
        Ok(None) => Err(ServeError::NotFound),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Err(ServeError::NotFound),
        Err(error) => Err(ServeError::Io(error)),
    }
}

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const CONTENT_TYPES: [(&str, &str); 6] = [
    ("mp4", "video/mp4"),
    ("mp3", "audio/mpeg"),
    ("m4a", "audio/mp4"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("part", DEFAULT_CONTENT_TYPE),
];

pub fn content_type_for_filename(filename: &str) -> &'static str {
    let Some(extension) = Path::new(filename).extension().and_then(|ext| ext.to_str()) else {
        return DEFAULT_CONTENT_TYPE;
    };

    CONTENT_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(extension))
        .map_or(DEFAULT_CONTENT_TYPE, |&(_, content_type)| content_type)
}

/// `attachment` disposition carrying an ASCII `filename` for old clients
/// and the exact name as RFC 5987 `filename*`.
pub fn build_content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_fallback_name(filename),
        urlencoding::encode(filename)
    )
}

fn ascii_fallback_name(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|character| match character {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' | ' ' | '(' | ')' => character,
            _ => '_',
        })
        .collect();

    match fallback.trim() {
        "" => "download.bin".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Streams a file from `download_dir` as an attachment.
pub async fn serve_download(download_dir: &Path, requested: &str) -> Result<Response, ServeError> {
    let (path, filename) = match resolve_requested_file(download_dir, requested).await {
        Ok(resolved) => resolved,
        Err(error) => {
            error!("Could not serve {requested:?}: {error}");
            return Err(error);
        }
    };

    let file = tokio::fs::File::open(&path).await?;
    let length = file.metadata().await?.len();

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(content_type_for_filename(&filename)),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&build_content_disposition(&filename))
            .map_err(|_| ServeError::Header)?,
    );
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

    info!("Serving file: {filename} (requested: {requested})");
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

#[cfg(test)]
mod tests {
    use axum::http::header::ETAG;

    use super::*;

    #[test]
    fn content_types_follow_extension_table() {
        assert_eq!(content_type_for_filename("a.mp4"), "video/mp4");
        assert_eq!(content_type_for_filename("a.MP3"), "audio/mpeg");
        assert_eq!(content_type_for_filename("a.m4a"), "audio/mp4");
        assert_eq!(content_type_for_filename("a.webm"), "video/webm");
        assert_eq!(content_type_for_filename("a.mkv"), "video/x-matroska");
        assert_eq!(content_type_for_filename("a.mp4.part"), "application/octet-stream");
        assert_eq!(content_type_for_filename("a.part"), "application/octet-stream");
        assert_eq!(content_type_for_filename("a.mkv.txt"), "application/octet-stream");
        assert_eq!(content_type_for_filename("noext"), "application/octet-stream");
    }

    #[test]
    fn content_disposition_has_ascii_and_utf8_names() {
        assert_eq!(
            build_content_disposition("Café clip.mp4"),
            "attachment; filename=\"Caf_ clip.mp4\"; filename*=UTF-8''Caf%C3%A9%20clip.mp4"
        );
        assert_eq!(
            build_content_disposition("日本"),
            "attachment; filename=\"__\"; filename*=UTF-8''%E6%97%A5%E6%9C%AC"
        );
        assert_eq!(
            build_content_disposition("  "),
            "attachment; filename=\"download.bin\"; filename*=UTF-8''%20%20"
        );
    }

    #[tokio::test]
    async fn exact_name_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Clip.mp4"), b"exact").unwrap();
        std::fs::write(dir.path().join("Clip.mp4.part"), b"partial").unwrap();

        let (path, name) = resolve_requested_file(dir.path(), "Clip.mp4").await.unwrap();
        assert_eq!(name, "Clip.mp4");
        assert_eq!(path, dir.path().join("Clip.mp4"));
    }

    #[tokio::test]
    async fn falls_back_to_stem_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Clip.webm"), b"other container").unwrap();

        let (_, name) = resolve_requested_file(dir.path(), "Clip.mp4").await.unwrap();
        assert_eq!(name, "Clip.webm");
    }

    #[tokio::test]
    async fn traversal_stays_inside_the_directory() {
        let root = tempfile::tempdir().unwrap();
        let downloads = root.path().join("downloads");
        std::fs::create_dir(&downloads).unwrap();
        std::fs::write(root.path().join("secret.txt"), b"top secret").unwrap();

        let result = resolve_requested_file(&downloads, "../secret.txt").await;
        assert!(matches!(result, Err(ServeError::NotFound)));

        std::fs::write(downloads.join("secret.txt"), b"inside").unwrap();
        let (path, _) = resolve_requested_file(&downloads, "../secret.txt").await.unwrap();
        assert_eq!(path, downloads.join("secret.txt"));
    }

    #[tokio::test]
    async fn missing_directory_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let result = resolve_requested_file(&root.path().join("nope"), "a.mp4").await;
        assert!(matches!(result, Err(ServeError::NotFound)));
    }

    #[tokio::test]
    async fn serves_attachment_without_caching() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Clip.mp4"), b"0123456789").unwrap();

        let response = serve_download(dir.path(), "Clip.mp4").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[CONTENT_TYPE], "video/mp4");
        assert_eq!(headers[CONTENT_LENGTH], "10");
        assert!(
            headers[CONTENT_DISPOSITION]
                .to_str()
                .unwrap()
                .starts_with("attachment; filename=\"Clip.mp4\"")
        );
        assert!(headers[CACHE_CONTROL].to_str().unwrap().contains("no-store"));
        assert!(headers.get(ETAG).is_none());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"0123456789");
    }

    #[tokio::test]
    async fn not_found_renders_plain_404() {
        let dir = tempfile::tempdir().unwrap();
        let response = serve_download(dir.path(), "missing.mp4")
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"File not found");
    }
}
