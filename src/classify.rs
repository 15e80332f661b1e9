use std::sync::LazyLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    YouTube,
    Instagram,
    Unsupported,
}

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(https?://)?(www\.)?(youtube|youtu|youtube-nocookie)\.(com|be)/(watch\?v=|embed/|v/|.+/|\?v=|&v=|/v/|shorts/)?([^"&?/\s]{11})"#,
    )
    .expect("youtube pattern compiles")
});

static INSTAGRAM_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.)?instagram\.com/(?:p/|reel/|tv/|stories/)[^\s/]+(?:/\S*)?")
        .expect("instagram pattern compiles")
});

pub fn classify(url: &str) -> UrlKind {
    if YOUTUBE_URL.is_match(url) {
        UrlKind::YouTube
    } else if INSTAGRAM_URL.is_match(url) {
        UrlKind::Instagram
    } else {
        UrlKind::Unsupported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_youtube_shapes() {
        let urls = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "http://youtube.com/watch?v=dQw4w9WgXcQ&t=42",
            "youtube.com/watch?v=dQw4w9WgXcQ",
            "www.youtube.com/embed/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
        ];
        for url in urls {
            assert_eq!(classify(url), UrlKind::YouTube, "{url}");
        }
    }

    #[test]
    fn recognizes_instagram_shapes() {
        let urls = [
            "https://www.instagram.com/p/CxYz123AbC/",
            "https://instagram.com/reel/CxYz123AbC",
            "http://www.instagram.com/tv/CxYz123AbC/?igsh=abc",
            "instagram.com/stories/someone/3141592653589793/",
            "www.instagram.com/reel/CxYz123AbC/",
        ];
        for url in urls {
            assert_eq!(classify(url), UrlKind::Instagram, "{url}");
        }
    }

    #[test]
    fn everything_else_is_unsupported() {
        let urls = [
            "",
            "not a url",
            "https://vimeo.com/123456789",
            "https://www.youtube.com/watch?v=short",
            "https://www.instagram.com/someone/",
            "ftp://youtube.com/watch?v=dQw4w9WgXcQ",
            "see https://youtu.be/dQw4w9WgXcQ",
        ];
        for url in urls {
            assert_eq!(classify(url), UrlKind::Unsupported, "{url}");
        }
    }
}
