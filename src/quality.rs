/// Quality tier requested for a YouTube download. Unknown values map to
/// [`Quality::Best`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Quality {
    #[default]
    Best,
    Audio,
    Uhd4k,
    Qhd2k,
    P1080,
    P720,
    P480,
}

impl Quality {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
            Some("audio") => Self::Audio,
            Some("4k") => Self::Uhd4k,
            Some("2k") => Self::Qhd2k,
            Some("1080") => Self::P1080,
            Some("720") => Self::P720,
            Some("480") => Self::P480,
            _ => Self::Best,
        }
    }

    pub fn format_selector(self) -> &'static str {
        match self {
            Self::Best => "bestvideo[ext=mp4][vcodec^=avc1]+bestaudio[ext=m4a]/best[ext=mp4]/best",
            Self::Audio => "bestaudio[ext=m4a]/bestaudio/best",
            Self::Uhd4k => {
                "bestvideo[height<=2160][vcodec^=avc1][fps<=60]+bestaudio[ext=m4a]/best[height<=2160]/best"
            }
            Self::Qhd2k => {
                "bestvideo[height<=1440][vcodec^=avc1][fps<=60]+bestaudio[ext=m4a]/best[height<=1440]/best"
            }
            Self::P1080 => {
                "bestvideo[height<=1080][vcodec^=avc1][fps<=60]+bestaudio[ext=m4a]/best[height<=1080]/best"
            }
            Self::P720 => {
                "bestvideo[height<=720][vcodec^=avc1][fps<=60]+bestaudio[ext=m4a]/best[height<=720]/best"
            }
            Self::P480 => {
                "bestvideo[height<=480][vcodec^=avc1]+bestaudio[ext=m4a]/best[height<=480]/best"
            }
        }
    }

    /// Whether the selector may pick separate video and audio streams that
    /// need merging.
    pub fn merges_streams(self) -> bool {
        self.format_selector().contains('+')
    }
}
