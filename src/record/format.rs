use chrono::{DateTime, SecondsFormat, Utc};

/// Output containers, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    Mp4H264,
    Mp4,
    WebmVp9,
    WebmVp8,
    Webm,
}

impl ContainerFormat {
    pub const PREFERENCE: [ContainerFormat; 5] = [
        ContainerFormat::Mp4H264,
        ContainerFormat::Mp4,
        ContainerFormat::WebmVp9,
        ContainerFormat::WebmVp8,
        ContainerFormat::Webm,
    ];

    /// First format `supported` accepts.
    pub fn choose(supported: impl Fn(ContainerFormat) -> bool) -> Option<ContainerFormat> {
        Self::PREFERENCE.into_iter().find(|&f| supported(f))
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ContainerFormat::Mp4H264 => "video/mp4;codecs=h264",
            ContainerFormat::Mp4 => "video/mp4",
            ContainerFormat::WebmVp9 => "video/webm;codecs=vp9",
            ContainerFormat::WebmVp8 => "video/webm;codecs=vp8",
            ContainerFormat::Webm => "video/webm",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Mp4H264 | ContainerFormat::Mp4 => "mp4",
            ContainerFormat::WebmVp9 | ContainerFormat::WebmVp8 | ContainerFormat::Webm => "webm",
        }
    }

    /// ffmpeg encoder for the video stream.
    pub fn video_encoder(self) -> &'static str {
        match self {
            ContainerFormat::Mp4H264 => "libx264",
            ContainerFormat::Mp4 => "mpeg4",
            ContainerFormat::WebmVp9 => "libvpx-vp9",
            ContainerFormat::WebmVp8 => "libvpx",
            ContainerFormat::Webm => "libvpx",
        }
    }

    /// ffmpeg encoder for the audio stream.
    pub fn audio_encoder(self) -> &'static str {
        match self {
            ContainerFormat::Mp4H264 | ContainerFormat::Mp4 => "aac",
            ContainerFormat::WebmVp9 | ContainerFormat::WebmVp8 => "libopus",
            ContainerFormat::Webm => "libvorbis",
        }
    }
}

/// `<prefix>-<ISO-8601 with ':' and '.' replaced by '-'>.<ext>`
pub fn recording_filename(prefix: &str, at: DateTime<Utc>, format: ContainerFormat) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{prefix}-{stamp}.{}", format.extension())
}
