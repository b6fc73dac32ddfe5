use std::fmt;

pub type PadResult<T> = Result<T, PadError>;

#[derive(thiserror::Error, Debug)]
pub enum PadError {
    #[error("config error: {0}")]
    Config(String),

    #[error("asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PadError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn audio(msg: impl Into<String>) -> Self {
        Self::Audio(msg.into())
    }
}

/// Failure to bind one media descriptor. Never fatal: the slot stays inert.
#[derive(thiserror::Error, Debug)]
pub enum AssetError {
    #[error("cannot resolve source '{0}'")]
    Unresolvable(String),

    #[error("failed to fetch '{url}': {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to decode '{url}': {reason}")]
    Decode { url: String, reason: String },

    #[error("ffmpeg is required to load '{0}' but was not found on PATH")]
    FfmpegMissing(String),
}

impl AssetError {
    pub fn decode(url: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Decode {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn fetch(url: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Something the recording path needs from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// An encoder able to turn frames and samples into a container file.
    MediaRecorder,
    /// Reading the rendered canvas back as a stream of frames.
    CanvasCapture,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::MediaRecorder => f.write_str("media recorder"),
            Capability::CanvasCapture => f.write_str("canvas capture"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("{0} is not supported on this platform")]
    Unsupported(Capability),

    #[error("recording backend failed to start: {0}")]
    Backend(String),

    #[error("recording failed: {0}")]
    Runtime(String),
}

impl RecordError {
    /// Message shown to the performer.
    pub fn user_message(&self) -> &'static str {
        match self {
            RecordError::Unsupported(Capability::MediaRecorder) => {
                "Recording is not supported here (ffmpeg not found)."
            }
            RecordError::Unsupported(Capability::CanvasCapture) => {
                "Canvas recording is not supported for this surface."
            }
            RecordError::Backend(_) | RecordError::Runtime(_) => {
                "Recording failed. Please try again."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(PadError::config("x").to_string().contains("config error:"));
        assert!(PadError::audio("x").to_string().contains("audio error:"));
        assert!(
            PadError::from(RecordError::Runtime("boom".into()))
                .to_string()
                .contains("recording failed: boom")
        );
    }

    #[test]
    fn unsupported_capabilities_have_distinct_messages() {
        let recorder = RecordError::Unsupported(Capability::MediaRecorder);
        let canvas = RecordError::Unsupported(Capability::CanvasCapture);
        assert_ne!(recorder.user_message(), canvas.user_message());
        assert!(recorder.to_string().contains("media recorder"));
    }

    #[test]
    fn asset_error_carries_url() {
        let err = AssetError::decode("media/a.wav", "bad header");
        assert_eq!(
            err.to_string(),
            "failed to decode 'media/a.wav': bad header"
        );
    }
}
