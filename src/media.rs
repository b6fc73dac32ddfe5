use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AssetError;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "aac", "flac", "wma", "aiff"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "tif", "tiff"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    /// Guess the kind from the file extension of a path or URL.
    ///
    /// Known audio and image extensions win; everything else is treated as video,
    /// the same fallback the upload path applies to unknown binaries.
    pub fn infer(url: &str) -> Self {
        let trimmed = url.split(['?', '#']).next().unwrap_or(url);
        let ext = trimmed
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Audio
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Image
        } else {
            MediaKind::Video
        }
    }
}

/// One entry of the ordered media list handed to the pad by its host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub kind: Option<MediaKind>,
}

impl MediaDescriptor {
    pub fn new(id: impl Into<String>, url: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            kind: Some(kind),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind.unwrap_or_else(|| MediaKind::infer(&self.url))
    }
}

/// Where the bytes behind a descriptor live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    Local(PathBuf),
    Remote(String),
}

impl MediaSource {
    /// Resolve a descriptor URL. Relative paths are taken relative to `base`
    /// (usually the directory of the manifest).
    pub fn resolve(url: &str, base: Option<&Path>) -> Result<Self, AssetError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AssetError::Unresolvable(url.to_string()));
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(MediaSource::Remote(url.to_string()));
        }

        let raw = if let Some(rest) = url.strip_prefix("file://") {
            PathBuf::from(rest)
        } else if url.contains("://") {
            return Err(AssetError::Unresolvable(url.to_string()));
        } else {
            PathBuf::from(url)
        };

        let path = match base {
            Some(base) if raw.is_relative() => base.join(raw),
            _ => raw,
        };
        Ok(MediaSource::Local(path))
    }

    /// Argument form accepted by ffmpeg/ffprobe.
    pub fn ffmpeg_input(&self) -> String {
        match self {
            MediaSource::Local(path) => path.display().to_string(),
            MediaSource::Remote(url) => url.clone(),
        }
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>, AssetError> {
        match self {
            MediaSource::Local(path) => std::fs::read(path)
                .map_err(|e| AssetError::fetch(path.display().to_string(), e)),
            MediaSource::Remote(url) => fetch_remote(url),
        }
    }
}

#[cfg(feature = "remote")]
fn fetch_remote(url: &str) -> Result<Vec<u8>, AssetError> {
    let response = reqwest::blocking::get(url).map_err(|e| AssetError::fetch(url, e))?;
    if !response.status().is_success() {
        return Err(AssetError::fetch(url, response.status()));
    }
    response
        .bytes()
        .map(|b| b.to_vec())
        .map_err(|e| AssetError::fetch(url, e))
}

#[cfg(not(feature = "remote"))]
fn fetch_remote(url: &str) -> Result<Vec<u8>, AssetError> {
    Err(AssetError::fetch(
        url,
        "remote sources require the 'remote' feature",
    ))
}
