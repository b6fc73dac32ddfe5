use std::path::{Path, PathBuf};
use std::time::Duration;

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::error::{PadError, PadResult};
use crate::media::MediaDescriptor;

/// Hard cap on performable layers.
pub const MAX_LAYERS: usize = 8;

/// K B S H J F L D, in slot order.
pub const DEFAULT_KEYS: [char; MAX_LAYERS] = ['k', 'b', 's', 'h', 'j', 'f', 'l', 'd'];

/// Everything a pad needs at mount: the media list plus style and engine knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PadConfig {
    pub media: Vec<MediaDescriptor>,
    pub style: StyleConfig,
    pub engine: EngineConfig,
    pub recording: RecordingConfig,
    pub ui: UiConfig,
    /// Directory relative media paths are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl PadConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> PadResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PadError::config(format!("failed to read manifest '{}': {e}", path.display()))
        })?;
        let mut config = Self::from_toml(&text)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    pub fn from_toml(text: &str) -> PadResult<Self> {
        let config: PadConfig = toml::from_str(text)
            .map_err(|e| PadError::config(format!("invalid manifest: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PadResult<()> {
        self.engine.validate()?;
        self.recording.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dusk,
    Light,
}

/// Subset of the host palette the engine draws with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub background: Rgba<u8>,
    pub text: Rgba<u8>,
    pub text_secondary: Rgba<u8>,
    pub border: Rgba<u8>,
}

impl Theme {
    pub fn palette(self) -> Palette {
        match self {
            Theme::Dusk => Palette {
                background: Rgba([0x11, 0x32, 0x3d, 0xff]),
                text: Rgba([0xff, 0xff, 0xff, 0xff]),
                text_secondary: Rgba([0xff, 0xd6, 0xd6, 0xff]),
                border: Rgba([0xff, 0xff, 0xff, 0xff]),
            },
            Theme::Light => Palette {
                background: Rgba([0xf5, 0xf5, 0xf5, 0xff]),
                text: Rgba([0x07, 0x2a, 0x60, 0xff]),
                text_secondary: Rgba([0x19, 0x76, 0xd2, 0xff]),
                border: Rgba([0x30, 0x3f, 0x9f, 0xff]),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    #[serde(alias = "backgroundColor")]
    pub background_color: Option<String>,
    pub text: Option<String>,
    pub theme: Theme,
}

impl StyleConfig {
    /// Configured background, or `None` when unset or unparsable.
    pub fn background(&self) -> Option<Rgba<u8>> {
        let raw = self.background_color.as_deref()?;
        let parsed = parse_color(raw);
        if parsed.is_none() {
            tracing::warn!(color = raw, "ignoring unparsable background color");
        }
        parsed
    }
}

const NAMED_COLORS: &[(&str, [u8; 4])] = &[
    ("transparent", [0, 0, 0, 0]),
    ("black", [0, 0, 0, 255]),
    ("white", [255, 255, 255, 255]),
    ("gray", [128, 128, 128, 255]),
    ("grey", [128, 128, 128, 255]),
    ("silver", [192, 192, 192, 255]),
    ("red", [255, 0, 0, 255]),
    ("maroon", [128, 0, 0, 255]),
    ("orange", [255, 165, 0, 255]),
    ("yellow", [255, 255, 0, 255]),
    ("olive", [128, 128, 0, 255]),
    ("lime", [0, 255, 0, 255]),
    ("green", [0, 128, 0, 255]),
    ("teal", [0, 128, 128, 255]),
    ("cyan", [0, 255, 255, 255]),
    ("aqua", [0, 255, 255, 255]),
    ("blue", [0, 0, 255, 255]),
    ("navy", [0, 0, 128, 255]),
    ("purple", [128, 0, 128, 255]),
    ("magenta", [255, 0, 255, 255]),
    ("fuchsia", [255, 0, 255, 255]),
    ("pink", [255, 192, 203, 255]),
    ("indigo", [75, 0, 130, 255]),
    ("violet", [238, 130, 238, 255]),
    ("brown", [165, 42, 42, 255]),
    ("gold", [255, 215, 0, 255]),
];

/// Parse a CSS-style color: `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`,
/// `rgb(r, g, b)`, `rgba(r, g, b, a)` or a basic color name.
///
/// In `rgba()` the alpha is a 0..=1 fraction or a percentage. HSL and the
/// full CSS name table are not supported.
pub fn parse_color(raw: &str) -> Option<Rgba<u8>> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix('#') {
        return parse_hex(hex);
    }
    let lower = raw.to_ascii_lowercase();
    if let Some(args) = lower
        .strip_prefix("rgba(")
        .or_else(|| lower.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return parse_rgb_args(args);
    }
    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, rgba)| Rgba(*rgba))
}

fn parse_hex(hex: &str) -> Option<Rgba<u8>> {
    if !hex.is_ascii() {
        return None;
    }
    let byte = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 | 4 => {
            let mut out = [0xff; 4];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                out[i] = v * 17;
            }
            Some(Rgba(out))
        }
        6 => Some(Rgba([byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?, 0xff])),
        8 => Some(Rgba([
            byte(&hex[0..2])?,
            byte(&hex[2..4])?,
            byte(&hex[4..6])?,
            byte(&hex[6..8])?,
        ])),
        _ => None,
    }
}

fn parse_rgb_args(args: &str) -> Option<Rgba<u8>> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    let channel = |s: &str| -> Option<u8> {
        let v = match s.strip_suffix('%') {
            Some(pct) => pct.parse::<f32>().ok()? * 2.55,
            None => s.parse::<f32>().ok()?,
        };
        (v.is_finite() && (0.0..=255.0).contains(&v)).then(|| v.round() as u8)
    };
    let alpha = |s: &str| -> Option<u8> {
        let v = match s.strip_suffix('%') {
            Some(pct) => pct.parse::<f32>().ok()? / 100.0,
            None => s.parse::<f32>().ok()?,
        };
        (v.is_finite() && (0.0..=1.0).contains(&v)).then(|| (v * 255.0).round() as u8)
    };
    match parts.as_slice() {
        [r, g, b] => Some(Rgba([channel(r)?, channel(g)?, channel(b)?, 0xff])),
        [r, g, b, a] => Some(Rgba([channel(r)?, channel(g)?, channel(b)?, alpha(a)?])),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputPreference {
    /// Keyboard when the terminal reports key releases, pointer otherwise.
    #[default]
    Auto,
    Keyboard,
    Pointer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fade_ms: u64,
    pub stop_delay_ms: u64,
    pub keys: Vec<String>,
    pub hold_mode: bool,
    pub input: InputPreference,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub viewport_fraction: f32,
    /// How long a key counts as held after its last press/repeat when the
    /// terminal cannot report releases.
    pub key_release_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fade_ms: 50,
            stop_delay_ms: 60,
            keys: DEFAULT_KEYS.iter().map(|c| c.to_string()).collect(),
            hold_mode: false,
            input: InputPreference::Auto,
            viewport_width: 1280,
            viewport_height: 960,
            viewport_fraction: 0.75,
            key_release_grace_ms: 550,
        }
    }
}

impl EngineConfig {
    pub fn fade(&self) -> Duration {
        Duration::from_millis(self.fade_ms)
    }

    pub fn stop_delay(&self) -> Duration {
        Duration::from_millis(self.stop_delay_ms)
    }

    pub fn key_release_grace(&self) -> Duration {
        Duration::from_millis(self.key_release_grace_ms)
    }

    /// Trigger keys, lowercased, first character of each entry.
    pub fn key_list(&self) -> Vec<char> {
        self.keys
            .iter()
            .filter_map(|k| k.chars().next())
            .map(|c| c.to_ascii_lowercase())
            .collect()
    }

    /// Canvas size for a viewport: full width, `viewport_fraction` of the height,
    /// rounded up to even numbers so the frames can be encoded as yuv420p.
    pub fn canvas_size_for(&self, viewport_width: u32, viewport_height: u32) -> (u32, u32) {
        let height = (viewport_height as f32 * self.viewport_fraction).round() as u32;
        (round_up_even(viewport_width), round_up_even(height))
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.canvas_size_for(self.viewport_width, self.viewport_height)
    }

    fn validate(&self) -> PadResult<()> {
        if self.fade_ms == 0 {
            return Err(PadError::config("engine.fade_ms must be positive"));
        }
        if self.stop_delay_ms < self.fade_ms {
            return Err(PadError::config(
                "engine.stop_delay_ms must not be shorter than engine.fade_ms",
            ));
        }
        if self.keys.len() > MAX_LAYERS {
            return Err(PadError::config(format!(
                "engine.keys holds at most {MAX_LAYERS} keys"
            )));
        }
        if self.keys.iter().any(|k| k.is_empty()) {
            return Err(PadError::config("engine.keys must not contain empty entries"));
        }
        if !(self.viewport_fraction > 0.0 && self.viewport_fraction <= 1.0) {
            return Err(PadError::config("engine.viewport_fraction must be in (0, 1]"));
        }
        Ok(())
    }
}

fn round_up_even(v: u32) -> u32 {
    v + (v % 2)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub fps: u32,
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    pub output_dir: PathBuf,
    pub filename_prefix: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            video_bitrate: 10_000_000,
            audio_bitrate: 256_000,
            output_dir: PathBuf::from("."),
            filename_prefix: "dynamic-pad".to_string(),
        }
    }
}

impl RecordingConfig {
    fn validate(&self) -> PadResult<()> {
        if self.fps == 0 {
            return Err(PadError::config("recording.fps must be positive"));
        }
        if self.video_bitrate == 0 || self.audio_bitrate == 0 {
            return Err(PadError::config("recording bitrates must be positive"));
        }
        if self.filename_prefix.trim().is_empty() {
            return Err(PadError::config("recording.filename_prefix must not be empty"));
        }
        Ok(())
    }
}

/// Where the host projects the record/hold/download buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlsSlot {
    /// Into the host's header bar.
    Header,
    /// Next to the pad surface.
    #[default]
    Inline,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub controls: ControlsSlot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;

    #[test]
    fn empty_manifest_uses_defaults() {
        let config = PadConfig::from_toml("").unwrap();
        assert!(config.media.is_empty());
        assert_eq!(config.engine.fade(), Duration::from_millis(50));
        assert_eq!(config.engine.stop_delay(), Duration::from_millis(60));
        assert_eq!(config.engine.key_list(), DEFAULT_KEYS.to_vec());
        assert_eq!(config.recording.fps, 60);
        assert_eq!(config.ui.controls, ControlsSlot::Inline);
    }

    #[test]
    fn parses_media_and_style() {
        let config = PadConfig::from_toml(
            r##"
            [style]
            backgroundColor = "#102030"
            text = "Night set"
            theme = "light"

            [[media]]
            id = "a"
            url = "kick.wav"

            [[media]]
            id = "b"
            url = "cover"
            kind = "image"
            "##,
        )
        .unwrap();

        assert_eq!(config.media.len(), 2);
        assert_eq!(config.media[0].kind(), MediaKind::Audio);
        assert_eq!(config.media[1].kind(), MediaKind::Image);
        assert_eq!(config.style.background(), Some(Rgba([0x10, 0x20, 0x30, 0xff])));
        assert_eq!(config.style.theme, Theme::Light);
        assert_eq!(config.style.text.as_deref(), Some("Night set"));
    }

    #[test]
    fn rejects_bad_engine_values() {
        assert!(PadConfig::from_toml("[engine]\nfade_ms = 0").is_err());
        assert!(PadConfig::from_toml("[engine]\nviewport_fraction = 1.5").is_err());
        assert!(PadConfig::from_toml("[engine]\nfade_ms = 80\nstop_delay_ms = 60").is_err());
        assert!(
            PadConfig::from_toml(
                "[engine]\nkeys = [\"a\",\"b\",\"c\",\"d\",\"e\",\"f\",\"g\",\"h\",\"i\"]"
            )
            .is_err()
        );
        assert!(PadConfig::from_toml("[recording]\nfps = 0").is_err());
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_color("#fff"), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(parse_color("#11323dff"), Some(Rgba([0x11, 0x32, 0x3d, 0xff])));
        assert_eq!(parse_color("11323d"), None);
        assert_eq!(parse_color("#12345"), None);
        assert_eq!(parse_color("#zzzzzz"), None);
    }

    #[test]
    fn functional_and_named_colors() {
        assert_eq!(parse_color("rgb(17, 50, 61)"), Some(Rgba([17, 50, 61, 255])));
        assert_eq!(parse_color("RGBA(255,0,0,0.5)"), Some(Rgba([255, 0, 0, 128])));
        assert_eq!(parse_color("rgba(0, 0, 0, 50%)"), Some(Rgba([0, 0, 0, 128])));
        assert_eq!(parse_color("rgb(100%, 0%, 0%)"), Some(Rgba([255, 0, 0, 255])));
        assert_eq!(parse_color(" Navy "), Some(Rgba([0, 0, 128, 255])));
        assert_eq!(parse_color("transparent"), Some(Rgba([0, 0, 0, 0])));
        assert_eq!(parse_color("#f008"), Some(Rgba([255, 0, 0, 0x88])));
        assert_eq!(parse_color("rgb(256, 0, 0)"), None);
        assert_eq!(parse_color("rgba(0, 0, 0, 2)"), None);
        assert_eq!(parse_color("rgb(1, 2)"), None);
        assert_eq!(parse_color("hsl(0, 100%, 50%)"), None);
        assert_eq!(parse_color("chartreuse-ish"), None);
    }

    #[test]
    fn named_background_color_is_used() {
        let style = StyleConfig {
            background_color: Some("black".into()),
            ..StyleConfig::default()
        };
        assert_eq!(style.background(), Some(Rgba([0, 0, 0, 255])));
    }

    #[test]
    fn canvas_size_follows_viewport_fraction() {
        let engine = EngineConfig::default();
        assert_eq!(engine.canvas_size(), (1280, 720));
        assert_eq!(engine.canvas_size_for(801, 401), (802, 302));
    }
}
