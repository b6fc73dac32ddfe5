// Decoded, muted, looping video clips.

use std::process::Command;
use std::time::{Duration, Instant};

use image::RgbaImage;

use crate::error::AssetError;
use crate::media::MediaSource;

/// Longest edge a decoded frame is scaled down to. The terminal canvas is far
/// smaller than this, so nothing visible is lost.
pub const MAX_FRAME_EDGE: u32 = 320;
/// Upper bound on frames held in memory per clip.
pub const MAX_FRAMES: u32 = 240;
const FALLBACK_FPS: f64 = 30.0;

#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_sec: f64,
}

/// A video held as RGBA frames and played back by wall clock.
///
/// Loops continuously from the moment it is created, independent of any
/// voice. Pausing freezes the current frame; resuming continues from it.
#[derive(Debug, Clone)]
pub struct VideoLoop {
    frames: Vec<RgbaImage>,
    fps: f64,
    /// Playback time accumulated before the last resume.
    banked: Duration,
    resumed_at: Option<Instant>,
    current: usize,
}

impl VideoLoop {
    pub fn new(frames: Vec<RgbaImage>, fps: f64, now: Instant) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 {
            fps
        } else {
            FALLBACK_FPS
        };
        Self {
            frames,
            fps,
            banked: Duration::ZERO,
            resumed_at: Some(now),
            current: 0,
        }
    }

    /// Inspect and decode `source` with ffprobe and ffmpeg.
    pub fn load(source: &MediaSource, now: Instant) -> Result<Self, AssetError> {
        let input = source.ffmpeg_input();
        let info = inspect(&input)?;
        let (width, height) = bounded_size(info.width, info.height, MAX_FRAME_EDGE);
        let budget = frame_budget(&info);
        if budget.truncated {
            tracing::warn!(
                source = %input,
                duration_sec = info.duration_sec,
                kept_sec = f64::from(budget.frames) / info.fps,
                max_frames = MAX_FRAMES,
                "video longer than the frame cap, looping its opening only"
            );
        }

        let out = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(&input)
            .args(["-an", "-vf"])
            .arg(format!("scale={width}:{height}"))
            .args(["-frames:v", &budget.frames.to_string()])
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .output()
            .map_err(|e| ffmpeg_spawn_error(&input, e))?;
        if !out.status.success() {
            return Err(AssetError::decode(
                input,
                String::from_utf8_lossy(&out.stderr).trim(),
            ));
        }

        let frame_len = width as usize * height as usize * 4;
        let frames: Vec<RgbaImage> = out
            .stdout
            .chunks_exact(frame_len)
            .filter_map(|chunk| RgbaImage::from_raw(width, height, chunk.to_vec()))
            .collect();
        if frames.is_empty() {
            return Err(AssetError::decode(input, "ffmpeg returned no video frames"));
        }

        tracing::debug!(
            source = %input,
            frames = frames.len(),
            width,
            height,
            fps = info.fps,
            "video decoded"
        );
        Ok(Self::new(frames, info.fps, now))
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.frames.first().map_or((0, 0), |f| f.dimensions())
    }

    pub fn is_paused(&self) -> bool {
        self.resumed_at.is_none()
    }

    pub fn pause(&mut self, now: Instant) {
        if let Some(since) = self.resumed_at.take() {
            self.banked += now.saturating_duration_since(since);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if self.resumed_at.is_none() {
            self.resumed_at = Some(now);
        }
    }

    /// Move the playhead to wall-clock time `now`.
    pub fn advance(&mut self, now: Instant) {
        if self.frames.is_empty() {
            return;
        }
        let elapsed = self.banked
            + self
                .resumed_at
                .map_or(Duration::ZERO, |since| now.saturating_duration_since(since));
        let frame = (elapsed.as_secs_f64() * self.fps).floor() as usize;
        self.current = frame % self.frames.len();
    }

    pub fn current_frame(&self) -> Option<&RgbaImage> {
        self.frames.get(self.current)
    }

    /// Drop every frame. The loop renders nothing afterwards.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.current = 0;
    }
}

pub fn inspect(input: &str) -> Result<VideoInfo, AssetError> {
    #[derive(serde::Deserialize)]
    struct StreamJson {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct FormatJson {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ReportJson {
        streams: Vec<StreamJson>,
        format: Option<FormatJson>,
    }

    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(input)
        .output()
        .map_err(|e| ffmpeg_spawn_error(input, e))?;
    if !out.status.success() {
        return Err(AssetError::decode(
            input,
            String::from_utf8_lossy(&out.stderr).trim(),
        ));
    }

    let parsed: ReportJson = serde_json::from_slice(&out.stdout)
        .map_err(|e| AssetError::decode(input, format!("ffprobe json: {e}")))?;
    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| AssetError::decode(input, "no video stream"))?;
    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        return Err(AssetError::decode(input, "missing video dimensions"));
    };

    let fps = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_ratio)
        .unwrap_or(FALLBACK_FPS);
    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(VideoInfo {
        width,
        height,
        fps,
        duration_sec,
    })
}

fn ffmpeg_spawn_error(input: &str, e: std::io::Error) -> AssetError {
    match e.kind() {
        std::io::ErrorKind::NotFound => AssetError::FfmpegMissing(input.to_string()),
        _ => AssetError::decode(input, e),
    }
}

fn parse_ratio(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    (den > 0.0 && num > 0.0).then_some(num / den)
}

/// Scale `(w, h)` so the longer edge is at most `max_edge`, keeping both even.
pub fn bounded_size(w: u32, h: u32, max_edge: u32) -> (u32, u32) {
    let longest = w.max(h).max(1);
    let scale = (f64::from(max_edge) / f64::from(longest)).min(1.0);
    let even = |v: u32| {
        let scaled = (f64::from(v) * scale).round() as u32;
        (scaled.max(2) + 1) & !1
    };
    (even(w), even(h))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameBudget {
    frames: u32,
    /// The clip runs past `MAX_FRAMES`; only its opening is kept.
    truncated: bool,
}

fn frame_budget(info: &VideoInfo) -> FrameBudget {
    if info.duration_sec <= 0.0 {
        // Unknown length: decode up to the cap without claiming truncation.
        return FrameBudget {
            frames: MAX_FRAMES,
            truncated: false,
        };
    }
    let wanted = (info.duration_sec * info.fps).ceil();
    FrameBudget {
        frames: (wanted.min(f64::from(MAX_FRAMES)) as u32).max(1),
        truncated: wanted > f64::from(MAX_FRAMES),
    }
}
