// Recording through the system ffmpeg binary.
//
// A session runs on its own thread: frames are piped into a video-only encode,
// the audio tap is drained into a WAV next to it, and on stop both are muxed
// into the final container.

use std::collections::HashSet;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};
use image::RgbaImage;
use image::imageops::{self, FilterType};

use super::{
    Artifact, ContainerFormat, RecorderBackend, RecorderEvent, RecorderHandle, SessionEndpoint,
    SessionPlan,
};
use crate::audio::AudioTrack;
use crate::error::RecordError;

/// How often the worker drains the audio tap while no frames arrive.
const AUDIO_DRAIN_INTERVAL: Duration = Duration::from_millis(20);

/// Encoders listed by `ffmpeg -encoders`, queried once per process.
fn encoder_list() -> Option<&'static HashSet<String>> {
    static ENCODERS: OnceLock<Option<HashSet<String>>> = OnceLock::new();
    ENCODERS
        .get_or_init(|| {
            let out = Command::new("ffmpeg")
                .args(["-hide_banner", "-encoders"])
                .stdin(Stdio::null())
                .stderr(Stdio::null())
                .output()
                .ok()?;
            if !out.status.success() {
                return None;
            }
            let encoders = parse_encoder_list(&String::from_utf8_lossy(&out.stdout));
            tracing::debug!(count = encoders.len(), "ffmpeg encoders listed");
            Some(encoders)
        })
        .as_ref()
}

/// Pull encoder names out of `ffmpeg -encoders` output. Everything up to the
/// ` ------` separator is legend.
pub fn parse_encoder_list(text: &str) -> HashSet<String> {
    text.lines()
        .skip_while(|line| !line.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            (flags.len() == 6).then(|| name.to_string())
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct FfmpegBackend {
    /// Overrides the detected encoder list.
    encoders: Option<HashSet<String>>,
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoders(encoders: HashSet<String>) -> Self {
        Self {
            encoders: Some(encoders),
        }
    }

    fn encoders(&self) -> Option<&HashSet<String>> {
        self.encoders.as_ref().or_else(|| encoder_list())
    }
}

impl RecorderBackend for FfmpegBackend {
    fn available(&self) -> bool {
        self.encoders().is_some()
    }

    fn supports(&self, format: ContainerFormat) -> bool {
        self.encoders().is_some_and(|list| {
            list.contains(format.video_encoder()) && list.contains(format.audio_encoder())
        })
    }

    fn start(&mut self, plan: SessionPlan) -> Result<RecorderHandle, RecordError> {
        fs::create_dir_all(&plan.output_dir).map_err(|e| {
            RecordError::Backend(format!(
                "cannot create output directory '{}': {e}",
                plan.output_dir.display()
            ))
        })?;
        let scratch = tempfile::Builder::new()
            .prefix("dynamicpad-rec-")
            .tempdir()
            .map_err(|e| RecordError::Backend(format!("cannot create temp dir: {e}")))?;

        let video_path = scratch.path().join(format!("video.{}", plan.format.extension()));
        let mut encoder = VideoEncoder::spawn(&plan, &video_path)?;
        let audio = match &plan.audio {
            Some(track) => Some(AudioSink::create(track, &scratch.path().join("audio.wav"))?),
            None => None,
        };

        let (handle, endpoint) = RecorderHandle::channel();
        let session = Session {
            plan,
            scratch,
            video_path,
            audio,
        };
        thread::Builder::new()
            .name("pad-recorder".into())
            .spawn(move || {
                let events = endpoint.events.clone();
                match session.run(&mut encoder, &endpoint) {
                    Ok(artifact) => {
                        let _ = events.send(RecorderEvent::DataAvailable {
                            bytes: artifact.bytes,
                        });
                        let _ = events.send(RecorderEvent::Stopped(artifact));
                    }
                    Err(reason) => {
                        encoder.abort();
                        let _ = events.send(RecorderEvent::Error(reason));
                    }
                }
            })
            .map_err(|e| RecordError::Backend(format!("cannot spawn recorder thread: {e}")))?;

        Ok(handle)
    }
}

pub fn video_args(plan: &SessionPlan, out: &Path) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.extend([
        "-s".to_string(),
        format!("{}x{}", plan.width, plan.height),
        "-r".to_string(),
        plan.fps.to_string(),
        "-i".to_string(),
        "pipe:0".to_string(),
        "-an".to_string(),
        "-c:v".to_string(),
        plan.format.video_encoder().to_string(),
        "-b:v".to_string(),
        plan.video_bitrate.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ]);
    if plan.format.extension() == "mp4" {
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    }
    args.push(out.display().to_string());
    args
}

pub fn mux_args(plan: &SessionPlan, video: &Path, audio: &Path, out: &Path) -> Vec<String> {
    let mut args: Vec<String> = ["-y", "-loglevel", "error", "-i"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(video.display().to_string());
    args.push("-i".to_string());
    args.push(audio.display().to_string());
    args.extend([
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "1:a:0".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        plan.format.audio_encoder().to_string(),
        "-b:a".to_string(),
        plan.audio_bitrate.to_string(),
        "-shortest".to_string(),
    ]);
    if plan.format.extension() == "mp4" {
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    }
    args.push(out.display().to_string());
    args
}

struct VideoEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    /// Collects ffmpeg's stderr while frames are written, so a full pipe
    /// never blocks the encoder.
    stderr: Option<thread::JoinHandle<String>>,
    width: u32,
    height: u32,
}

fn drain_to_string(mut pipe: impl Read + Send + 'static) -> Option<thread::JoinHandle<String>> {
    thread::Builder::new()
        .name("ffmpeg-stderr".into())
        .spawn(move || {
            let mut text = String::new();
            let _ = pipe.read_to_string(&mut text);
            text
        })
        .ok()
}

impl VideoEncoder {
    fn spawn(plan: &SessionPlan, out: &Path) -> Result<Self, RecordError> {
        let mut child = Command::new("ffmpeg")
            .args(video_args(plan, out))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RecordError::Backend(format!("failed to spawn ffmpeg: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecordError::Backend("failed to open ffmpeg stdin".into()))?;
        let stderr = child.stderr.take().and_then(drain_to_string);
        Ok(Self {
            child,
            stdin: Some(stdin),
            stderr,
            width: plan.width,
            height: plan.height,
        })
    }

    fn write(&mut self, frame: &RgbaImage) -> Result<(), String> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err("video encoder already finished".into());
        };
        // The canvas may have been resized mid-take; the stream size is fixed.
        let result = if frame.dimensions() == (self.width, self.height) {
            stdin.write_all(frame.as_raw())
        } else {
            let scaled = imageops::resize(frame, self.width, self.height, FilterType::Nearest);
            stdin.write_all(scaled.as_raw())
        };
        result.map_err(|e| format!("failed to write frame to ffmpeg: {e}"))
    }

    fn finish(&mut self) -> Result<(), String> {
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| format!("failed to wait for ffmpeg: {e}"))?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(format!("ffmpeg exited with {status}: {}", stderr.trim()));
        }
        Ok(())
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

struct AudioSink {
    track: AudioTrack,
    writer: WavWriter<std::io::BufWriter<fs::File>>,
    path: PathBuf,
    buffer: Vec<f32>,
    written: u64,
}

impl AudioSink {
    fn create(track: &AudioTrack, path: &Path) -> Result<Self, RecordError> {
        let spec = WavSpec {
            channels: track.channels(),
            sample_rate: track.sample_rate(),
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(path, spec)
            .map_err(|e| RecordError::Backend(format!("cannot create audio scratch file: {e}")))?;
        Ok(Self {
            track: track.clone(),
            writer,
            path: path.to_path_buf(),
            buffer: Vec::with_capacity(8192),
            written: 0,
        })
    }

    fn drain(&mut self) -> Result<(), String> {
        self.buffer.clear();
        self.track.read_into(&mut self.buffer);
        if self.track.check_and_clear_overrun() {
            tracing::warn!("recording audio tap overran, samples dropped");
        }
        for &sample in &self.buffer {
            self.writer
                .write_sample(sample)
                .map_err(|e| format!("failed to write audio: {e}"))?;
        }
        self.written += self.buffer.len() as u64;
        Ok(())
    }

    fn finish(mut self) -> Result<(PathBuf, u64), String> {
        self.drain()?;
        self.writer
            .finalize()
            .map_err(|e| format!("failed to finalize audio: {e}"))?;
        Ok((self.path, self.written))
    }
}

enum Step {
    Frame(Arc<RgbaImage>),
    Finish(String),
    Idle,
}

struct Session {
    plan: SessionPlan,
    /// Removed when the session ends, however it ends.
    scratch: tempfile::TempDir,
    video_path: PathBuf,
    audio: Option<AudioSink>,
}

impl Session {
    fn run(mut self, encoder: &mut VideoEncoder, endpoint: &SessionEndpoint) -> Result<Artifact, String> {
        let mut frames_written: u64 = 0;
        let filename = loop {
            let step = crossbeam::select! {
                recv(endpoint.frames) -> frame => match frame {
                    Ok(frame) => Step::Frame(frame),
                    Err(_) => Step::Finish(self.plan.stamped_filename(chrono::Utc::now())),
                },
                recv(endpoint.stop) -> name => Step::Finish(
                    name.unwrap_or_else(|_| self.plan.stamped_filename(chrono::Utc::now())),
                ),
                default(AUDIO_DRAIN_INTERVAL) => Step::Idle,
            };
            match step {
                Step::Frame(frame) => {
                    encoder.write(&frame)?;
                    frames_written += 1;
                }
                Step::Finish(filename) => break filename,
                Step::Idle => {}
            }
            if let Some(audio) = self.audio.as_mut() {
                audio.drain()?;
            }
        };

        // Frames queued before the stop still belong to the take.
        while let Ok(frame) = endpoint.frames.try_recv() {
            encoder.write(&frame)?;
            frames_written += 1;
        }
        if frames_written == 0 {
            return Err("no frames were captured".into());
        }
        encoder.finish()?;

        let target = self.plan.output_dir.join(&filename);
        let audio = self.audio.take().map(AudioSink::finish).transpose()?;
        let with_audio = match audio {
            Some((wav, samples)) if samples > 0 => {
                run_ffmpeg(mux_args(&self.plan, &self.video_path, &wav, &target))?;
                true
            }
            _ => {
                fs::copy(&self.video_path, &target)
                    .map_err(|e| format!("failed to move recording into place: {e}"))?;
                false
            }
        };

        let bytes = fs::metadata(&target).map(|m| m.len()).unwrap_or(0);
        tracing::debug!(
            frames = frames_written,
            scratch = %self.scratch.path().display(),
            "recording session finished"
        );
        Ok(Artifact {
            path: target,
            filename,
            mime_type: self.plan.format.mime_type(),
            bytes,
            with_audio,
        })
    }
}

fn run_ffmpeg(args: Vec<String>) -> Result<(), String> {
    let out = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| format!("failed to run ffmpeg: {e}"))?;
    if !out.status.success() {
        return Err(format!(
            "ffmpeg mux failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        ));
    }
    Ok(())
}
