pub mod ffmpeg;
pub mod format;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError, TrySendError};
use image::RgbaImage;

pub use ffmpeg::FfmpegBackend;
pub use format::{ContainerFormat, recording_filename};

use crate::audio::{AudioDestination, AudioEngine, AudioTrack};
use crate::config::RecordingConfig;
use crate::error::{Capability, RecordError};

/// Frames in flight between the render thread and an encoder.
const FRAME_QUEUE: usize = 120;

/// Everything a backend needs to run one recording.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub format: ContainerFormat,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    /// `None` records video only.
    pub audio: Option<AudioTrack>,
    pub output_dir: PathBuf,
    /// The final name is stamped when the recording is stopped.
    pub filename_prefix: String,
}

impl SessionPlan {
    pub fn stamped_filename(&self, at: chrono::DateTime<chrono::Utc>) -> String {
        recording_filename(&self.filename_prefix, at, self.format)
    }
}

/// The finished recording, ready to hand to the performer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub filename: String,
    pub mime_type: &'static str,
    pub bytes: u64,
    pub with_audio: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// Encoded data was produced; `bytes` is the running total.
    DataAvailable { bytes: u64 },
    Stopped(Artifact),
    Error(String),
}

/// Recorder side of a running session.
#[derive(Debug)]
pub struct RecorderHandle {
    frames: Sender<Arc<RgbaImage>>,
    stop: Sender<String>,
    events: Receiver<RecorderEvent>,
}

/// Backend side of a running session.
#[derive(Debug)]
pub struct SessionEndpoint {
    pub frames: Receiver<Arc<RgbaImage>>,
    /// Carries the filename to finalize under.
    pub stop: Receiver<String>,
    pub events: Sender<RecorderEvent>,
}

impl RecorderHandle {
    pub fn channel() -> (RecorderHandle, SessionEndpoint) {
        let (frame_tx, frame_rx) = channel::bounded(FRAME_QUEUE);
        let (stop_tx, stop_rx) = channel::bounded(1);
        let (event_tx, event_rx) = channel::unbounded();
        (
            RecorderHandle {
                frames: frame_tx,
                stop: stop_tx,
                events: event_rx,
            },
            SessionEndpoint {
                frames: frame_rx,
                stop: stop_rx,
                events: event_tx,
            },
        )
    }

    /// Queue a frame. Returns false when it had to be dropped.
    fn push_frame(&self, frame: Arc<RgbaImage>) -> bool {
        match self.frames.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    fn request_stop(&self, filename: String) {
        let _ = self.stop.try_send(filename);
    }
}

/// A way to turn frames and samples into a file.
pub trait RecorderBackend: Send {
    /// Whether the backend can record at all on this machine.
    fn available(&self) -> bool;

    fn supports(&self, format: ContainerFormat) -> bool;

    /// Whether frames of this size can be captured.
    fn can_capture(&self, width: u32, height: u32) -> bool {
        width > 0 && height > 0 && width % 2 == 0 && height % 2 == 0
    }

    fn start(&mut self, plan: SessionPlan) -> Result<RecorderHandle, RecordError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Requested,
    Recording {
        format: ContainerFormat,
        with_audio: bool,
    },
    Finalizing,
    Exported(Artifact),
    Failed(String),
}

impl RecordingState {
    /// True from the start request until the file is out (or the attempt failed).
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            RecordingState::Requested | RecordingState::Recording { .. } | RecordingState::Finalizing
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started {
        format: ContainerFormat,
        with_audio: bool,
    },
    AlreadyRecording,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderUpdate {
    Exported(Artifact),
    Failed(String),
}

/// Spreads frames over wall-clock time at a fixed rate. When the host draws
/// slower than `fps`, the latest frame is repeated to fill the gap.
#[derive(Debug, Clone)]
pub struct FramePacer {
    fps: u32,
    started: Option<Instant>,
    emitted: u64,
}

impl FramePacer {
    pub fn new(fps: u32) -> Self {
        Self {
            fps: fps.max(1),
            started: None,
            emitted: 0,
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.started = Some(now);
        self.emitted = 0;
    }

    /// Frames owed at `now`, never more than one second's worth at once.
    pub fn frames_due(&mut self, now: Instant) -> u32 {
        let Some(started) = self.started else {
            return 0;
        };
        let elapsed = now.saturating_duration_since(started).as_secs_f64();
        let target = (elapsed * f64::from(self.fps)).floor() as u64 + 1;
        let due = target.saturating_sub(self.emitted).min(u64::from(self.fps));
        self.emitted = self.emitted.max(target);
        due as u32
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

/// Record/stop/export state machine. Reads the canvas and the audio graph;
/// never touches voices.
pub struct Recorder {
    backend: Box<dyn RecorderBackend>,
    config: RecordingConfig,
    state: RecordingState,
    destination: Option<AudioDestination>,
    track: Option<AudioTrack>,
    handle: Option<RecorderHandle>,
    pacer: FramePacer,
    bytes_seen: u64,
    dropped_frames: u64,
    last_error: Option<String>,
    latest: Option<Artifact>,
}

impl Recorder {
    pub fn new(backend: Box<dyn RecorderBackend>, config: RecordingConfig) -> Self {
        let fps = config.fps;
        Self {
            backend,
            config,
            state: RecordingState::Idle,
            destination: None,
            track: None,
            handle: None,
            pacer: FramePacer::new(fps),
            bytes_seen: 0,
            dropped_frames: 0,
            last_error: None,
            latest: None,
        }
    }

    pub fn state(&self) -> &RecordingState {
        &self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state.is_busy()
    }

    /// Message to show the performer for the last failed attempt.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Most recent exported file, kept until the next one replaces it.
    pub fn latest_artifact(&self) -> Option<&Artifact> {
        self.latest.as_ref()
    }

    pub fn bytes_recorded(&self) -> u64 {
        self.bytes_seen
    }

    pub fn start(
        &mut self,
        canvas_size: (u32, u32),
        audio: &AudioEngine,
        now: Instant,
    ) -> Result<StartOutcome, RecordError> {
        if self.state.is_busy() {
            return Ok(StartOutcome::AlreadyRecording);
        }

        let (width, height) = canvas_size;
        if !self.backend.available() {
            return Err(self.unsupported(Capability::MediaRecorder));
        }
        if !self.backend.can_capture(width, height) {
            return Err(self.unsupported(Capability::CanvasCapture));
        }
        let Some(format) = ContainerFormat::choose(|f| self.backend.supports(f)) else {
            return Err(self.unsupported(Capability::MediaRecorder));
        };

        self.state = RecordingState::Requested;
        self.last_error = None;

        // The destination is created and wired to the master output only once
        // per recorder; later sessions reuse it.
        if self.destination.is_none() {
            self.destination = audio.create_stream_destination();
        }
        let track = match self.destination.as_mut() {
            Some(destination) => audio
                .connect_master(destination)
                .then(|| destination.track()),
            None => None,
        };
        if let Some(track) = &track {
            track.arm();
        } else {
            tracing::info!("no audio tap available, recording video only");
        }
        let with_audio = track.is_some();

        let plan = SessionPlan {
            format,
            width,
            height,
            fps: self.config.fps,
            video_bitrate: self.config.video_bitrate,
            audio_bitrate: self.config.audio_bitrate,
            audio: track.clone(),
            output_dir: self.config.output_dir.clone(),
            filename_prefix: self.config.filename_prefix.clone(),
        };

        match self.backend.start(plan) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.track = track;
                self.pacer.reset(now);
                self.bytes_seen = 0;
                self.dropped_frames = 0;
                self.state = RecordingState::Recording { format, with_audio };
                tracing::info!(format = format.mime_type(), with_audio, "recording started");
                Ok(StartOutcome::Started { format, with_audio })
            }
            Err(err) => {
                if let Some(track) = &track {
                    track.stop();
                }
                tracing::error!(error = %err, "recording failed to start");
                self.last_error = Some(err.user_message().to_string());
                self.state = RecordingState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    fn unsupported(&mut self, capability: Capability) -> RecordError {
        let err = RecordError::Unsupported(capability);
        tracing::warn!(%capability, "recording unavailable");
        self.last_error = Some(err.user_message().to_string());
        err
    }

    fn stamp(&self, format: ContainerFormat) -> String {
        recording_filename(&self.config.filename_prefix, chrono::Utc::now(), format)
    }

    /// Ask the backend to finalize. Returns false when nothing was recording.
    pub fn stop(&mut self) -> bool {
        let RecordingState::Recording { format, .. } = self.state else {
            return false;
        };
        if let Some(handle) = &self.handle {
            handle.request_stop(self.stamp(format));
        }
        if let Some(track) = &self.track {
            track.stop();
        }
        self.state = RecordingState::Finalizing;
        tracing::info!(dropped_frames = self.dropped_frames, "recording finalizing");
        true
    }

    /// Feed the current canvas. Repeats it as often as wall clock demands.
    pub fn capture(&mut self, canvas: &RgbaImage, now: Instant) {
        if !matches!(self.state, RecordingState::Recording { .. }) {
            return;
        }
        let Some(handle) = &self.handle else {
            return;
        };
        let due = self.pacer.frames_due(now);
        if due == 0 {
            return;
        }
        let frame = Arc::new(canvas.clone());
        for _ in 0..due {
            if !handle.push_frame(Arc::clone(&frame)) {
                self.dropped_frames += 1;
            }
        }
    }

    /// Drain backend events and advance the state machine.
    pub fn poll(&mut self) -> Vec<RecorderUpdate> {
        let mut updates = Vec::new();
        loop {
            let Some(handle) = &self.handle else {
                break;
            };
            let event = match handle.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    RecorderEvent::Error("recording backend went away".to_string())
                }
            };

            match event {
                RecorderEvent::DataAvailable { bytes } => self.bytes_seen = bytes,
                RecorderEvent::Stopped(artifact) => {
                    tracing::info!(path = %artifact.path.display(), bytes = artifact.bytes, "recording exported");
                    self.release();
                    self.latest = Some(artifact.clone());
                    self.state = RecordingState::Exported(artifact.clone());
                    updates.push(RecorderUpdate::Exported(artifact));
                }
                RecorderEvent::Error(reason) => {
                    tracing::error!(%reason, "recording failed");
                    self.release();
                    let message = RecordError::Runtime(reason.clone()).user_message().to_string();
                    self.last_error = Some(message.clone());
                    self.state = RecordingState::Failed(reason);
                    updates.push(RecorderUpdate::Failed(message));
                }
            }
        }
        updates
    }

    fn release(&mut self) {
        if let Some(track) = self.track.take() {
            track.stop();
        }
        self.handle = None;
    }

    /// Stop whatever is running and let go of it. Safe to call at any time.
    pub fn shutdown(&mut self) {
        if let RecordingState::Recording { format, .. } = self.state
            && let Some(handle) = &self.handle
        {
            handle.request_stop(self.stamp(format));
        }
        self.release();
        if self.state.is_busy() {
            tracing::info!("recording stopped by teardown");
        }
        self.state = RecordingState::Idle;
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("state", &self.state)
            .field("has_destination", &self.destination.is_some())
            .finish_non_exhaustive()
    }
}

/// Wait (bounded) for a recorder to leave the finalizing state. Handy for
/// headless hosts that stop and then need the file.
pub fn wait_for_export(recorder: &mut Recorder, timeout: Duration) -> Option<RecorderUpdate> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(update) = recorder.poll().into_iter().next() {
            return Some(update);
        }
        if !recorder.is_recording() {
            return None;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    None
}
