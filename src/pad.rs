use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};

use crate::assets::{AssetBinder, BoundAssets, LayerKind};
use crate::audio::{AudioConfig, AudioEngine, AudioOutput, Mixer};
use crate::config::PadConfig;
use crate::error::{PadResult, RecordError};
use crate::input::{EdgeDetector, InputModality, KeyboardState};
use crate::record::{
    Artifact, ContainerFormat, FfmpegBackend, Recorder, RecorderBackend, RecorderUpdate,
    RecordingState, StartOutcome, wait_for_export,
};
use crate::render::{PHASE_STEP, Renderer};
use crate::touch::{TouchPoint, TouchTracker};
use crate::trigger::{GridPartition, SurfaceRect, TriggerMapper};
use crate::voice::{LayerTrigger, VoiceController, VoiceDriver};

/// Things the host should react to. Drained with [`Pad::drain_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum PadEvent {
    AssetFailed {
        index: usize,
        id: String,
        message: String,
    },
    RecordingStarted {
        format: ContainerFormat,
        with_audio: bool,
    },
    RecordingReady(Artifact),
    RecordingFailed(String),
    /// Informational message for the performer.
    Notice(String),
}

#[derive(Debug, Clone)]
struct Layer {
    id: String,
    kind: LayerKind,
    visual_phase: f32,
}

/// One mounted pad: every layer, its voices, the canvas and the recorder.
pub struct Pad {
    config: PadConfig,
    layers: Vec<Layer>,
    assets: BoundAssets,
    voices: VoiceController,
    mapper: TriggerMapper,
    touches: TouchTracker,
    keys: KeyboardState,
    edges: EdgeDetector,
    hold_mode: bool,
    modality: InputModality,
    surface: SurfaceRect,
    renderer: Renderer,
    recorder: Recorder,
    audio: AudioEngine,
    events: Vec<PadEvent>,
    torn_down: bool,
}

impl Pad {
    /// Open the audio device, bind every descriptor and get ready to play.
    ///
    /// Missing audio hardware is not an error: the pad runs silent.
    pub fn mount(config: PadConfig, reports_key_release: bool) -> PadResult<Self> {
        config.validate()?;
        let audio_config = AudioConfig::default();
        let now = Instant::now();

        let output = match AudioOutput::open(&audio_config) {
            Ok(output) => Some(output),
            Err(err) => {
                tracing::warn!(error = %err, "no audio output, running silent");
                None
            }
        };
        let sample_rate = output
            .as_ref()
            .map_or(audio_config.sample_rate, AudioOutput::sample_rate);

        let binder = AssetBinder::new(config.base_dir.clone(), sample_rate);
        let assets = binder.bind(&config.media, now);

        let audio = match output {
            Some(output) => AudioEngine::live(output, assets.clips(), &audio_config)
                .unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "audio output failed to start, running silent");
                    AudioEngine::silent(&audio_config)
                }),
            None => AudioEngine::silent(&audio_config),
        };

        Ok(Self::assemble(
            config,
            assets,
            audio,
            Box::new(FfmpegBackend::new()),
            reports_key_release,
        ))
    }

    /// Build a pad from already-bound parts. Used by headless hosts and tests.
    pub fn assemble(
        config: PadConfig,
        mut assets: BoundAssets,
        audio: AudioEngine,
        recorder_backend: Box<dyn RecorderBackend>,
        reports_key_release: bool,
    ) -> Self {
        let engine = &config.engine;
        let layer_count = assets.layer_count();

        let voices = VoiceController::new(
            (0..layer_count).map(|i| assets.is_playable(i)),
            audio.command_sender(),
            engine.fade(),
            engine.stop_delay(),
        );
        let mapper = TriggerMapper::new(engine.key_list(), layer_count);
        let modality = InputModality::resolve(engine.input, reports_key_release);

        let (width, height) = engine.canvas_size();
        let background = config
            .style
            .background()
            .unwrap_or(config.style.theme.palette().text_secondary);
        let renderer = Renderer::new(width, height, background);
        let surface = SurfaceRect::from_size(width as f32, height as f32);

        let layers = (0..layer_count)
            .map(|i| Layer {
                id: assets.layer_id(i).unwrap_or_default().to_string(),
                kind: assets.layer_kind(i),
                visual_phase: i as f32,
            })
            .collect();

        let events = assets
            .take_failures()
            .into_iter()
            .map(|failure| PadEvent::AssetFailed {
                index: failure.index,
                id: failure.id,
                message: failure.error.to_string(),
            })
            .collect();

        tracing::info!(
            layers = layer_count,
            ?modality,
            audio = audio.device_name(),
            "pad mounted"
        );

        Self {
            keys: KeyboardState::new(reports_key_release, engine.key_release_grace()),
            hold_mode: engine.hold_mode,
            recorder: Recorder::new(recorder_backend, config.recording.clone()),
            config,
            layers,
            assets,
            voices,
            mapper,
            touches: TouchTracker::new(),
            edges: EdgeDetector::default(),
            modality,
            surface,
            renderer,
            audio,
            events,
            torn_down: false,
        }
    }

    /// Run one frame: timers, input polling, compositing and capture.
    pub fn frame(&mut self, now: Instant) {
        if self.torn_down {
            return;
        }

        for update in self.recorder.poll() {
            self.events.push(match update {
                RecorderUpdate::Exported(artifact) => PadEvent::RecordingReady(artifact),
                RecorderUpdate::Failed(message) => PadEvent::RecordingFailed(message),
            });
        }
        self.voices.poll_timers(now);
        self.assets.advance_videos(now);

        self.renderer.begin_frame();
        if self.voices.any_active()
            && let Some(frame) = self.assets.background_video().and_then(|v| v.current_frame())
        {
            self.renderer.draw_background_video(frame);
        }

        if self.modality == InputModality::Keyboard {
            self.poll_keys(now);
        }

        let grid = self.mapper.grid();
        for (index, layer) in self.layers.iter_mut().enumerate() {
            if !self.voices.is_active(index) {
                continue;
            }
            layer.visual_phase += PHASE_STEP;
            if let Some(image) = self.assets.paired_image(index) {
                self.renderer
                    .draw_layer_image(&grid, index, image, layer.visual_phase);
            }
        }

        self.recorder.capture(self.renderer.canvas(), now);

        for error in self.audio.pump() {
            tracing::warn!(%error, "audio stream error");
            self.events.push(PadEvent::Notice(format!("Audio error: {error}")));
        }
    }

    fn poll_keys(&mut self, now: Instant) {
        let mut driver = VoiceDriver {
            voices: &mut self.voices,
            assets: &mut self.assets,
            now,
        };
        for (layer, key) in self.mapper.mapped_keys() {
            let down = self.keys.is_down(key, now);
            if self.hold_mode {
                if self.edges.rising(layer, down) {
                    driver.toggle(layer);
                }
            } else if down {
                driver.activate(layer);
            } else {
                driver.deactivate(layer);
            }
        }
    }

    /// Key press or auto-repeat from the host.
    pub fn key_down(&mut self, key: char, now: Instant) {
        self.keys.press(key, now);
    }

    pub fn key_up(&mut self, key: char) {
        self.keys.release(key);
    }

    pub fn touch_start(&mut self, points: &[TouchPoint], now: Instant) {
        if self.torn_down || self.modality != InputModality::Pointer {
            return;
        }
        let mut driver = VoiceDriver {
            voices: &mut self.voices,
            assets: &mut self.assets,
            now,
        };
        self.touches
            .touch_start(points, &self.surface, &self.mapper, self.hold_mode, &mut driver);
    }

    pub fn touch_move(&mut self, points: &[TouchPoint], now: Instant) {
        if self.torn_down || self.modality != InputModality::Pointer {
            return;
        }
        let mut driver = VoiceDriver {
            voices: &mut self.voices,
            assets: &mut self.assets,
            now,
        };
        self.touches
            .touch_move(points, &self.surface, &self.mapper, &mut driver);
    }

    /// Touch end or cancel.
    pub fn touch_end(&mut self, points: &[TouchPoint], now: Instant) {
        if self.torn_down || self.modality != InputModality::Pointer {
            return;
        }
        let mut driver = VoiceDriver {
            voices: &mut self.voices,
            assets: &mut self.assets,
            now,
        };
        self.touches.touch_end(points, self.hold_mode, &mut driver);
    }

    pub fn hold_mode(&self) -> bool {
        self.hold_mode
    }

    /// Switching into hold mode treats keys that are already down as old news,
    /// so they do not toggle on the next frame.
    pub fn set_hold_mode(&mut self, on: bool, now: Instant) {
        if on && !self.hold_mode {
            for (layer, key) in self.mapper.mapped_keys() {
                self.edges.rising(layer, self.keys.is_down(key, now));
            }
        }
        self.hold_mode = on;
        tracing::debug!(hold = on, "hold mode");
    }

    pub fn toggle_hold_mode(&mut self, now: Instant) -> bool {
        self.set_hold_mode(!self.hold_mode, now);
        self.hold_mode
    }

    pub fn start_recording(&mut self, now: Instant) -> Result<StartOutcome, RecordError> {
        let result = self
            .recorder
            .start(self.renderer.size(), &self.audio, now);
        match &result {
            Ok(StartOutcome::Started { format, with_audio }) => {
                self.events.push(PadEvent::RecordingStarted {
                    format: *format,
                    with_audio: *with_audio,
                });
            }
            Ok(StartOutcome::AlreadyRecording) => {}
            Err(err @ RecordError::Unsupported(_)) => {
                self.events.push(PadEvent::Notice(err.user_message().to_string()));
            }
            Err(err) => {
                self.events
                    .push(PadEvent::RecordingFailed(err.user_message().to_string()));
            }
        }
        result
    }

    pub fn stop_recording(&mut self) -> bool {
        self.recorder.stop()
    }

    /// Stop and block until the file is written, the session fails or
    /// `timeout` passes.
    pub fn finish_recording(&mut self, timeout: Duration) -> Option<Artifact> {
        self.stop_recording();
        if self.recorder.state() != &RecordingState::Finalizing {
            return None;
        }
        match wait_for_export(&mut self.recorder, timeout)? {
            RecorderUpdate::Exported(artifact) => {
                self.events.push(PadEvent::RecordingReady(artifact.clone()));
                Some(artifact)
            }
            RecorderUpdate::Failed(message) => {
                self.events.push(PadEvent::RecordingFailed(message));
                None
            }
        }
    }

    /// Rec/Stop button.
    pub fn toggle_recording(&mut self, now: Instant) {
        if matches!(self.recorder.state(), RecordingState::Recording { .. }) {
            self.stop_recording();
        } else {
            match self.start_recording(now) {
                Ok(StartOutcome::Started { .. }) => {}
                Ok(StartOutcome::AlreadyRecording) => {
                    tracing::debug!("record toggle ignored while finalizing");
                }
                Err(err) => tracing::warn!(error = %err, "record toggle failed to start"),
            }
        }
    }

    pub fn recording_state(&self) -> &RecordingState {
        self.recorder.state()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn record_error(&self) -> Option<&str> {
        self.recorder.last_error()
    }

    /// Encoded bytes reported by the running session so far.
    pub fn recorded_bytes(&self) -> u64 {
        self.recorder.bytes_recorded()
    }

    pub fn latest_recording(&self) -> Option<&Artifact> {
        self.recorder.latest_artifact()
    }

    /// New viewport size from the host. The canvas keeps the configured
    /// fraction of its height and the surface follows it in canvas pixels;
    /// hosts that lay the canvas out elsewhere call `set_surface` afterwards.
    pub fn resize_viewport(&mut self, width: u32, height: u32) {
        let (w, h) = self.config.engine.canvas_size_for(width, height);
        self.renderer.resize(w, h);
        self.surface = SurfaceRect::from_size(w as f32, h as f32);
        tracing::debug!(width = w, height = h, "canvas resized");
    }

    /// Where the surface sits in the coordinates touch points are given in.
    pub fn set_surface(&mut self, rect: SurfaceRect) {
        self.surface = rect;
    }

    pub fn surface(&self) -> SurfaceRect {
        self.surface
    }

    pub fn canvas(&self) -> &RgbaImage {
        self.renderer.canvas()
    }

    pub fn background(&self) -> Rgba<u8> {
        self.renderer.background()
    }

    pub fn grid(&self) -> GridPartition {
        self.mapper.grid()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer_id(&self, layer: usize) -> Option<&str> {
        self.layers.get(layer).map(|l| l.id.as_str())
    }

    pub fn layer_kind(&self, layer: usize) -> Option<LayerKind> {
        self.layers.get(layer).map(|l| l.kind)
    }

    pub fn visual_phase(&self, layer: usize) -> Option<f32> {
        self.layers.get(layer).map(|l| l.visual_phase)
    }

    pub fn is_active(&self, layer: usize) -> bool {
        self.voices.is_active(layer)
    }

    pub fn key_for_layer(&self, layer: usize) -> Option<char> {
        self.mapper.key_for_layer(layer)
    }

    pub fn modality(&self) -> InputModality {
        self.modality
    }

    pub fn active_touches(&self) -> usize {
        self.touches.len()
    }

    pub fn style_text(&self) -> Option<&str> {
        self.config.style.text.as_deref()
    }

    pub fn config(&self) -> &PadConfig {
        &self.config
    }

    pub fn audio_device(&self) -> &str {
        self.audio.device_name()
    }

    /// Help line shown under the pad.
    pub fn key_hint_text(&self) -> String {
        match self.modality {
            InputModality::Pointer => "Tap + hold, slide to switch".to_string(),
            InputModality::Keyboard => {
                let keys = self.config.engine.key_list();
                let shown = self.config.media.len().max(1).min(keys.len());
                let labels: Vec<String> = keys[..shown]
                    .iter()
                    .map(|c| c.to_ascii_uppercase().to_string())
                    .collect();
                format!("Keys: {}", labels.join(", "))
            }
        }
    }

    pub fn drain_events(&mut self) -> Vec<PadEvent> {
        std::mem::take(&mut self.events)
    }

    /// Pull samples from an offline audio engine. No-op on a live device.
    pub fn render_audio(&mut self, output: &mut [f32]) {
        self.audio.render(output);
    }

    pub fn offline_mixer(&self) -> Option<&Mixer> {
        self.audio.offline_mixer()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Release everything in order: timers, voices, videos, recording.
    /// Safe to call more than once; also runs on drop.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        let now = Instant::now();

        self.voices.teardown();
        self.audio.shutdown();
        self.assets.teardown(now);
        self.recorder.shutdown();
        self.touches.clear();
        self.keys.clear();
        tracing::info!("pad torn down");
    }
}

impl Drop for Pad {
    fn drop(&mut self) {
        self.teardown();
    }
}
