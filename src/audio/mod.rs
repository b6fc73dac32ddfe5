pub mod clip;
pub mod mixer;
pub mod stream;
pub mod tap;

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

pub use clip::AudioClip;
pub use mixer::Mixer;
pub use stream::AudioOutput;
pub use tap::{AudioDestination, AudioTrack, TapWriter};

use crate::error::PadResult;

#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub buffer_size: usize,
    /// Seconds of master output the recording tap can hold before it drops samples.
    pub tap_seconds: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_size: 512,
            tap_seconds: 4,
        }
    }
}

/// Messages from the voice controller (and recorder) to whoever runs the mixer.
#[derive(Debug)]
pub enum MixerCommand {
    /// Restart the layer's loop from the top at zero gain.
    Start(usize),
    /// Move the layer's gain linearly to `target` over `over`.
    Ramp {
        layer: usize,
        target: f32,
        over: Duration,
    },
    /// Halt playback and rewind.
    Stop(usize),
    /// Release the clip for good.
    Disconnect(usize),
    ConnectTap(TapWriter),
    DisconnectTap,
}

enum Backend {
    Live {
        _stream: cpal::Stream,
        errors: Receiver<String>,
        device_name: String,
    },
    Offline {
        mixer: Box<Mixer>,
    },
    Silent {
        drain: Receiver<MixerCommand>,
    },
}

/// The live audio graph: a mixer fed by commands, optionally running on an
/// output device.
pub struct AudioEngine {
    commands: Sender<MixerCommand>,
    sample_rate: u32,
    tap_capacity: usize,
    backend: Backend,
}

impl AudioEngine {
    /// Start the mixer on an opened output device.
    pub fn live(
        output: AudioOutput,
        clips: Vec<Option<Arc<AudioClip>>>,
        config: &AudioConfig,
    ) -> PadResult<Self> {
        let (commands, receiver) = channel::unbounded();
        let (error_tx, errors) = channel::bounded(16);
        let sample_rate = output.sample_rate();
        let device_name = output.device_name().to_string();
        let mixer = Mixer::new(clips, sample_rate, receiver);
        let stream = output.start(mixer, error_tx)?;

        tracing::info!(device = %device_name, sample_rate, "audio output running");
        Ok(Self {
            commands,
            sample_rate,
            tap_capacity: tap_capacity(sample_rate, config),
            backend: Backend::Live {
                _stream: stream,
                errors,
                device_name,
            },
        })
    }

    /// A mixer that only produces samples when `render` is called.
    pub fn offline(clips: Vec<Option<Arc<AudioClip>>>, config: &AudioConfig) -> Self {
        let (commands, receiver) = channel::unbounded();
        let mixer = Mixer::new(clips, config.sample_rate, receiver);
        Self {
            commands,
            sample_rate: config.sample_rate,
            tap_capacity: tap_capacity(config.sample_rate, config),
            backend: Backend::Offline {
                mixer: Box::new(mixer),
            },
        }
    }

    /// No output at all. Voices still change state; nothing is heard or tapped.
    pub fn silent(config: &AudioConfig) -> Self {
        let (commands, drain) = channel::unbounded();
        Self {
            commands,
            sample_rate: config.sample_rate,
            tap_capacity: 0,
            backend: Backend::Silent { drain },
        }
    }

    pub fn command_sender(&self) -> Sender<MixerCommand> {
        self.commands.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_silent(&self) -> bool {
        matches!(self.backend, Backend::Silent { .. })
    }

    pub fn device_name(&self) -> &str {
        match &self.backend {
            Backend::Live { device_name, .. } => device_name,
            Backend::Offline { .. } => "offline",
            Backend::Silent { .. } => "none",
        }
    }

    /// Render mono samples from an offline mixer. No-op for the other backends.
    pub fn render(&mut self, output: &mut [f32]) {
        if let Backend::Offline { mixer } = &mut self.backend {
            mixer.process(output);
        }
    }

    /// Borrow the offline mixer, mostly for inspection.
    pub fn offline_mixer(&self) -> Option<&Mixer> {
        match &self.backend {
            Backend::Offline { mixer } => Some(mixer),
            _ => None,
        }
    }

    /// Per-frame housekeeping: drains swallowed commands in silent mode and
    /// returns stream errors reported by the device.
    pub fn pump(&mut self) -> Vec<String> {
        match &self.backend {
            Backend::Silent { drain } => {
                while drain.try_recv().is_ok() {}
                Vec::new()
            }
            Backend::Live { errors, .. } => errors.try_iter().collect(),
            Backend::Offline { .. } => Vec::new(),
        }
    }

    /// Create a destination the master output can be tapped into.
    /// `None` when there is no audio graph to tap.
    pub fn create_stream_destination(&self) -> Option<AudioDestination> {
        if self.is_silent() {
            return None;
        }
        Some(AudioDestination::new(self.sample_rate, self.tap_capacity))
    }

    /// Route the master output into `destination`. Connecting twice is harmless.
    pub fn connect_master(&self, destination: &mut AudioDestination) -> bool {
        if destination.is_connected() {
            return true;
        }
        let Some(writer) = destination.take_writer() else {
            return false;
        };
        match self.commands.try_send(MixerCommand::ConnectTap(writer)) {
            Ok(()) => true,
            Err(TrySendError::Full(MixerCommand::ConnectTap(writer)))
            | Err(TrySendError::Disconnected(MixerCommand::ConnectTap(writer))) => {
                destination.restore_writer(writer);
                false
            }
            Err(_) => false,
        }
    }

    /// Drop the device stream. Further commands are swallowed.
    pub fn shutdown(&mut self) {
        if self.is_silent() {
            return;
        }
        let _ = self.commands.try_send(MixerCommand::DisconnectTap);
        let (commands, drain) = channel::unbounded();
        self.commands = commands;
        self.tap_capacity = 0;
        self.backend = Backend::Silent { drain };
        tracing::debug!("audio engine shut down");
    }
}

fn tap_capacity(sample_rate: u32, config: &AudioConfig) -> usize {
    (sample_rate as usize * config.tap_seconds as usize).max(config.buffer_size * 4)
}
