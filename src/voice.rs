// Per-layer on/off state, fade envelopes and delayed stops.

use std::time::{Duration, Instant};

use crossbeam::channel::Sender;

use crate::assets::BoundAssets;
use crate::audio::MixerCommand;

/// What an activate/deactivate call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    Released,
    Unchanged,
}

/// Anything input handlers can switch layers on and off through.
pub trait LayerTrigger {
    fn activate(&mut self, layer: usize) -> Transition;
    fn deactivate(&mut self, layer: usize) -> Transition;
    fn is_active(&self, layer: usize) -> bool;

    fn toggle(&mut self, layer: usize) -> Transition {
        if self.is_active(layer) {
            self.deactivate(layer)
        } else {
            self.activate(layer)
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Voice {
    playable: bool,
    active: bool,
    pending_stop: Option<Instant>,
}

/// The only thing that starts or stops playback.
///
/// Gain envelopes are executed by the mixer; this side only tracks state and
/// the one outstanding stop per layer.
#[derive(Debug)]
pub struct VoiceController {
    voices: Vec<Voice>,
    commands: Sender<MixerCommand>,
    fade: Duration,
    stop_delay: Duration,
}

impl VoiceController {
    pub fn new(
        playable: impl IntoIterator<Item = bool>,
        commands: Sender<MixerCommand>,
        fade: Duration,
        stop_delay: Duration,
    ) -> Self {
        Self {
            voices: playable
                .into_iter()
                .map(|playable| Voice {
                    playable,
                    ..Voice::default()
                })
                .collect(),
            commands,
            fade,
            stop_delay,
        }
    }

    pub fn layer_count(&self) -> usize {
        self.voices.len()
    }

    pub fn is_active(&self, layer: usize) -> bool {
        self.voices.get(layer).is_some_and(|v| v.active)
    }

    pub fn any_active(&self) -> bool {
        self.voices.iter().any(|v| v.active)
    }

    pub fn pending_stop(&self, layer: usize) -> Option<Instant> {
        self.voices.get(layer).and_then(|v| v.pending_stop)
    }

    /// Cancel any pending stop, then start the loop with a fade-in unless it is
    /// already on. Layers without a clip stay silent and inactive.
    pub fn activate(&mut self, layer: usize) -> Transition {
        let Some(voice) = self.voices.get_mut(layer) else {
            return Transition::Unchanged;
        };
        voice.pending_stop = None;
        if voice.active || !voice.playable {
            return Transition::Unchanged;
        }

        voice.active = true;
        self.send(MixerCommand::Start(layer));
        self.send(MixerCommand::Ramp {
            layer,
            target: 1.0,
            over: self.fade,
        });
        tracing::debug!(layer, "voice on");
        Transition::Started
    }

    /// Fade out and schedule the stop. An inactive layer is left alone,
    /// including any stop it already has pending.
    pub fn deactivate(&mut self, layer: usize, now: Instant) -> Transition {
        let Some(voice) = self.voices.get_mut(layer) else {
            return Transition::Unchanged;
        };
        if !voice.active {
            return Transition::Unchanged;
        }

        voice.active = false;
        voice.pending_stop = Some(now + self.stop_delay);
        self.send(MixerCommand::Ramp {
            layer,
            target: 0.0,
            over: self.fade,
        });
        tracing::debug!(layer, "voice fading out");
        Transition::Released
    }

    /// Fire every stop that is due. Returns how many fired.
    pub fn poll_timers(&mut self, now: Instant) -> usize {
        let mut due = Vec::new();
        for (layer, voice) in self.voices.iter_mut().enumerate() {
            if voice.pending_stop.is_some_and(|at| at <= now) {
                voice.pending_stop = None;
                due.push(layer);
            }
        }
        for &layer in &due {
            self.send(MixerCommand::Stop(layer));
        }
        due.len()
    }

    /// Clear timers, then stop and disconnect every voice.
    pub fn teardown(&mut self) {
        for voice in &mut self.voices {
            voice.pending_stop = None;
        }
        for layer in 0..self.voices.len() {
            self.send(MixerCommand::Stop(layer));
            self.send(MixerCommand::Disconnect(layer));
            self.voices[layer] = Voice::default();
        }
    }

    fn send(&self, command: MixerCommand) {
        if self.commands.send(command).is_err() {
            tracing::trace!("mixer is gone, command dropped");
        }
    }
}

/// Couples the voice controller with the visuals for one input event or frame.
pub struct VoiceDriver<'a> {
    pub voices: &'a mut VoiceController,
    pub assets: &'a mut BoundAssets,
    pub now: Instant,
}

impl LayerTrigger for VoiceDriver<'_> {
    fn activate(&mut self, layer: usize) -> Transition {
        let transition = self.voices.activate(layer);
        if transition == Transition::Started
            && let Some(video) = self.assets.paired_video_mut(layer)
            && video.is_paused()
        {
            video.resume(self.now);
        }
        transition
    }

    fn deactivate(&mut self, layer: usize) -> Transition {
        self.voices.deactivate(layer, self.now)
    }

    fn is_active(&self, layer: usize) -> bool {
        self.voices.is_active(layer)
    }
}
