// SIMD mixing of looping layers with per-voice gain ramps.

use std::sync::Arc;

use crossbeam::channel::Receiver;
use wide::f32x4;

use super::{AudioClip, MixerCommand, TapWriter};

#[derive(Debug, Clone, Copy)]
struct GainRamp {
    target: f32,
    step: f32,
    remaining: usize,
}

#[derive(Debug, Default)]
struct VoiceState {
    clip: Option<Arc<AudioClip>>,
    playing: bool,
    position: usize,
    gain: f32,
    ramp: Option<GainRamp>,
}

impl VoiceState {
    fn new(clip: Option<Arc<AudioClip>>) -> Self {
        Self {
            clip,
            ..Self::default()
        }
    }

    /// Copy the next `out.len()` samples of the loop, wrapping at the end.
    fn fill_loop(&mut self, out: &mut [f32]) {
        let Some(clip) = self.clip.as_ref().filter(|c| !c.is_empty()) else {
            out.fill(0.0);
            return;
        };
        let samples = clip.samples();
        let mut written = 0;
        while written < out.len() {
            if self.position >= samples.len() {
                self.position = 0;
            }
            let take = (samples.len() - self.position).min(out.len() - written);
            out[written..written + take]
                .copy_from_slice(&samples[self.position..self.position + take]);
            written += take;
            self.position += take;
        }
    }

    fn next_gain(&mut self) -> f32 {
        if let Some(ramp) = self.ramp.as_mut() {
            if ramp.remaining <= 1 {
                self.gain = ramp.target;
                self.ramp = None;
            } else {
                self.gain += ramp.step;
                ramp.remaining -= 1;
            }
        }
        self.gain
    }
}

/// Mixes every playing layer into a mono buffer. Lives on the audio thread and
/// takes its orders through a command channel.
pub struct Mixer {
    voices: Vec<VoiceState>,
    commands: Receiver<MixerCommand>,
    tap: Option<TapWriter>,
    scratch: Vec<f32>,
    sample_rate: u32,
}

impl Mixer {
    pub fn new(
        clips: Vec<Option<Arc<AudioClip>>>,
        sample_rate: u32,
        commands: Receiver<MixerCommand>,
    ) -> Self {
        Self {
            voices: clips.into_iter().map(VoiceState::new).collect(),
            commands,
            tap: None,
            scratch: vec![0.0; 4096],
            sample_rate,
        }
    }

    /// Apply pending commands, then fill `output` with the mix.
    /// Allocation-free unless the host hands us a larger buffer than ever before.
    pub fn process(&mut self, output: &mut [f32]) {
        self.process_commands();
        clear_simd(output);

        let len = output.len();
        if self.scratch.len() < len {
            self.scratch.resize(len, 0.0);
        }

        for voice in &mut self.voices {
            if !voice.playing {
                continue;
            }
            let scratch = &mut self.scratch[..len];
            voice.fill_loop(scratch);

            if voice.ramp.is_some() {
                for (out, &sample) in output.iter_mut().zip(scratch.iter()) {
                    *out += sample * voice.next_gain();
                }
            } else if voice.gain != 0.0 {
                add_scaled_simd(output, scratch, voice.gain);
            }
        }

        hard_clip_simd(output);

        if let Some(tap) = self.tap.as_mut() {
            tap.write(output);
        }
    }

    fn process_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                MixerCommand::Start(layer) => {
                    if let Some(voice) = self.voices.get_mut(layer) {
                        voice.position = 0;
                        voice.gain = 0.0;
                        voice.ramp = None;
                        voice.playing = voice.clip.is_some();
                    }
                }
                MixerCommand::Ramp {
                    layer,
                    target,
                    over,
                } => {
                    let rate = self.sample_rate;
                    if let Some(voice) = self.voices.get_mut(layer) {
                        let samples = (over.as_secs_f64() * f64::from(rate)).round() as usize;
                        let samples = samples.max(1);
                        voice.ramp = Some(GainRamp {
                            target,
                            step: (target - voice.gain) / samples as f32,
                            remaining: samples,
                        });
                    }
                }
                MixerCommand::Stop(layer) => {
                    if let Some(voice) = self.voices.get_mut(layer) {
                        voice.playing = false;
                        voice.position = 0;
                        voice.ramp = None;
                        voice.gain = 0.0;
                    }
                }
                MixerCommand::Disconnect(layer) => {
                    if let Some(voice) = self.voices.get_mut(layer) {
                        *voice = VoiceState::default();
                    }
                }
                MixerCommand::ConnectTap(writer) => self.tap = Some(writer),
                MixerCommand::DisconnectTap => self.tap = None,
            }
        }
    }

    pub fn layer_count(&self) -> usize {
        self.voices.len()
    }

    pub fn is_playing(&self, layer: usize) -> bool {
        self.voices.get(layer).is_some_and(|v| v.playing)
    }

    pub fn gain(&self, layer: usize) -> f32 {
        self.voices.get(layer).map_or(0.0, |v| v.gain)
    }

    #[cfg(test)]
    fn has_clip(&self, layer: usize) -> bool {
        self.voices.get(layer).is_some_and(|v| v.clip.is_some())
    }

    #[cfg(test)]
    fn has_tap(&self) -> bool {
        self.tap.is_some()
    }
}

#[inline]
fn clear_simd(buffer: &mut [f32]) {
    let zero = f32x4::splat(0.0).to_array();
    let mut chunks = buffer.chunks_exact_mut(4);
    for chunk in &mut chunks {
        chunk.copy_from_slice(&zero);
    }
    chunks.into_remainder().fill(0.0);
}

/// dest += src * gain
#[inline]
fn add_scaled_simd(dest: &mut [f32], src: &[f32], gain: f32) {
    let gain_vec = f32x4::splat(gain);
    let len = dest.len().min(src.len());
    let chunks = len / 4;

    for i in 0..chunks {
        let idx = i * 4;
        let d = f32x4::new([dest[idx], dest[idx + 1], dest[idx + 2], dest[idx + 3]]);
        let s = f32x4::new([src[idx], src[idx + 1], src[idx + 2], src[idx + 3]]);
        dest[idx..idx + 4].copy_from_slice(&(d + s * gain_vec).to_array());
    }
    for i in chunks * 4..len {
        dest[i] += src[i] * gain;
    }
}

#[inline]
fn hard_clip_simd(buffer: &mut [f32]) {
    let one = f32x4::splat(1.0);
    let neg_one = f32x4::splat(-1.0);
    let mut chunks = buffer.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let v = f32x4::new([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&v.max(neg_one).min(one).to_array());
    }
    for sample in chunks.into_remainder() {
        *sample = sample.clamp(-1.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioDestination;
    use approx::assert_relative_eq;
    use crossbeam::channel::{self, Sender};
    use std::time::Duration;

    fn mixer_with(clips: Vec<Vec<f32>>) -> (Mixer, Sender<MixerCommand>) {
        let (tx, rx) = channel::unbounded();
        let clips = clips
            .into_iter()
            .map(|s| Some(Arc::new(AudioClip::new(s, 1000))))
            .collect();
        (Mixer::new(clips, 1000, rx), tx)
    }

    fn ramp(layer: usize, target: f32, ms: u64) -> MixerCommand {
        MixerCommand::Ramp {
            layer,
            target,
            over: Duration::from_millis(ms),
        }
    }

    #[test]
    fn idle_mixer_outputs_silence() {
        let (mut mixer, _tx) = mixer_with(vec![vec![0.5; 10]]);
        let mut out = vec![1.0; 7];
        mixer.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn fade_in_ramps_linearly_then_holds() {
        let (mut mixer, tx) = mixer_with(vec![vec![1.0; 100]]);
        tx.send(MixerCommand::Start(0)).unwrap();
        tx.send(ramp(0, 1.0, 4)).unwrap();

        let mut out = vec![0.0; 8];
        mixer.process(&mut out);
        assert_relative_eq!(out[0], 0.25);
        assert_relative_eq!(out[1], 0.5);
        assert_relative_eq!(out[3], 1.0);
        assert_relative_eq!(out[7], 1.0);
        assert_relative_eq!(mixer.gain(0), 1.0);
    }

    #[test]
    fn loop_wraps_at_clip_end() {
        let (mut mixer, tx) = mixer_with(vec![vec![0.1, 0.2, 0.3]]);
        tx.send(MixerCommand::Start(0)).unwrap();
        tx.send(ramp(0, 1.0, 0)).unwrap();

        let mut out = vec![0.0; 7];
        mixer.process(&mut out);
        let expected = [0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.1];
        for (a, b) in out.iter().zip(expected) {
            assert_relative_eq!(*a, b);
        }
    }

    #[test]
    fn start_rewinds_and_stop_silences() {
        let (mut mixer, tx) = mixer_with(vec![(0..10).map(|i| i as f32 / 10.0).collect()]);
        tx.send(MixerCommand::Start(0)).unwrap();
        tx.send(ramp(0, 1.0, 0)).unwrap();
        let mut out = vec![0.0; 4];
        mixer.process(&mut out);

        tx.send(MixerCommand::Start(0)).unwrap();
        tx.send(ramp(0, 1.0, 0)).unwrap();
        mixer.process(&mut out);
        assert_relative_eq!(out[0], 0.0);
        assert_relative_eq!(out[1], 0.1);

        tx.send(MixerCommand::Stop(0)).unwrap();
        mixer.process(&mut out);
        assert!(!mixer.is_playing(0));
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn layers_sum_and_clip() {
        let (mut mixer, tx) = mixer_with(vec![vec![0.75; 16], vec![0.75; 16]]);
        for layer in 0..2 {
            tx.send(MixerCommand::Start(layer)).unwrap();
            tx.send(ramp(layer, 1.0, 0)).unwrap();
        }
        let mut out = vec![0.0; 9];
        mixer.process(&mut out);
        assert!(out.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn disconnected_layer_cannot_restart() {
        let (mut mixer, tx) = mixer_with(vec![vec![0.5; 8]]);
        tx.send(MixerCommand::Disconnect(0)).unwrap();
        tx.send(MixerCommand::Start(0)).unwrap();
        let mut out = vec![0.0; 4];
        mixer.process(&mut out);
        assert!(!mixer.has_clip(0));
        assert!(!mixer.is_playing(0));
    }

    #[test]
    fn out_of_range_layers_are_ignored() {
        let (mut mixer, tx) = mixer_with(vec![]);
        tx.send(MixerCommand::Start(5)).unwrap();
        tx.send(ramp(5, 1.0, 10)).unwrap();
        let mut out = vec![0.0; 4];
        mixer.process(&mut out);
        assert_eq!(mixer.layer_count(), 0);
    }

    #[test]
    fn tap_receives_master_output() {
        let (mut mixer, tx) = mixer_with(vec![vec![0.5; 8]]);
        let mut dest = AudioDestination::new(1000, 64);
        let track = dest.track();
        tx.send(MixerCommand::ConnectTap(dest.take_writer().unwrap()))
            .unwrap();
        tx.send(MixerCommand::Start(0)).unwrap();
        tx.send(ramp(0, 1.0, 0)).unwrap();
        track.arm();

        let mut out = vec![0.0; 6];
        mixer.process(&mut out);
        assert!(mixer.has_tap());

        let mut tapped = Vec::new();
        assert_eq!(track.read_into(&mut tapped), 6);
        assert_eq!(tapped, out);
    }
}
