use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use crossbeam::channel::Sender;

use super::{AudioConfig, Mixer};
use crate::error::{PadError, PadResult};

/// The default output device, opened but not yet running.
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    device_name: String,
    buffer_hint: usize,
}

impl AudioOutput {
    pub fn open(config: &AudioConfig) -> PadResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PadError::audio("no output device available"))?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let default = device
            .default_output_config()
            .map_err(|e| PadError::audio(format!("{device_name}: {e}")))?;

        // The mixer renders f32. Prefer a float config at the device's own rate.
        let default_rate = default.sample_rate();
        let float_config = device
            .supported_output_configs()
            .ok()
            .into_iter()
            .flatten()
            .filter(|range| range.sample_format() == SampleFormat::F32)
            .find(|range| {
                range.min_sample_rate() <= default_rate && range.max_sample_rate() >= default_rate
            })
            .map(|range| range.with_sample_rate(default_rate));

        let chosen = match float_config {
            Some(supported) => supported,
            None if default.sample_format() == SampleFormat::F32 => default,
            None => {
                return Err(PadError::audio(format!(
                    "{device_name} has no f32 output config (default is {:?})",
                    default.sample_format()
                )));
            }
        };

        tracing::debug!(
            device = %device_name,
            sample_rate = chosen.sample_rate().0,
            channels = chosen.channels(),
            "output device opened"
        );

        Ok(Self {
            device,
            config: StreamConfig {
                channels: chosen.channels(),
                sample_rate: chosen.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            },
            device_name,
            buffer_hint: config.buffer_size,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Hand the mixer to the device callback and start playback.
    /// Stream errors are forwarded on `errors` without blocking the audio thread.
    pub fn start(self, mut mixer: Mixer, errors: Sender<String>) -> PadResult<Stream> {
        let channels = self.config.channels.max(1) as usize;
        let mut mono = vec![0.0f32; self.buffer_hint.max(4096)];

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    if mono.len() < frames {
                        mono.resize(frames, 0.0);
                    }
                    let buffer = &mut mono[..frames];
                    mixer.process(buffer);

                    for (frame, &sample) in data.chunks_mut(channels).zip(buffer.iter()) {
                        frame.fill(sample);
                    }
                },
                move |err| {
                    let _ = errors.try_send(err.to_string());
                },
                None,
            )
            .map_err(|e| PadError::audio(format!("{}: {e}", self.device_name)))?;

        stream
            .play()
            .map_err(|e| PadError::audio(format!("{}: {e}", self.device_name)))?;
        Ok(stream)
    }
}
