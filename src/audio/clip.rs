use std::io::Cursor;
use std::process::{Command, Stdio};
use std::time::Duration;

use hound::{SampleFormat, WavReader};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::AssetError;
use crate::media::MediaSource;

/// A decoded, mono, loopable sound at the engine's sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decode `source` and bring it to `target_rate`.
    ///
    /// WAV is read in-process. Every other container goes through ffmpeg,
    /// which also does the downmix and resample for us.
    pub fn load(source: &MediaSource, target_rate: u32) -> Result<Self, AssetError> {
        let label = source.ffmpeg_input();
        if is_wav(&label) {
            let bytes = source.read_bytes()?;
            return Self::from_wav_bytes(&bytes, target_rate)
                .map_err(|reason| AssetError::decode(label, reason));
        }
        Self::decode_with_ffmpeg(source, target_rate)
    }

    pub fn from_wav_bytes(bytes: &[u8], target_rate: u32) -> anyhow::Result<Self> {
        let mut reader = WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<Vec<_>, _>>()?,
            SampleFormat::Int => {
                let full_scale = 2_i64.pow(u32::from(spec.bits_per_sample) - 1) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / full_scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        let mono = downmix(interleaved, spec.channels as usize);
        let samples = resample(&mono, spec.sample_rate, target_rate)?;
        Ok(Self::new(samples, target_rate))
    }

    fn decode_with_ffmpeg(source: &MediaSource, target_rate: u32) -> Result<Self, AssetError> {
        let input = source.ffmpeg_input();
        // `output` drains stdout and stderr together, so a noisy decoder
        // cannot stall on a full stderr pipe.
        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(&input)
            .args(["-vn", "-f", "f32le", "-ac", "1", "-ar"])
            .arg(target_rate.to_string())
            .arg("pipe:1")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => AssetError::FfmpegMissing(input.clone()),
                _ => AssetError::decode(input.clone(), e),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AssetError::decode(input, stderr.trim()));
        }

        let samples = output
            .stdout
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect::<Vec<_>>();
        if samples.is_empty() {
            return Err(AssetError::decode(input, "no audio stream"));
        }
        Ok(Self::new(samples, target_rate))
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

fn is_wav(input: &str) -> bool {
    let trimmed = input.split(['?', '#']).next().unwrap_or(input);
    trimmed.to_ascii_lowercase().ends_with(".wav")
}

fn downmix(interleaved: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved;
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample(samples: &[f32], input_rate: u32, output_rate: u32) -> anyhow::Result<Vec<f32>> {
    if input_rate == output_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = f64::from(output_rate) / f64::from(input_rate);
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)?;
    let output = resampler.process(&[samples], None)?;
    Ok(output.into_iter().flatten().collect())
}
