pub mod video;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use image::RgbaImage;

pub use video::VideoLoop;

use crate::audio::AudioClip;
use crate::config::MAX_LAYERS;
use crate::error::AssetError;
use crate::media::{MediaDescriptor, MediaKind, MediaSource};

#[derive(Debug, Clone)]
pub enum Visual {
    Image(Arc<RgbaImage>),
    Video(VideoLoop),
}

/// What one descriptor resolved to.
#[derive(Debug, Clone)]
pub enum LayerAsset {
    Audio(Arc<AudioClip>),
    Visual(Visual),
}

/// How a voice-bearing layer presents itself, decided by what it is paired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Audio,
    AudioImage,
    AudioVideo,
}

#[derive(Debug)]
pub struct BindFailure {
    /// Position in the descriptor list.
    pub index: usize,
    pub id: String,
    pub kind: MediaKind,
    pub error: AssetError,
}

#[derive(Debug, Clone)]
pub struct AudioSlot {
    pub id: String,
    pub clip: Option<Arc<AudioClip>>,
}

/// Resolves descriptors into playable handles.
#[derive(Debug, Clone)]
pub struct AssetBinder {
    base_dir: Option<PathBuf>,
    sample_rate: u32,
}

impl AssetBinder {
    pub fn new(base_dir: Option<PathBuf>, sample_rate: u32) -> Self {
        Self {
            base_dir,
            sample_rate,
        }
    }

    pub fn bind_one(
        &self,
        descriptor: &MediaDescriptor,
        now: Instant,
    ) -> Result<LayerAsset, AssetError> {
        let source = MediaSource::resolve(&descriptor.url, self.base_dir.as_deref())?;
        match descriptor.kind() {
            MediaKind::Audio => {
                let clip = AudioClip::load(&source, self.sample_rate)?;
                if clip.is_empty() {
                    return Err(AssetError::decode(&descriptor.url, "clip has no samples"));
                }
                Ok(LayerAsset::Audio(Arc::new(clip)))
            }
            MediaKind::Image => {
                let bytes = source.read_bytes()?;
                let image = image::load_from_memory(&bytes)
                    .map_err(|e| AssetError::decode(&descriptor.url, e))?
                    .to_rgba8();
                Ok(LayerAsset::Visual(Visual::Image(Arc::new(image))))
            }
            MediaKind::Video => Ok(LayerAsset::Visual(Visual::Video(VideoLoop::load(
                &source, now,
            )?))),
        }
    }

    /// Load every descriptor concurrently. One failure never affects another slot.
    pub fn bind(&self, descriptors: &[MediaDescriptor], now: Instant) -> BoundAssets {
        let panicked = |d: &MediaDescriptor| AssetError::decode(&d.url, "loader thread panicked");
        let kept = within_layer_cap(descriptors);

        let results: Vec<Result<LayerAsset, AssetError>> = crossbeam::scope(|scope| {
            let handles: Vec<_> = kept
                .iter()
                .map(|&(_, d)| scope.spawn(move |_| self.bind_one(d, now)))
                .collect();
            handles
                .into_iter()
                .zip(&kept)
                .map(|(handle, &(_, d))| handle.join().unwrap_or_else(|_| Err(panicked(d))))
                .collect()
        })
        .unwrap_or_else(|_| kept.iter().map(|&(_, d)| Err(panicked(d))).collect());

        BoundAssets::from_results(&kept, results)
    }
}

/// Descriptors worth loading, with their list positions. Audio past the
/// layer cap is dropped here so it is never decoded.
fn within_layer_cap(descriptors: &[MediaDescriptor]) -> Vec<(usize, &MediaDescriptor)> {
    let mut audio = 0;
    descriptors
        .iter()
        .enumerate()
        .filter(|(_, d)| {
            if d.kind() != MediaKind::Audio {
                return true;
            }
            audio += 1;
            if audio > MAX_LAYERS {
                tracing::warn!(id = %d.id, "more than {MAX_LAYERS} audio layers, ignoring");
                return false;
            }
            true
        })
        .collect()
}

/// Every bound handle, partitioned by kind with list order preserved.
///
/// Failed descriptors keep their slot (as `None`) so pairing by index is the
/// same whether or not a load succeeded.
#[derive(Debug, Default)]
pub struct BoundAssets {
    audio: Vec<AudioSlot>,
    images: Vec<Option<Arc<RgbaImage>>>,
    videos: Vec<Option<VideoLoop>>,
    failures: Vec<BindFailure>,
}

impl BoundAssets {
    pub fn new(
        audio: Vec<AudioSlot>,
        images: Vec<Option<Arc<RgbaImage>>>,
        videos: Vec<Option<VideoLoop>>,
    ) -> Self {
        Self {
            audio,
            images,
            videos,
            failures: Vec::new(),
        }
    }

    fn from_results(
        descriptors: &[(usize, &MediaDescriptor)],
        results: Vec<Result<LayerAsset, AssetError>>,
    ) -> Self {
        let mut bound = Self::default();

        for (&(index, descriptor), result) in descriptors.iter().zip(results) {
            let kind = descriptor.kind();
            let asset = match result {
                Ok(asset) => {
                    tracing::info!(id = %descriptor.id, ?kind, "asset bound");
                    Some(asset)
                }
                Err(error) => {
                    tracing::warn!(id = %descriptor.id, ?kind, %error, "asset failed to bind");
                    bound.failures.push(BindFailure {
                        index,
                        id: descriptor.id.clone(),
                        kind,
                        error,
                    });
                    None
                }
            };

            match (kind, asset) {
                (MediaKind::Audio, Some(LayerAsset::Audio(clip))) => bound.audio.push(AudioSlot {
                    id: descriptor.id.clone(),
                    clip: Some(clip),
                }),
                (MediaKind::Audio, _) => bound.audio.push(AudioSlot {
                    id: descriptor.id.clone(),
                    clip: None,
                }),
                (MediaKind::Image, Some(LayerAsset::Visual(Visual::Image(image)))) => {
                    bound.images.push(Some(image))
                }
                (MediaKind::Image, _) => bound.images.push(None),
                (MediaKind::Video, Some(LayerAsset::Visual(Visual::Video(video)))) => {
                    bound.videos.push(Some(video))
                }
                (MediaKind::Video, _) => bound.videos.push(None),
            }
        }
        bound
    }

    /// Number of voice-bearing layers (audio descriptors, loaded or not).
    pub fn layer_count(&self) -> usize {
        self.audio.len()
    }

    pub fn layer_id(&self, layer: usize) -> Option<&str> {
        self.audio.get(layer).map(|s| s.id.as_str())
    }

    pub fn is_playable(&self, layer: usize) -> bool {
        self.audio.get(layer).is_some_and(|s| s.clip.is_some())
    }

    /// Clips in layer order, for the mixer.
    pub fn clips(&self) -> Vec<Option<Arc<AudioClip>>> {
        self.audio.iter().map(|s| s.clip.clone()).collect()
    }

    pub fn paired_image(&self, layer: usize) -> Option<&RgbaImage> {
        looped(&self.images, layer)?.as_deref()
    }

    pub fn paired_video_mut(&mut self, layer: usize) -> Option<&mut VideoLoop> {
        if self.videos.is_empty() {
            return None;
        }
        let len = self.videos.len();
        self.videos[layer % len].as_mut()
    }

    pub fn has_paired_video(&self, layer: usize) -> bool {
        looped(&self.videos, layer).is_some_and(Option::is_some)
    }

    pub fn layer_kind(&self, layer: usize) -> LayerKind {
        if self.has_paired_video(layer) {
            LayerKind::AudioVideo
        } else if self.paired_image(layer).is_some() {
            LayerKind::AudioImage
        } else {
            LayerKind::Audio
        }
    }

    /// The first video slot, drawn behind everything while any layer sounds.
    pub fn background_video(&self) -> Option<&VideoLoop> {
        self.videos.first()?.as_ref()
    }

    pub fn advance_videos(&mut self, now: Instant) {
        for video in self.videos.iter_mut().flatten() {
            video.advance(now);
        }
    }

    pub fn failures(&self) -> &[BindFailure] {
        &self.failures
    }

    pub fn take_failures(&mut self) -> Vec<BindFailure> {
        std::mem::take(&mut self.failures)
    }

    /// Pause and drop every video, then every image. Safe to call twice.
    pub fn teardown(&mut self, now: Instant) {
        for video in self.videos.iter_mut().flatten() {
            video.pause(now);
            video.clear();
        }
        self.videos.clear();
        self.images.clear();
    }
}

fn looped<T>(items: &[T], index: usize) -> Option<&T> {
    if items.is_empty() {
        None
    } else {
        items.get(index % items.len())
    }
}
