pub mod blit;

use image::{Rgba, RgbaImage};

use crate::trigger::GridPartition;

pub use blit::Placement;

/// Opacity the background is washed over the previous frame with. Anything
/// drawn earlier fades out over a few frames instead of vanishing.
pub const TRAIL_ALPHA: u8 = 120;
pub const PULSE_BASE: f32 = 80.0;
pub const PULSE_AMPLITUDE: f32 = 80.0;
/// Advance of a layer's visual phase per rendered frame while it is active.
pub const PHASE_STEP: f32 = 0.02;
/// Share of its grid cell a layer image may occupy.
pub const IMAGE_FIT: f32 = 0.85;

pub fn pulse_alpha(phase: f32) -> u8 {
    (PULSE_BASE + PULSE_AMPLITUDE * phase.sin())
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Owns the canvas all frames are composited into.
#[derive(Debug, Clone)]
pub struct Renderer {
    canvas: RgbaImage,
    background: Rgba<u8>,
}

impl Renderer {
    pub fn new(width: u32, height: u32, background: Rgba<u8>) -> Self {
        let background = Rgba([background.0[0], background.0[1], background.0[2], 255]);
        Self {
            canvas: RgbaImage::from_pixel(width.max(1), height.max(1), background),
            background,
        }
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn size(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    pub fn background(&self) -> Rgba<u8> {
        self.background
    }

    /// Start over at a new size. The old content is not kept.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.size() == (width.max(1), height.max(1)) {
            return;
        }
        self.canvas = RgbaImage::from_pixel(width.max(1), height.max(1), self.background);
    }

    pub fn begin_frame(&mut self) {
        blit::wash(&mut self.canvas, self.background, TRAIL_ALPHA);
    }

    /// Aspect-fill `frame` over the whole canvas.
    pub fn draw_background_video(&mut self, frame: &RgbaImage) {
        let (w, h) = self.size();
        if let Some(placement) = Placement::cover(frame.dimensions(), w, h) {
            blit::draw_scaled(&mut self.canvas, frame, placement, 255);
        }
    }

    /// Draw a layer image centered in its cell, pulsing with `phase`.
    pub fn draw_layer_image(
        &mut self,
        grid: &GridPartition,
        layer: usize,
        image: &RgbaImage,
        phase: f32,
    ) {
        let (w, h) = self.size();
        let (cell_w, cell_h) = grid.cell_size(w as f32, h as f32);
        let center = grid.cell_center(layer, w as f32, h as f32);
        if let Some(placement) = Placement::fit(image.dimensions(), center, cell_w, cell_h, IMAGE_FIT) {
            blit::draw_scaled(&mut self.canvas, image, placement, pulse_alpha(phase));
        }
    }
}
