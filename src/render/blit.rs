// Placement maths and scaled, blended drawing onto the canvas.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

/// Destination rectangle in canvas pixels. May hang off any edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Placement {
    /// Scale `src` uniformly so it covers `(width, height)`, centered.
    pub fn cover(src: (u32, u32), width: u32, height: u32) -> Option<Self> {
        let (sw, sh) = src;
        if sw == 0 || sh == 0 {
            return None;
        }
        let scale = (width as f32 / sw as f32).max(height as f32 / sh as f32);
        Some(Self::centered(
            width as f32 / 2.0,
            height as f32 / 2.0,
            sw as f32 * scale,
            sh as f32 * scale,
        ))
    }

    /// Scale `src` uniformly to fit `fraction` of a `cell_w x cell_h` cell at `center`.
    pub fn fit(src: (u32, u32), center: (f32, f32), cell_w: f32, cell_h: f32, fraction: f32) -> Option<Self> {
        let (sw, sh) = src;
        if sw == 0 || sh == 0 {
            return None;
        }
        let scale = (cell_w / sw as f32).min(cell_h / sh as f32) * fraction;
        Some(Self::centered(center.0, center.1, sw as f32 * scale, sh as f32 * scale))
    }

    fn centered(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }
}

#[inline]
fn blend_channel(src: u8, dst: u8, alpha: u32) -> u8 {
    ((u32::from(src) * alpha + u32::from(dst) * (255 - alpha) + 127) / 255) as u8
}

/// Blend `color` over every pixel at `opacity` (0..=255). Canvas alpha stays opaque.
pub fn wash(canvas: &mut RgbaImage, color: Rgba<u8>, opacity: u8) {
    let alpha = u32::from(opacity);
    for pixel in canvas.pixels_mut() {
        for c in 0..3 {
            pixel.0[c] = blend_channel(color.0[c], pixel.0[c], alpha);
        }
        pixel.0[3] = 255;
    }
}

/// Canvas pixels covered by `placement`, clipped to the canvas:
/// `(x0, y0, x1, y1)`, end exclusive.
fn visible_rect(placement: Placement, canvas: (u32, u32)) -> Option<(u32, u32, u32, u32)> {
    let (cw, ch) = canvas;
    let clip = |v: f32, max: u32| (v.round().max(0.0) as u32).min(max);
    let x0 = clip(placement.x, cw);
    let y0 = clip(placement.y, ch);
    let x1 = clip(placement.x + placement.width, cw);
    let y1 = clip(placement.y + placement.height, ch);
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
}

/// Draw `src` into `placement` with an extra `opacity` multiplier (0..=255).
///
/// Only the part of `src` that lands on the canvas is cropped out and scaled,
/// so a cover placement hanging far off the edges stays cheap.
pub fn draw_scaled(canvas: &mut RgbaImage, src: &RgbaImage, placement: Placement, opacity: u8) {
    if opacity == 0 || placement.width <= 0.0 || placement.height <= 0.0 {
        return;
    }
    let (sw, sh) = src.dimensions();
    if sw == 0 || sh == 0 {
        return;
    }
    let Some((x0, y0, x1, y1)) = visible_rect(placement, canvas.dimensions()) else {
        return;
    };

    let sx = sw as f32 / placement.width;
    let sy = sh as f32 / placement.height;
    let u0 = (((x0 as f32 - placement.x) * sx).floor().max(0.0) as u32).min(sw - 1);
    let v0 = (((y0 as f32 - placement.y) * sy).floor().max(0.0) as u32).min(sh - 1);
    let u1 = (((x1 as f32 - placement.x) * sx).ceil() as u32).clamp(u0 + 1, sw);
    let v1 = (((y1 as f32 - placement.y) * sy).ceil() as u32).clamp(v0 + 1, sh);

    let crop = imageops::crop_imm(src, u0, v0, u1 - u0, v1 - v0).to_image();
    let mut scaled = imageops::resize(&crop, x1 - x0, y1 - y0, FilterType::Nearest);
    if opacity < 255 {
        for pixel in scaled.pixels_mut() {
            pixel.0[3] = ((u32::from(pixel.0[3]) * u32::from(opacity) + 127) / 255) as u8;
        }
    }
    imageops::overlay(canvas, &scaled, i64::from(x0), i64::from(y0));
}
