use image::{Rgba, RgbaImage};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::Widget,
};

use crate::trigger::GridPartition;

const UPPER_HALF: &str = "▀";

pub fn to_color(pixel: Rgba<u8>) -> Color {
    Color::Rgb(pixel.0[0], pixel.0[1], pixel.0[2])
}

/// Draws an RGBA canvas into a terminal area, two pixels per cell.
pub struct CanvasView<'a> {
    canvas: &'a RgbaImage,
}

impl<'a> CanvasView<'a> {
    pub fn new(canvas: &'a RgbaImage) -> Self {
        Self { canvas }
    }

    fn sample(&self, col: u16, half_row: u32, area: Rect) -> Rgba<u8> {
        let (w, h) = self.canvas.dimensions();
        let x = (col as u64 * w as u64 / area.width.max(1) as u64) as u32;
        let y = (half_row as u64 * h as u64 / (area.height.max(1) as u64 * 2)) as u32;
        *self.canvas.get_pixel(x.min(w - 1), y.min(h - 1))
    }
}

impl Widget for CanvasView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for row in 0..area.height {
            for col in 0..area.width {
                let top = self.sample(col, row as u32 * 2, area);
                let bottom = self.sample(col, row as u32 * 2 + 1, area);
                if let Some(cell) = buf.cell_mut((area.x + col, area.y + row)) {
                    cell.set_symbol(UPPER_HALF)
                        .set_fg(to_color(top))
                        .set_bg(to_color(bottom));
                }
            }
        }
    }
}

/// One label per layer, centered in its grid cell.
pub struct GridLabels<'a> {
    pub grid: GridPartition,
    pub labels: &'a [(String, bool)],
    pub color: Color,
}

impl Widget for GridLabels<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for (index, (label, active)) in self.labels.iter().enumerate() {
            let (cx, cy) = self
                .grid
                .cell_center(index, area.width as f32, area.height as f32);
            let width = label.chars().count() as u16;
            let x = area.x + (cx as u16).saturating_sub(width / 2);
            let y = area.y + (cy as u16).min(area.height.saturating_sub(1));

            let mut style = Style::default().fg(self.color).add_modifier(Modifier::BOLD);
            if *active {
                style = style.add_modifier(Modifier::REVERSED);
            }
            let room = area.right().saturating_sub(x) as usize;
            buf.set_stringn(x, y, label, room, style);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_maps_two_rows_per_cell() {
        let mut canvas = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));
        for x in 0..4 {
            for y in 0..2 {
                canvas.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            }
        }
        let area = Rect::new(0, 0, 2, 2);
        let mut buf = Buffer::empty(area);
        CanvasView::new(&canvas).render(area, &mut buf);

        let top = &buf[(0, 0)];
        assert_eq!(top.symbol(), UPPER_HALF);
        assert_eq!(top.fg, Color::Rgb(255, 0, 0));
        assert_eq!(top.bg, Color::Rgb(255, 0, 0));
        let bottom = &buf[(1, 1)];
        assert_eq!(bottom.fg, Color::Rgb(0, 0, 255));
    }

    #[test]
    fn labels_land_in_their_cells() {
        let area = Rect::new(10, 5, 20, 10);
        let mut buf = Buffer::empty(Rect::new(0, 0, 40, 20));
        let labels = vec![("K".to_string(), false), ("B".to_string(), true)];
        GridLabels {
            grid: GridPartition::for_layers(2),
            labels: &labels,
            color: Color::White,
        }
        .render(area, &mut buf);

        assert_eq!(buf[(15, 10)].symbol(), "K");
        assert_eq!(buf[(25, 10)].symbol(), "B");
        assert!(buf[(25, 10)].modifier.contains(Modifier::REVERSED));
    }
}
